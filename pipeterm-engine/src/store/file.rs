//! JSON file store

use pipeterm_core::domain::pipeline::PipelineCollection;
use pipeterm_core::dto::record::CollectionRecord;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::{PipelineStore, StorageLock, StoreError};

/// Name of the snapshot file inside the storage directory
pub const FILE_NAME: &str = "pipelines.json";

/// Stores the collection as pretty-printed JSON in `<dir>/pipelines.json`
///
/// Saves write a temporary file in the same directory and rename it over
/// the target, so a crash mid-save leaves the previous snapshot intact.
///
/// A store made with [`FileStore::new`] takes no lock and suits read-only
/// callers. Anything that saves should use [`FileStore::open_exclusive`].
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    path: PathBuf,
    lock: Option<Arc<StorageLock>>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let path = dir.join(FILE_NAME);
        Self {
            dir,
            path,
            lock: None,
        }
    }

    /// Opens the store holding the directory lock until the last clone drops
    pub fn open_exclusive(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let mut store = Self::new(dir);
        store.lock = Some(Arc::new(StorageLock::acquire(&store.dir)?));
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_exclusive(&self) -> bool {
        self.lock.is_some()
    }

    fn tmp_path(&self) -> PathBuf {
        self.dir
            .join(format!(".{}.{}.tmp", FILE_NAME, std::process::id()))
    }
}

impl PipelineStore for FileStore {
    fn load(&self) -> Result<PipelineCollection, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No pipeline file at {}, starting empty", self.path.display());
                return Ok(PipelineCollection::new());
            }
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        let record: CollectionRecord =
            serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        Ok(record.into())
    }

    fn save(&self, collection: &PipelineCollection) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;

        let json = serde_json::to_vec_pretty(&CollectionRecord::from(collection))?;

        let tmp_path = self.tmp_path();
        let mut file = fs::File::create(&tmp_path).map_err(|e| StoreError::io(&tmp_path, e))?;
        file.write_all(&json)
            .and_then(|_| file.sync_all())
            .map_err(|e| StoreError::io(&tmp_path, e))?;
        drop(file);

        fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::io(&self.path, e))?;

        debug!(
            "Saved {} pipeline(s) to {}",
            collection.len(),
            self.path.display()
        );
        Ok(())
    }
}
