//! Persistence store
//!
//! The whole collection is written as one snapshot on every save. There
//! is no incremental update and no history; the latest save wins.

pub mod file;
pub mod lock;
pub mod memory;

use pipeterm_core::domain::pipeline::PipelineCollection;
use std::path::PathBuf;
use thiserror::Error;

pub use file::FileStore;
pub use lock::StorageLock;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but does not hold a readable collection
    #[error("Corrupt pipeline file {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize pipelines: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Another process owns the storage directory
    #[error("Storage {} is in use{}", path.display(), held_by(holder))]
    Locked { path: PathBuf, holder: Option<u32> },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn held_by(holder: &Option<u32>) -> String {
    holder
        .map(|pid| format!(" by process {}", pid))
        .unwrap_or_default()
}

/// Durable home of the pipeline collection
///
/// Both methods may block on I/O. The engine calls them from its
/// synchronous API directly and from async paths through
/// `tokio::task::spawn_blocking`.
pub trait PipelineStore: Send + Sync {
    /// Loads the collection; a store that was never written yields an
    /// empty collection with `next_id` 1
    fn load(&self) -> Result<PipelineCollection, StoreError>;

    /// Replaces whatever was stored with `collection`
    fn save(&self, collection: &PipelineCollection) -> Result<(), StoreError>;
}
