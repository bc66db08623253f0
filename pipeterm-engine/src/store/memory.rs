//! In-memory store

use pipeterm_core::domain::pipeline::PipelineCollection;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{PipelineStore, StoreError};

/// Keeps the last saved snapshot in memory
///
/// Used for throwaway sessions and in tests. Saves can be made to fail
/// with [`MemoryStore::set_failing`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<PipelineCollection>>,
    saves: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose first load returns `collection`
    pub fn with_collection(collection: PipelineCollection) -> Self {
        Self {
            snapshot: Mutex::new(Some(collection)),
            ..Self::default()
        }
    }

    /// The most recently saved collection
    pub fn snapshot(&self) -> Option<PipelineCollection> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl PipelineStore for MemoryStore {
    fn load(&self) -> Result<PipelineCollection, StoreError> {
        Ok(self.snapshot().unwrap_or_default())
    }

    fn save(&self, collection: &PipelineCollection) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store set to fail".into()));
        }
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(collection.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeterm_core::domain::pipeline::ScriptKind;

    #[test]
    fn test_failing_save_keeps_previous_snapshot() {
        let store = MemoryStore::new();
        let mut collection = PipelineCollection::new();
        collection.create("a", ScriptKind::Builtin);
        store.save(&collection).unwrap();

        store.set_failing(true);
        collection.create("b", ScriptKind::Builtin);
        assert!(store.save(&collection).is_err());

        assert_eq!(store.load().unwrap().len(), 1);
        assert_eq!(store.save_count(), 1);
    }
}
