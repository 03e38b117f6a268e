//! In-memory object store.
//!
//! Keeps objects in a [`BTreeMap`] behind a [`parking_lot::RwLock`]. Clones
//! share the same container, which makes it convenient to hand one copy to a
//! store and keep another for inspection in tests.

use super::{KeyIter, ObjectStore, StoreResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// All keys in lexicographic order.
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn upload(&self, key: &str, data: &[u8]) -> StoreResult<()> {
        self.objects.write().insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn download(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.objects.read().get(key).cloned())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.objects.write().remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> StoreResult<KeyIter<'_>> {
        // Snapshot the matching keys so the lock is not held while the caller
        // deletes entries during iteration.
        let keys: Vec<String> = self
            .objects
            .read()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();

        Ok(Box::new(keys.into_iter().map(Ok)))
    }
}
