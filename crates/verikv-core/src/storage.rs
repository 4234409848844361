//! Storage collaborator contract and an in-memory backend

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::trie::TrieSnapshot;
use crate::types::{DictionaryId, Epoch, StoredElement};
use crate::{Error, Result};

/// Per-dictionary access to stored elements and the trie snapshot
///
/// Shared by reference between the facade, the updater and the queriers.
/// Only the updater writes the trie.
pub trait DictionaryStorage: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    fn load_stored_element(&self, id: &DictionaryId, key: &[u8]) -> Result<Option<StoredElement>>;

    fn save_stored_element(
        &self,
        id: &DictionaryId,
        key: &[u8],
        element: StoredElement,
    ) -> Result<()>;

    fn load_trie(&self, id: &DictionaryId) -> Result<Option<Arc<TrieSnapshot>>>;

    fn save_trie(&self, id: &DictionaryId, trie: TrieSnapshot) -> Result<()>;

    fn get_trie_epoch(&self, id: &DictionaryId) -> Result<Epoch> {
        Ok(self.load_trie(id)?.map(|trie| trie.epoch()).unwrap_or(0))
    }
}

type ElementKey = (DictionaryId, Vec<u8>);

/// In-memory storage
///
/// `set_fail_trie_writes` makes `save_trie` fail, for exercising scheduler failure paths.
#[derive(Default)]
pub struct MemoryStorage {
    elements: RwLock<HashMap<ElementKey, StoredElement>>,
    tries: RwLock<HashMap<DictionaryId, Arc<TrieSnapshot>>>,
    fail_trie_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_trie_writes(&self, fail: bool) {
        self.fail_trie_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored elements for one dictionary
    pub fn element_count(&self, id: &DictionaryId) -> usize {
        self.elements
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|(owner, _)| owner == id)
            .count()
    }
}

impl DictionaryStorage for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load_stored_element(&self, id: &DictionaryId, key: &[u8]) -> Result<Option<StoredElement>> {
        let elements = self.elements.read().unwrap_or_else(PoisonError::into_inner);
        Ok(elements.get(&(*id, key.to_vec())).cloned())
    }

    fn save_stored_element(
        &self,
        id: &DictionaryId,
        key: &[u8],
        element: StoredElement,
    ) -> Result<()> {
        let mut elements = self.elements.write().unwrap_or_else(PoisonError::into_inner);
        elements.insert((*id, key.to_vec()), element);
        Ok(())
    }

    fn load_trie(&self, id: &DictionaryId) -> Result<Option<Arc<TrieSnapshot>>> {
        let tries = self.tries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tries.get(id).cloned())
    }

    fn save_trie(&self, id: &DictionaryId, trie: TrieSnapshot) -> Result<()> {
        if self.fail_trie_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage(format!("trie write rejected for {}", id)));
        }
        let mut tries = self.tries.write().unwrap_or_else(PoisonError::into_inner);
        tries.insert(*id, Arc::new(trie));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PendingUpdate;

    fn element(byte: u8) -> StoredElement {
        StoredElement {
            payload: vec![byte],
            randomness: [byte; 32],
        }
    }

    #[test]
    fn test_elements_are_scoped_by_id() {
        let storage = MemoryStorage::new();
        let a = DictionaryId::random();
        let b = DictionaryId::random();

        storage.save_stored_element(&a, b"k", element(1)).unwrap();
        assert_eq!(storage.load_stored_element(&a, b"k").unwrap(), Some(element(1)));
        assert_eq!(storage.load_stored_element(&b, b"k").unwrap(), None);
        assert_eq!(storage.element_count(&a), 1);
        assert_eq!(storage.element_count(&b), 0);
    }

    #[test]
    fn test_trie_epoch_defaults_to_zero() {
        let storage = MemoryStorage::new();
        let id = DictionaryId::random();
        assert!(storage.load_trie(&id).unwrap().is_none());
        assert_eq!(storage.get_trie_epoch(&id).unwrap(), 0);

        let mut trie = TrieSnapshot::new();
        trie.apply_batch(&[PendingUpdate::new([1u8; 32], [2u8; 32])]);
        storage.save_trie(&id, trie).unwrap();
        assert_eq!(storage.get_trie_epoch(&id).unwrap(), 1);
    }

    #[test]
    fn test_failure_injection() {
        let storage = MemoryStorage::new();
        let id = DictionaryId::random();
        storage.set_fail_trie_writes(true);
        assert!(matches!(storage.save_trie(&id, TrieSnapshot::new()), Err(Error::Storage(_))));
        storage.set_fail_trie_writes(false);
        storage.save_trie(&id, TrieSnapshot::new()).unwrap();
    }
}
