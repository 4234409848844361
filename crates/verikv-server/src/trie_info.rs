use std::sync::Arc;

use verikv_core::{
    DictionaryId, DictionaryStorage, Epoch, Result, RootHash, TrieInfoProvider, EMPTY_HASH,
};

/// Trie metadata read from storage on every call, bypassing the querier pools
pub struct StorageTrieInfo {
    storage: Arc<dyn DictionaryStorage>,
}

impl StorageTrieInfo {
    pub fn new(storage: Arc<dyn DictionaryStorage>) -> Self {
        Self { storage }
    }
}

impl TrieInfoProvider for StorageTrieInfo {
    fn get_root_hash(&self, id: &DictionaryId) -> Result<RootHash> {
        Ok(self
            .storage
            .load_trie(id)?
            .map(|trie| trie.root_commitment())
            .unwrap_or(EMPTY_HASH))
    }

    fn get_epoch(&self, id: &DictionaryId) -> Result<Epoch> {
        self.storage.get_trie_epoch(id)
    }
}
