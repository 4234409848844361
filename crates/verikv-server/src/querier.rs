//! Read replicas of one dictionary's trie

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::debug;
use verikv_core::{
    DictionaryId, DictionaryStorage, Epoch, Error, Label, LookupPath, Result, TrieSnapshot,
    TrieStorageMode,
};

/// A (dictionary, storage) read view
///
/// In `Cached` mode the querier answers from the snapshot it loaded last and may lag
/// the latest epoch until [`Querier::refresh`] is called. In `Direct` mode every
/// lookup reads the snapshot from storage.
pub struct Querier {
    index: usize,
    id: DictionaryId,
    storage: Arc<dyn DictionaryStorage>,
    mode: TrieStorageMode,
    snapshot: ArcSwapOption<TrieSnapshot>,
    served: AtomicU64,
}

impl Querier {
    /// Bind a querier and load the current snapshot
    pub fn new(
        index: usize,
        id: DictionaryId,
        storage: Arc<dyn DictionaryStorage>,
        mode: TrieStorageMode,
    ) -> Result<Self> {
        let querier = Self {
            index,
            id,
            storage,
            mode,
            snapshot: ArcSwapOption::empty(),
            served: AtomicU64::new(0),
        };
        querier.refresh()?;
        Ok(querier)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn id(&self) -> &DictionaryId {
        &self.id
    }

    /// Reload the snapshot from storage
    pub fn refresh(&self) -> Result<()> {
        if self.mode == TrieStorageMode::Direct {
            return Ok(());
        }
        let trie = self.load()?;
        debug!(
            id = %self.id,
            querier = self.index,
            epoch = trie.as_ref().map(|t| t.epoch()).unwrap_or(0),
            "Querier refreshed"
        );
        self.snapshot.store(trie);
        Ok(())
    }

    fn load(&self) -> Result<Option<Arc<TrieSnapshot>>> {
        self.storage.load_trie(&self.id).map_err(|e| {
            Error::Lookup(format!(
                "querier {} could not read the trie of {} from {}: {}",
                self.index,
                self.id,
                self.storage.name(),
                e
            ))
        })
    }

    fn current(&self) -> Result<Option<Arc<TrieSnapshot>>> {
        match self.mode {
            TrieStorageMode::Cached => Ok(self.snapshot.load_full()),
            TrieStorageMode::Direct => self.load(),
        }
    }

    pub fn lookup(&self, label: &Label) -> Result<LookupPath> {
        self.served.fetch_add(1, Ordering::Relaxed);
        Ok(match self.current()? {
            Some(trie) => trie.lookup(label),
            None => LookupPath::empty(*label),
        })
    }

    /// Look up several labels against one snapshot
    pub fn lookup_many(&self, labels: &[Label]) -> Result<Vec<LookupPath>> {
        self.served.fetch_add(1, Ordering::Relaxed);
        let trie = self.current()?;
        Ok(labels
            .iter()
            .map(|label| match &trie {
                Some(trie) => trie.lookup(label),
                None => LookupPath::empty(*label),
            })
            .collect())
    }

    /// Epoch of the snapshot this querier answers from
    pub fn epoch(&self) -> Result<Epoch> {
        Ok(self.current()?.map(|t| t.epoch()).unwrap_or(0))
    }

    /// Number of lookup calls served
    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verikv_core::{keccak256, MemoryStorage, PendingUpdate};

    fn commit(storage: &MemoryStorage, id: &DictionaryId, labels: &[Label]) {
        let mut trie = storage
            .load_trie(id)
            .unwrap()
            .map(|t| (*t).clone())
            .unwrap_or_default();
        let updates: Vec<_> = labels.iter().map(|l| PendingUpdate::new(*l, [1u8; 32])).collect();
        trie.apply_batch(&updates);
        storage.save_trie(id, trie).unwrap();
    }

    #[test]
    fn test_cached_querier_is_stale_until_refresh() {
        let storage = Arc::new(MemoryStorage::new());
        let id = DictionaryId::random();
        let querier = Querier::new(0, id, storage.clone(), TrieStorageMode::Cached).unwrap();
        let label = keccak256(&[b"alice"]);

        commit(&storage, &id, &[label]);
        assert!(!querier.lookup(&label).unwrap().is_member());
        assert_eq!(querier.epoch().unwrap(), 0);

        querier.refresh().unwrap();
        let path = querier.lookup(&label).unwrap();
        assert!(path.is_member());
        assert_eq!(path.epoch, 1);
        assert_eq!(querier.served(), 2);
    }

    #[test]
    fn test_direct_querier_is_always_current() {
        let storage = Arc::new(MemoryStorage::new());
        let id = DictionaryId::random();
        let querier = Querier::new(0, id, storage.clone(), TrieStorageMode::Direct).unwrap();
        let label = keccak256(&[b"alice"]);

        commit(&storage, &id, &[label]);
        assert!(querier.lookup(&label).unwrap().is_member());
        assert_eq!(querier.epoch().unwrap(), 1);
    }

    #[test]
    fn test_lookup_many_uses_one_snapshot() {
        let storage = Arc::new(MemoryStorage::new());
        let id = DictionaryId::random();
        let a = keccak256(&[b"a"]);
        let b = keccak256(&[b"b"]);
        commit(&storage, &id, &[a]);

        let querier = Querier::new(3, id, storage, TrieStorageMode::Cached).unwrap();
        let paths = querier.lookup_many(&[a, b]).unwrap();
        assert!(paths[0].is_member());
        assert!(!paths[1].is_member());
        assert_eq!(paths[0].root, paths[1].root);
        assert_eq!(querier.served(), 1);
        assert_eq!(querier.index(), 3);
    }
}
