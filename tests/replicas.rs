//! Read-replica behavior: staleness, refresh, load balancing and storage modes

use std::sync::Arc;

use verikv_core::{
    DictionaryConfig, DictionaryStorage, MemoryStorage, QueryProvider, StorageConfig,
    TrieStorageMode,
};
use verikv_dict::{Dictionary, Registry};
use verikv_server::{QuerierPools, QueryRouter};

fn setup(config: DictionaryConfig) -> (Dictionary, Arc<Registry>) {
    let registry = Arc::new(Registry::new());
    let storage = StorageConfig::new(Arc::new(MemoryStorage::new()));
    let dict = Dictionary::new(config, storage, registry.clone()).unwrap();
    (dict, registry)
}

#[test]
fn test_stale_until_check_for_update() {
    let (dict, _) = setup(DictionaryConfig::default());

    // first query creates the pool at epoch 0
    assert!(!dict.query(b"alice").unwrap().is_member());

    dict.insert(b"alice", b"1").unwrap();
    dict.apply_pending().unwrap();
    assert_eq!(dict.get_epoch().unwrap(), 1);

    let stale = dict.query(b"alice").unwrap();
    assert!(!stale.is_member());
    assert_eq!(stale.epoch(), 0);

    dict.check_for_update().unwrap();
    let fresh = dict.query(b"alice").unwrap();
    assert!(fresh.is_member());
    assert_eq!(fresh.epoch(), 1);
}

#[test]
fn test_direct_mode_is_never_stale() {
    let config = DictionaryConfig::default().with_trie_storage_mode(TrieStorageMode::Direct);
    let (dict, _) = setup(config);
    assert!(!dict.query(b"alice").unwrap().is_member());

    dict.insert(b"alice", b"1").unwrap();
    dict.apply_pending().unwrap();
    assert!(dict.query(b"alice").unwrap().is_member());
}

#[test]
fn test_single_querier_variant() {
    let (dict, registry) = setup(DictionaryConfig::default().with_querier_pool_size(1));
    assert!(!dict.query(b"alice").unwrap().is_member());

    dict.insert(b"alice", b"1").unwrap();
    dict.apply_pending().unwrap();
    assert!(!dict.query(b"alice").unwrap().is_member());

    dict.check_for_update().unwrap();
    assert!(dict.query(b"alice").unwrap().is_member());
    // the single-querier router keeps no entry in the shared pool table
    assert!(registry.pools().is_empty());
}

#[test]
fn test_queries_spread_over_four_queriers() {
    let (dict, registry) = setup(DictionaryConfig::default());
    dict.insert(b"alice", b"1").unwrap();
    dict.apply_pending().unwrap();

    for _ in 0..4000 {
        dict.query(b"alice").unwrap();
    }

    let pool = registry.pools().get(dict.id()).unwrap();
    assert_eq!(pool.queriers().len(), 4);
    for querier in pool.queriers() {
        let served = querier.served();
        assert!((700..=1300).contains(&served), "querier {} served {}", querier.index(), served);
    }
}

#[test]
fn test_query_many_selects_one_querier() {
    let (dict, registry) = setup(DictionaryConfig::default());
    dict.query_many(&[b"a", b"b", b"c", b"d"]).unwrap();

    let pool = registry.pools().get(dict.id()).unwrap();
    let total: u64 = pool.queriers().iter().map(|q| q.served()).sum();
    assert_eq!(total, 1);
}

#[test]
fn test_separate_query_storage() {
    let write = Arc::new(MemoryStorage::new());
    let replica = Arc::new(MemoryStorage::new());
    let dict = Dictionary::new(
        DictionaryConfig::default(),
        StorageConfig::new(write.clone()).with_query_storage(replica.clone()),
        Arc::new(Registry::new()),
    )
    .unwrap();

    dict.insert(b"alice", b"1").unwrap();
    dict.apply_pending().unwrap();
    assert_eq!(dict.get_epoch().unwrap(), 1);

    // the replica hasn't received the trie yet
    dict.check_for_update().unwrap();
    assert!(!dict.query(b"alice").unwrap().is_member());

    // ship trie and element to the replica
    let trie = write.load_trie(dict.id()).unwrap().unwrap();
    replica.save_trie(dict.id(), (*trie).clone()).unwrap();
    let element = write.load_stored_element(dict.id(), b"alice").unwrap().unwrap();
    replica.save_stored_element(dict.id(), b"alice", element).unwrap();

    dict.check_for_update().unwrap();
    assert_eq!(dict.query(b"alice").unwrap().payload(), Some(&b"1"[..]));
}

#[test]
fn test_check_for_update_without_pool_is_noop() {
    let pools = Arc::new(QuerierPools::new());
    let storage = Arc::new(MemoryStorage::new());
    let router = QueryRouter::new(pools.clone(), storage, TrieStorageMode::Cached, 4);
    router.check_for_update(&verikv_core::DictionaryId::random()).unwrap();
    assert!(pools.is_empty());
}
