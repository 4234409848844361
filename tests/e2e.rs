//! End-to-end tests for a dictionary deployment
//!
//! Insert -> drain/apply -> refresh -> query, across the facade, updater and router.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use verikv_core::{
    AppendProof, ApplyFailurePolicy, ApplyOutcome, DictionaryConfig, DictionaryId,
    DictionaryStorage, MemoryStorage, RootHash, StorageConfig,
};
use verikv_dict::{Dictionary, Entry, Registry};
use verikv_updater::ApplyHook;

fn setup(config: DictionaryConfig) -> (Dictionary, Arc<MemoryStorage>, Arc<Registry>) {
    let storage = Arc::new(MemoryStorage::new());
    let registry = Arc::new(Registry::new());
    let storage_config = StorageConfig::new(storage.clone());
    let dict = Dictionary::new(config, storage_config, registry.clone()).unwrap();
    (dict, storage, registry)
}

fn entries(n: usize) -> Vec<Entry> {
    (0..n)
        .map(|i| (format!("user-{}", i).into_bytes(), format!("{}", i * 7).into_bytes()))
        .collect()
}

#[test]
fn test_alice_scenario() {
    let (dict, _, _) = setup(DictionaryConfig::default());

    dict.insert(b"alice", b"1").unwrap();
    assert_eq!(dict.get_epoch().unwrap(), 0);

    dict.apply_pending().unwrap();
    assert_eq!(dict.get_epoch().unwrap(), 1);

    let result = dict.query(b"alice").unwrap();
    assert!(result.is_member());
    assert_eq!(result.payload(), Some(&b"1"[..]));
}

#[tokio::test]
async fn test_batch_of_100_is_one_epoch() {
    let config = DictionaryConfig::default().with_thread_count(8);
    let (dict, storage, _) = setup(config);

    assert_eq!(dict.insert_batch(entries(100)).await.unwrap(), 100);
    assert_eq!(storage.element_count(dict.id()), 100);

    let outcome = dict.apply_pending().unwrap();
    assert!(matches!(outcome, ApplyOutcome::Applied { epoch: 1, updates: 100, .. }));
    assert_eq!(dict.get_epoch().unwrap(), 1);
    dict.check_for_update().unwrap();

    let commitment = dict.get_commitment().unwrap();
    let scheme = dict.config().commitment_scheme;
    for (key, payload) in entries(100) {
        let result = dict.query(&key).unwrap();
        assert_eq!(result.payload(), Some(&payload[..]));
        assert!(result.verify(&key, &commitment.root, None, scheme));
    }
}

#[test]
fn test_fresh_keys_become_members() {
    let (dict, _, _) = setup(DictionaryConfig::default().with_querier_pool_size(3));
    for i in 0..20u8 {
        dict.insert(&[b'k', i], &[i]).unwrap();
    }
    dict.apply_pending().unwrap();
    dict.check_for_update().unwrap();

    for i in 0..20u8 {
        assert_eq!(dict.query(&[b'k', i]).unwrap().payload(), Some(&[i][..]));
    }
}

#[test]
fn test_duplicate_key_is_rejected() {
    let (dict, _, _) = setup(DictionaryConfig::default());
    dict.insert(b"alice", b"1").unwrap();
    dict.apply_pending().unwrap();

    let err = dict.insert(b"alice", b"2").unwrap_err();
    assert!(err.is_duplicate_key());
    assert_eq!(dict.pending_len(), 0);

    dict.check_for_update().unwrap();
    assert_eq!(dict.query(b"alice").unwrap().payload(), Some(&b"1"[..]));
}

#[tokio::test]
async fn test_batch_duplicate_fails_fast_without_rollback() {
    let (dict, storage, _) = setup(DictionaryConfig::default().with_thread_count(1));
    dict.insert(b"user-5", b"existing").unwrap();
    dict.apply_pending().unwrap();

    let err = dict.insert_batch(entries(10)).await.unwrap_err();
    assert!(err.is_duplicate_key());

    // user-0..user-4 were written before the collision and stay
    assert_eq!(storage.element_count(dict.id()), 6);
    assert_eq!(dict.pending_len(), 5);

    dict.apply_pending().unwrap();
    dict.check_for_update().unwrap();
    assert!(dict.query(b"user-4").unwrap().is_member());
    assert!(!dict.query(b"user-6").unwrap().is_member());
    assert_eq!(dict.query(b"user-5").unwrap().payload(), Some(&b"existing"[..]));
}

#[tokio::test]
async fn test_batch_duplicate_with_many_workers_keeps_storage_and_trie_aligned() {
    let (dict, storage, _) = setup(DictionaryConfig::default().with_thread_count(4));
    let mut batch = entries(40);
    batch.push(batch[3].clone());

    assert!(dict.insert_batch(batch).await.unwrap_err().is_duplicate_key());

    // whatever got written is exactly what gets committed
    let written = storage.element_count(dict.id());
    assert_eq!(dict.pending_len(), written);
    dict.apply_pending().unwrap();
    let trie = storage.load_trie(dict.id()).unwrap().unwrap();
    assert_eq!(trie.len(), written);
}

#[test]
fn test_epoch_is_monotonic() {
    let (dict, _, _) = setup(DictionaryConfig::default());
    let mut last = dict.get_epoch().unwrap();

    for round in 0..5u8 {
        assert!(dict.apply_pending().unwrap().is_idle());
        assert_eq!(dict.get_epoch().unwrap(), last);

        dict.insert(&[round], b"v").unwrap();
        dict.apply_pending().unwrap();
        let epoch = dict.get_epoch().unwrap();
        assert_eq!(epoch, last + 1);
        last = epoch;
    }
}

#[tokio::test]
async fn test_scheduler_commits_in_background() {
    let config = DictionaryConfig::default().with_commit_interval(Duration::from_millis(20));
    let (dict, _, _) = setup(config);

    dict.insert(b"alice", b"1").unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while dict.get_epoch().unwrap() == 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(dict.get_epoch().unwrap(), 1);

    dict.check_for_update().unwrap();
    assert!(dict.query(b"alice").unwrap().is_member());
    dict.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_registry_shutdown_flushes_schedulers() {
    let config = DictionaryConfig::default().with_commit_interval(Duration::from_secs(3600));
    let (dict, storage, registry) = setup(config);
    let id = *dict.id();

    dict.insert(b"alice", b"1").unwrap();
    assert_eq!(registry.shutdown().await, 0);

    assert_eq!(storage.get_trie_epoch(&id).unwrap(), 1);
    assert_eq!(storage.element_count(&id), 1);
    assert_eq!(registry.pending().pending_len(&id), 0);
    drop(dict);
}

#[tokio::test]
async fn test_registry_shutdown_reports_unapplied_updates() {
    let config = DictionaryConfig::default().with_commit_interval(Duration::from_secs(3600));
    let (dict, storage, registry) = setup(config);
    let id = *dict.id();

    dict.insert(b"alice", b"1").unwrap();
    storage.set_fail_trie_writes(true);
    assert_eq!(registry.shutdown().await, 1);
    assert_eq!(storage.get_trie_epoch(&id).unwrap(), 0);
    drop(dict);
}

#[tokio::test]
async fn test_shutdown_keeps_updates_when_final_flush_fails() {
    let config = DictionaryConfig::default().with_commit_interval(Duration::from_secs(3600));
    let (dict, storage, registry) = setup(config);
    let id = *dict.id();
    let snapshot = dict.save().unwrap();

    dict.insert(b"alice", b"1").unwrap();
    storage.set_fail_trie_writes(true);
    assert!(dict.shutdown().await.is_err());
    assert_eq!(registry.pending().pending_len(&id), 1);

    storage.set_fail_trie_writes(false);
    let storage_config = StorageConfig::new(storage.clone());
    let restored = Dictionary::load(&snapshot, storage_config, registry.clone()).unwrap();
    assert_eq!(restored.id(), &id);
    assert_eq!(restored.pending_len(), 1);

    assert!(matches!(restored.apply_pending().unwrap(), ApplyOutcome::Applied { epoch: 1, .. }));
    restored.check_for_update().unwrap();
    assert!(restored.query(b"alice").unwrap().is_member());
    assert!(restored.insert(b"alice", b"2").unwrap_err().is_duplicate_key());
    restored.shutdown().await.unwrap();
}

#[test]
fn test_failed_apply_is_requeued() {
    let (dict, storage, _) = setup(DictionaryConfig::default());
    dict.insert(b"alice", b"1").unwrap();

    storage.set_fail_trie_writes(true);
    assert!(dict.apply_pending().is_err());
    assert_eq!(dict.get_epoch().unwrap(), 0);
    assert_eq!(dict.pending_len(), 1);

    storage.set_fail_trie_writes(false);
    dict.apply_pending().unwrap();
    assert_eq!(dict.get_epoch().unwrap(), 1);
    assert!(dict.query(b"alice").unwrap().is_member());
}

#[test]
fn test_failed_apply_can_discard() {
    let config = DictionaryConfig::default().with_apply_failure_policy(ApplyFailurePolicy::Discard);
    let (dict, storage, _) = setup(config);
    dict.insert(b"alice", b"1").unwrap();

    storage.set_fail_trie_writes(true);
    assert!(dict.apply_pending().is_err());
    assert_eq!(dict.pending_len(), 0);
}

#[derive(Default)]
struct ProofLog(Mutex<Vec<(DictionaryId, RootHash, Vec<AppendProof>)>>);

impl ApplyHook for ProofLog {
    fn on_applied(
        &self,
        id: &DictionaryId,
        root: &RootHash,
        proofs: &[AppendProof],
    ) -> verikv_core::Result<()> {
        self.0.lock().unwrap().push((*id, *root, proofs.to_vec()));
        Ok(())
    }
}

#[test]
fn test_append_proofs_reach_the_hook() {
    let log = Arc::new(ProofLog::default());
    let dict = Dictionary::builder(DictionaryConfig::default())
        .write_storage(Arc::new(MemoryStorage::new()))
        .hook(log.clone())
        .build()
        .unwrap();

    dict.insert(b"alice", b"1").unwrap();
    dict.insert(b"bob", b"2").unwrap();
    dict.apply_pending().unwrap();

    let calls = log.0.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (id, root, proofs) = &calls[0];
    assert_eq!(id, dict.id());
    assert_eq!(*root, dict.get_commitment().unwrap().root);
    assert_eq!(proofs.len(), 2);
    for proof in proofs {
        assert_eq!(proof.epoch, 1);
        assert!(verikv_core::verify_path(root, &proof.path));
    }
}

#[test]
fn test_dictionaries_share_a_registry_without_interference() {
    let registry = Arc::new(Registry::new());
    let storage = Arc::new(MemoryStorage::new());
    let new_dictionary = || {
        let storage_config = StorageConfig::new(storage.clone());
        Dictionary::new(DictionaryConfig::default(), storage_config, registry.clone()).unwrap()
    };
    let a = new_dictionary();
    let b = new_dictionary();

    a.insert(b"alice", b"a").unwrap();
    b.insert(b"alice", b"b").unwrap();
    a.apply_pending().unwrap();

    assert_eq!(a.get_epoch().unwrap(), 1);
    assert_eq!(b.get_epoch().unwrap(), 0);
    assert_eq!(b.pending_len(), 1);
    assert_eq!(registry.pools().len(), 0);

    assert_eq!(a.query(b"alice").unwrap().payload(), Some(&b"a"[..]));
    assert_eq!(registry.pools().len(), 1);
}
