//! Dictionary facade: the public entry point of a VeriKV deployment

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use verikv_core::{
    derive_label_cached, ApplyOutcome, DictionaryConfig, DictionaryId, DictionarySnapshot,
    DictionaryStorage, Epoch, Error, LabelCache, LabelProof, LabelScheme, LabelSecret, LookupPath,
    QueryProvider, Result, SnapshotFormatError, StorageConfig, TrieInfoProvider, UpdateProvider,
    PUBLIC_KEY_SIZE,
};
use verikv_server::{QueryRouter, SingleQuerierRouter, StorageTrieInfo};
use verikv_updater::{ApplyHook, BufferedUpdater, NoopApplyHook, UpdaterConfig};

use crate::batch::{write_batch, Entry, ShardWriter};
use crate::registry::Registry;
use crate::response::{DictionaryCommitment, QueryResult};

struct Scheduler {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// One logical authenticated dictionary
///
/// Inserts are written to storage immediately and become visible to queries once the
/// updater has applied them and the queriers have been refreshed.
pub struct Dictionary {
    id: DictionaryId,
    config: DictionaryConfig,
    secret: Arc<LabelSecret>,
    cache: LabelCache,
    storage: Arc<dyn DictionaryStorage>,
    query_storage: Arc<dyn DictionaryStorage>,
    registry: Arc<Registry>,
    query: Arc<dyn QueryProvider>,
    updater: Arc<dyn UpdateProvider>,
    trie_info: Arc<dyn TrieInfoProvider>,
    scheduler: Option<Scheduler>,
}

/// Builder for [`Dictionary`], fresh or restored from a snapshot
pub struct DictionaryBuilder {
    config: DictionaryConfig,
    storage: StorageConfig,
    registry: Option<Arc<Registry>>,
    hook: Arc<dyn ApplyHook>,
    restored: Option<(LabelSecret, DictionaryId)>,
}

impl DictionaryBuilder {
    pub fn new(config: DictionaryConfig) -> Self {
        Self {
            config,
            storage: StorageConfig::default(),
            registry: None,
            hook: Arc::new(NoopApplyHook),
            restored: None,
        }
    }

    /// Decode a snapshot produced by [`Dictionary::save`]
    ///
    /// Fails without side effects on a malformed or unsupported snapshot.
    pub fn from_snapshot(bytes: &[u8]) -> Result<Self> {
        let snapshot = DictionarySnapshot::from_bytes(bytes)?;
        let config: DictionaryConfig = bincode::deserialize(&snapshot.config_blob)
            .map_err(|e| SnapshotFormatError::InvalidConfig(e.to_string()))?;

        let secret = match (config.label_scheme, &snapshot.secret_key) {
            (LabelScheme::Verifiable, Some(key)) => LabelSecret::from_secret_key_bytes(key)?,
            (LabelScheme::Plain, None) => {
                let seed = config.label_seed.ok_or_else(|| {
                    SnapshotFormatError::InvalidConfig("plain label scheme without a seed".into())
                })?;
                LabelSecret::generate(LabelScheme::Plain, Some(&seed))
            }
            (scheme, key) => {
                return Err(SnapshotFormatError::SecretKeyPresence {
                    expected: scheme == LabelScheme::Verifiable,
                    actual: key.is_some(),
                }
                .into())
            }
        };

        let mut builder = Self::new(config);
        builder.restored = Some((secret, snapshot.id));
        Ok(builder)
    }

    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    pub fn write_storage(mut self, storage: Arc<dyn DictionaryStorage>) -> Self {
        self.storage.write = Some(storage);
        self
    }

    /// Storage for queriers; the write storage is used when unset
    pub fn query_storage(mut self, storage: Arc<dyn DictionaryStorage>) -> Self {
        self.storage.query = Some(storage);
        self
    }

    /// Share process-wide tables with other dictionaries
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Receive append proofs after each applied batch
    pub fn hook(mut self, hook: Arc<dyn ApplyHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn build(self) -> Result<Dictionary> {
        let mut config = self.config;
        config.validate()?;
        let storage = self.storage.write_storage()?;
        let query_storage = self.storage.query_storage()?;

        let registry = self.registry.unwrap_or_default();
        if registry.is_shut_down() {
            return Err(Error::Configuration("registry has been shut down".into()));
        }

        let (secret, id) = match self.restored {
            Some(restored) => restored,
            None => {
                // plain labels are re-derived from the seed after a load, so pin one now
                if config.label_scheme == LabelScheme::Plain && config.label_seed.is_none() {
                    config.label_seed = Some(rand::random());
                }
                let secret = LabelSecret::generate(config.label_scheme, config.label_seed.as_ref());
                (secret, DictionaryId::random())
            }
        };

        let query: Arc<dyn QueryProvider> = if config.querier_pool_size == 1 {
            Arc::new(SingleQuerierRouter::new(query_storage.clone(), config.trie_storage_mode))
        } else {
            Arc::new(QueryRouter::new(
                registry.pools().clone(),
                query_storage.clone(),
                config.trie_storage_mode,
                config.querier_pool_size,
            ))
        };

        let updater = Arc::new(
            BufferedUpdater::new(
                UpdaterConfig::from(&config),
                registry.pending().clone(),
                storage.clone(),
            )
            .with_hook(self.hook),
        );
        let scheduler = match config.commit_interval {
            Some(_) => {
                let cancel = registry.child_token()?;
                let handle = updater.spawn_scheduler(id, cancel.clone(), registry.tasks())?;
                Some(Scheduler { cancel, handle })
            }
            None => None,
        };

        info!(
            %id,
            label_scheme = %config.label_scheme,
            commitment_scheme = %config.commitment_scheme,
            storage = storage.name(),
            queriers = config.querier_pool_size,
            threads = config.thread_count,
            scheduler = scheduler.is_some(),
            "Dictionary initialized"
        );

        Ok(Dictionary {
            id,
            cache: LabelCache::new(config.label_cache_size),
            secret: Arc::new(secret),
            trie_info: Arc::new(StorageTrieInfo::new(storage.clone())),
            storage,
            query_storage,
            registry,
            query,
            updater,
            scheduler,
            config,
        })
    }
}

impl Dictionary {
    /// Fresh dictionary with a random id
    pub fn new(
        config: DictionaryConfig,
        storage: StorageConfig,
        registry: Arc<Registry>,
    ) -> Result<Self> {
        DictionaryBuilder::new(config)
            .storage(storage)
            .registry(registry)
            .build()
    }

    /// Restore a dictionary from [`Dictionary::save`] output
    pub fn load(bytes: &[u8], storage: StorageConfig, registry: Arc<Registry>) -> Result<Self> {
        DictionaryBuilder::from_snapshot(bytes)?
            .storage(storage)
            .registry(registry)
            .build()
    }

    pub fn builder(config: DictionaryConfig) -> DictionaryBuilder {
        DictionaryBuilder::new(config)
    }

    pub fn id(&self) -> &DictionaryId {
        &self.id
    }

    pub fn config(&self) -> &DictionaryConfig {
        &self.config
    }

    /// Label verification key (verifiable label scheme only)
    pub fn public_key(&self) -> Option<[u8; PUBLIC_KEY_SIZE]> {
        self.secret.public_key()
    }

    fn shard_writer(&self) -> ShardWriter {
        ShardWriter {
            id: self.id,
            secret: self.secret.clone(),
            scheme: self.config.commitment_scheme,
            storage: self.storage.clone(),
            write_lock: self.registry.write_lock(&self.id),
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Insert a new key
    ///
    /// Fails with a duplicate-key error if the key was inserted before; the stored
    /// payload is never overwritten.
    pub fn insert(&self, key: &[u8], payload: &[u8]) -> Result<()> {
        let update = self.shard_writer().write_entry(key, payload)?;
        self.updater.enqueue(&self.id, vec![update]);
        debug!(id = %self.id, "Inserted key");
        Ok(())
    }

    /// Insert many keys with `thread_count` parallel workers
    ///
    /// Stops at the first duplicate. Entries written before that point stay inserted
    /// and are enqueued; the returned error says which key collided.
    pub async fn insert_batch(&self, entries: Vec<Entry>) -> Result<usize> {
        let total = entries.len();
        let (updates, error) =
            write_batch(self.shard_writer(), entries, self.config.thread_count).await;
        let written = updates.len();
        self.updater.enqueue(&self.id, updates);

        match error {
            Some(e) => Err(e),
            None => {
                info!(id = %self.id, entries = total, "Batch inserted");
                Ok(written)
            }
        }
    }

    fn label(&self, key: &[u8]) -> ([u8; 32], Option<LabelProof>) {
        derive_label_cached(key, &self.secret, &self.cache)
    }

    fn resolve(
        &self,
        key: &[u8],
        path: LookupPath,
        proof: Option<LabelProof>,
    ) -> Result<QueryResult> {
        if !path.is_member() {
            return Ok(QueryResult::NonMembership { path, proof });
        }
        let element = self
            .query_storage
            .load_stored_element(&self.id, key)?
            .ok_or_else(|| {
                Error::InconsistentState(format!(
                    "label {} is in the trie of {} but its key has no stored element",
                    hex::encode(path.label),
                    self.id
                ))
            })?;
        Ok(QueryResult::Membership {
            payload: element.payload,
            randomness: element.randomness,
            path,
            proof,
        })
    }

    /// Look up one key through a (possibly stale) querier
    pub fn query(&self, key: &[u8]) -> Result<QueryResult> {
        let (label, proof) = self.label(key);
        let path = self.query.lookup(&self.id, &label)?;
        self.resolve(key, path, proof)
    }

    /// Look up several keys through one querier
    pub fn query_many<K: AsRef<[u8]>>(&self, keys: &[K]) -> Result<Vec<QueryResult>> {
        let derived: Vec<_> = keys.iter().map(|k| self.label(k.as_ref())).collect();
        let labels: Vec<_> = derived.iter().map(|(label, _)| *label).collect();
        let paths = self.query.lookup_many(&self.id, &labels)?;

        keys.iter()
            .zip(derived)
            .zip(paths)
            .map(|((key, (_, proof)), path)| self.resolve(key.as_ref(), path, proof))
            .collect()
    }

    /// Current epoch, read from storage
    pub fn get_epoch(&self) -> Result<Epoch> {
        self.trie_info.get_epoch(&self.id)
    }

    /// Current root, epoch and label verification key
    pub fn get_commitment(&self) -> Result<DictionaryCommitment> {
        Ok(DictionaryCommitment {
            root: self.trie_info.get_root_hash(&self.id)?,
            epoch: self.trie_info.get_epoch(&self.id)?,
            public_key: self.public_key(),
        })
    }

    /// Refresh every querier of this dictionary
    pub fn check_for_update(&self) -> Result<()> {
        self.query.check_for_update(&self.id)
    }

    /// Run one drain-apply cycle now
    pub fn apply_pending(&self) -> Result<ApplyOutcome> {
        self.updater.apply_pending(&self.id)
    }

    pub fn pending_len(&self) -> usize {
        self.updater.pending_len(&self.id)
    }

    /// Serialize configuration, label secret and id
    pub fn save(&self) -> Result<Vec<u8>> {
        let config_blob = bincode::serialize(&self.config)?;
        let secret_key = self.secret.secret_key_bytes().map(|key| key.to_vec());
        let bytes = DictionarySnapshot::new(config_blob, secret_key, self.id).to_bytes();
        info!(id = %self.id, bytes = bytes.len(), "Saved dictionary snapshot");
        Ok(bytes)
    }

    /// Stop the scheduler, flush pending updates and release per-id state
    ///
    /// If updates are still pending after the final cycle, one more apply is tried. When
    /// that fails too its error is returned and the updates stay queued in the registry,
    /// where a dictionary loaded with the same id and registry picks them up.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.cancel.cancel();
            scheduler
                .handle
                .await
                .map_err(|e| Error::Worker(e.to_string()))?;
        }

        if self.updater.pending_len(&self.id) > 0 {
            if let Err(e) = self.updater.apply_pending(&self.id) {
                error!(
                    id = %self.id,
                    pending = self.updater.pending_len(&self.id),
                    error = %e,
                    "Shutdown left updates unapplied"
                );
                return Err(e);
            }
        }

        self.registry.release(&self.id);
        info!(id = %self.id, "Dictionary shut down");
        Ok(())
    }
}

impl Drop for Dictionary {
    fn drop(&mut self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.cancel.cancel();
        }
    }
}
