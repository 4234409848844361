//! Dictionary configuration

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::commitment::CommitmentScheme;
use crate::label::LabelScheme;
use crate::storage::DictionaryStorage;
use crate::Error;

/// Default number of label derivations kept in the query-side cache
pub const DEFAULT_LABEL_CACHE_SIZE: usize = 1024;

/// Default number of queriers per dictionary
pub const DEFAULT_QUERIER_POOL_SIZE: usize = 4;

/// Queriers are selected with one random byte, so a pool can't be larger than this
pub const MAX_QUERIER_POOL_SIZE: usize = 256;

/// How queriers see the trie snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrieStorageMode {
    /// Each querier keeps its own snapshot until refreshed
    #[default]
    Cached,
    /// Every lookup reads the snapshot from storage
    Direct,
}

/// What the scheduler does with a drained batch that failed to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyFailurePolicy {
    /// Put the batch back at the head of the queue for the next cycle
    #[default]
    Requeue,
    /// Drop the batch after reporting it
    Discard,
}

/// Immutable-after-construction settings of one dictionary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryConfig {
    #[serde(default)]
    pub commitment_scheme: CommitmentScheme,
    #[serde(default)]
    pub label_scheme: LabelScheme,
    #[serde(default)]
    pub trie_storage_mode: TrieStorageMode,
    /// Seed for the label secret; generated at construction when absent
    #[serde(default, with = "hex_seed")]
    pub label_seed: Option<[u8; 32]>,
    /// Capacity of the label cache (0 disables it)
    #[serde(default = "default_label_cache_size")]
    pub label_cache_size: usize,
    /// Workers used by batch insert
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,
    #[serde(default = "default_querier_pool_size")]
    pub querier_pool_size: usize,
    /// Period of the background commit scheduler; `None` leaves commits to the caller
    #[serde(default)]
    pub commit_interval: Option<Duration>,
    #[serde(default)]
    pub on_apply_failure: ApplyFailurePolicy,
}

fn default_label_cache_size() -> usize {
    DEFAULT_LABEL_CACHE_SIZE
}

fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_querier_pool_size() -> usize {
    DEFAULT_QUERIER_POOL_SIZE
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self {
            commitment_scheme: CommitmentScheme::default(),
            label_scheme: LabelScheme::default(),
            trie_storage_mode: TrieStorageMode::default(),
            label_seed: None,
            label_cache_size: default_label_cache_size(),
            thread_count: default_thread_count(),
            querier_pool_size: default_querier_pool_size(),
            commit_interval: None,
            on_apply_failure: ApplyFailurePolicy::default(),
        }
    }
}

impl DictionaryConfig {
    pub fn with_commitment_scheme(mut self, scheme: CommitmentScheme) -> Self {
        self.commitment_scheme = scheme;
        self
    }

    pub fn with_label_scheme(mut self, scheme: LabelScheme) -> Self {
        self.label_scheme = scheme;
        self
    }

    pub fn with_trie_storage_mode(mut self, mode: TrieStorageMode) -> Self {
        self.trie_storage_mode = mode;
        self
    }

    pub fn with_label_seed(mut self, seed: [u8; 32]) -> Self {
        self.label_seed = Some(seed);
        self
    }

    pub fn with_label_cache_size(mut self, size: usize) -> Self {
        self.label_cache_size = size;
        self
    }

    pub fn with_thread_count(mut self, threads: usize) -> Self {
        self.thread_count = threads;
        self
    }

    pub fn with_querier_pool_size(mut self, size: usize) -> Self {
        self.querier_pool_size = size;
        self
    }

    /// Enable the background scheduler with the given period
    pub fn with_commit_interval(mut self, interval: Duration) -> Self {
        self.commit_interval = Some(interval);
        self
    }

    pub fn with_apply_failure_policy(mut self, policy: ApplyFailurePolicy) -> Self {
        self.on_apply_failure = policy;
        self
    }

    /// Reject settings no component can work with
    pub fn validate(&self) -> crate::Result<()> {
        if self.thread_count == 0 {
            return Err(Error::Configuration("thread_count must be at least 1".into()));
        }
        if self.querier_pool_size == 0 || self.querier_pool_size > MAX_QUERIER_POOL_SIZE {
            return Err(Error::Configuration(format!(
                "querier_pool_size must be in 1..={}, got {}",
                MAX_QUERIER_POOL_SIZE, self.querier_pool_size
            )));
        }
        if self.commit_interval == Some(Duration::ZERO) {
            return Err(Error::Configuration("commit_interval must be non-zero".into()));
        }
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Hash of the parameters that change label or commitment derivation
    pub fn compute_hash(&self) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        self.commitment_scheme.hash(&mut hasher);
        self.label_scheme.hash(&mut hasher);
        self.label_seed.hash(&mut hasher);
        self.trie_storage_mode.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

/// Runtime storage handles for one dictionary
///
/// Not part of the snapshot; supplied again on load.
#[derive(Clone, Default)]
pub struct StorageConfig {
    /// Primary storage, mandatory
    pub write: Option<Arc<dyn DictionaryStorage>>,
    /// Storage read by queriers, defaults to `write`
    pub query: Option<Arc<dyn DictionaryStorage>>,
}

impl StorageConfig {
    pub fn new(write: Arc<dyn DictionaryStorage>) -> Self {
        Self {
            write: Some(write),
            query: None,
        }
    }

    pub fn with_query_storage(mut self, query: Arc<dyn DictionaryStorage>) -> Self {
        self.query = Some(query);
        self
    }

    /// Primary storage, or a configuration error if none was given
    pub fn write_storage(&self) -> crate::Result<Arc<dyn DictionaryStorage>> {
        self.write
            .clone()
            .ok_or_else(|| Error::Configuration("write storage handle is required".into()))
    }

    /// Storage for the read side
    pub fn query_storage(&self) -> crate::Result<Arc<dyn DictionaryStorage>> {
        match &self.query {
            Some(query) => Ok(query.clone()),
            None => self.write_storage(),
        }
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("write", &self.write.as_ref().map(|s| s.name()))
            .field("query", &self.query.as_ref().map(|s| s.name()))
            .finish()
    }
}

/// Serde helper for an optional 32-byte seed as a hex string
mod hex_seed {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(seed: &Option<[u8; 32]>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match seed {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<[u8; 32]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(s) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let s = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("label seed must be 32 bytes"))?;
        Ok(Some(seed))
    }
}
