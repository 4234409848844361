//! verikv-core: data model and collaborator contracts for VeriKV
//!
//! A VeriKV dictionary is an authenticated key-value store: every lookup is answered
//! with a (non-)membership path rooted in one commitment value. This crate holds the
//! pieces shared by the write path (`verikv-updater`), the read path (`verikv-server`)
//! and the facade (`verikv-dict`):
//!
//! - Label derivation (plain keyed hash or a ristretto255 VRF) and payload commitments
//! - Dictionary configuration and the versioned snapshot format
//! - The storage contract with an in-memory backend
//! - A reference sparse Merkle trie
//! - The provider traits the facade is built on
//!
//! ## Storage view
//!
//! | Item | Keyed by | Written by |
//! |------|----------|------------|
//! | `StoredElement` | (id, key) | facade insert, once per key |
//! | `TrieSnapshot` | id | updater only |

mod commitment;
mod config;
mod error;
mod hash;
mod label;
mod providers;
mod storage;
mod trie;
mod types;

pub mod snapshot_format;

pub use commitment::{commit_payload, open_commitment, CommitmentScheme};
pub use config::{
    ApplyFailurePolicy, DictionaryConfig, StorageConfig, TrieStorageMode, DEFAULT_LABEL_CACHE_SIZE,
    DEFAULT_QUERIER_POOL_SIZE, MAX_QUERIER_POOL_SIZE,
};
pub use error::Error;
pub use hash::{keccak256, sha3_256, Hash, EMPTY_HASH};
pub use label::{
    derive_label, derive_label_cached, verify_label, LabelCache, LabelProof, LabelScheme,
    LabelSecret, VrfKey, LABEL_PROOF_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE,
};
pub use providers::{ApplyOutcome, QueryProvider, TrieInfoProvider, UpdateProvider};
pub use snapshot_format::{DictionarySnapshot, SnapshotFormatError};
pub use storage::{DictionaryStorage, MemoryStorage};
pub use trie::{verify_path, TrieSnapshot};
pub use types::{
    AppendProof, Commitment, DictionaryId, Epoch, Label, LookupPath, PendingUpdate, Randomness,
    RootHash, StoredElement, DICTIONARY_ID_SIZE,
};

pub type Result<T> = std::result::Result<T, Error>;
