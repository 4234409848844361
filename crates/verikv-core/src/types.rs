//! Data model shared by every component of a dictionary deployment

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::hash::Hash;

/// Size of a dictionary identifier in bytes
pub const DICTIONARY_ID_SIZE: usize = 16;

/// Trie path derived from a key (32 bytes)
pub type Label = [u8; 32];

/// Hiding commitment to a payload (32 bytes)
pub type Commitment = [u8; 32];

/// Randomness used to open a commitment (32 bytes)
pub type Randomness = [u8; 32];

/// Root commitment of a trie snapshot
pub type RootHash = Hash;

/// Epoch counter of a trie snapshot
pub type Epoch = u64;

/// Opaque identifier scoping all state to one logical dictionary
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DictionaryId([u8; DICTIONARY_ID_SIZE]);

impl DictionaryId {
    /// Generate a fresh random identifier
    pub fn random() -> Self {
        let mut bytes = [0u8; DICTIONARY_ID_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; DICTIONARY_ID_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DICTIONARY_ID_SIZE] {
        &self.0
    }
}

impl fmt::Display for DictionaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for DictionaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DictionaryId({})", hex::encode(self.0))
    }
}

/// Payload and opening randomness kept in storage for one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredElement {
    pub payload: Vec<u8>,
    pub randomness: Randomness,
}

/// A (label, commitment) pair waiting to be applied to the trie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpdate {
    pub label: Label,
    pub commitment: Commitment,
}

impl PendingUpdate {
    pub fn new(label: Label, commitment: Commitment) -> Self {
        Self { label, commitment }
    }
}

/// Lookup result for one label, doubling as its (non-)membership proof
///
/// `siblings[d]` is the hash of the subtree next to the label's path at depth `d`.
/// `terminal` is the single leaf (if any) left in the subtree where the walk stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupPath {
    /// Label that was looked up
    pub label: Label,
    /// Commitment stored under `label`, if present
    pub leaf: Option<Commitment>,
    /// Leaf reached at the end of the walk (may belong to another label)
    pub terminal: Option<(Label, Commitment)>,
    /// Sibling hashes from the root downwards
    pub siblings: Vec<Hash>,
    /// Epoch of the snapshot that answered the lookup
    pub epoch: Epoch,
    /// Root of the snapshot that answered the lookup
    pub root: RootHash,
}

impl LookupPath {
    /// Path through an absent (empty) trie
    pub fn empty(label: Label) -> Self {
        Self {
            label,
            leaf: None,
            terminal: None,
            siblings: Vec::new(),
            epoch: 0,
            root: crate::hash::EMPTY_HASH,
        }
    }

    pub fn is_member(&self) -> bool {
        self.leaf.is_some()
    }
}

/// Evidence that an update was applied at a given epoch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendProof {
    pub update: PendingUpdate,
    pub epoch: Epoch,
    pub path: LookupPath,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_ids_differ() {
        assert_ne!(DictionaryId::random(), DictionaryId::random());
    }

    #[test]
    fn test_id_display_is_hex() {
        let id = DictionaryId::from_bytes([0xab; DICTIONARY_ID_SIZE]);
        assert_eq!(id.to_string(), "ab".repeat(DICTIONARY_ID_SIZE));
        assert!(format!("{:?}", id).starts_with("DictionaryId(abab"));
    }

    #[test]
    fn test_empty_path_is_not_member() {
        let path = LookupPath::empty([1u8; 32]);
        assert!(!path.is_member());
        assert_eq!(path.epoch, 0);
    }
}
