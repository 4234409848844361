//! Provider roles behind the dictionary facade
//!
//! The facade talks to its read, write and trie-info paths only through these traits,
//! so a deployment can swap a replicated router for a single-replica one (or a
//! remote one) without touching the facade.

use crate::types::{DictionaryId, Epoch, Label, LookupPath, PendingUpdate, RootHash};
use crate::Result;

/// Read path: label lookups against a (possibly stale) trie view
pub trait QueryProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn lookup(&self, id: &DictionaryId, label: &Label) -> Result<LookupPath>;

    /// Batch lookup served by a single replica
    fn lookup_many(&self, id: &DictionaryId, labels: &[Label]) -> Result<Vec<LookupPath>>;

    /// Bring every replica for `id` up to the current storage snapshot
    fn check_for_update(&self, id: &DictionaryId) -> Result<()>;
}

/// Outcome of one drain-apply cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Nothing was pending
    Idle,
    Applied {
        epoch: Epoch,
        root: RootHash,
        updates: usize,
    },
}

impl ApplyOutcome {
    pub fn is_idle(&self) -> bool {
        matches!(self, ApplyOutcome::Idle)
    }
}

/// Write path: buffers pending updates and applies them to the trie
pub trait UpdateProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn enqueue(&self, id: &DictionaryId, updates: Vec<PendingUpdate>);

    /// Drain the queue for `id` and apply it as one epoch
    fn apply_pending(&self, id: &DictionaryId) -> Result<ApplyOutcome>;

    fn pending_len(&self, id: &DictionaryId) -> usize;
}

/// Always-current trie metadata read straight from storage
pub trait TrieInfoProvider: Send + Sync {
    /// Root commitment, all zeros when no snapshot exists
    fn get_root_hash(&self, id: &DictionaryId) -> Result<RootHash>;

    /// Epoch, zero when no snapshot exists
    fn get_epoch(&self, id: &DictionaryId) -> Result<Epoch>;
}
