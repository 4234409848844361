//! Reference authenticated trie: a compact sparse Merkle tree over 256-bit labels
//!
//! Subtree hashing:
//! - no leaves: `EMPTY_HASH`
//! - one leaf: `keccak(0x00 || label || commitment)` regardless of depth
//! - two or more: `keccak(0x01 || left || right)`, splitting on the label bit at that depth
//!
//! A subtree is named by its depth and the label prefix above it. Hashes of subtrees with
//! two or more leaves are memoized, and `apply_batch` rehashes only the nodes on the paths
//! of the updated labels, so lookups and commits cost `O(depth * log n)`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::hash::{keccak256, Hash, EMPTY_HASH};
use crate::types::{AppendProof, Commitment, Epoch, Label, LookupPath, PendingUpdate, RootHash};

const LEAF_TAG: &[u8] = &[0x00];
const NODE_TAG: &[u8] = &[0x01];

/// Depth plus the label with every bit below that depth cleared
type NodeKey = (u16, Label);

/// Immutable-by-convention view of a dictionary's trie at one epoch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "TrieLeaves", from = "TrieLeaves")]
pub struct TrieSnapshot {
    epoch: Epoch,
    root: RootHash,
    leaves: BTreeMap<Label, Commitment>,
    nodes: BTreeMap<NodeKey, Hash>,
}

/// Serialized form: the node cache is rebuilt on load
#[derive(Serialize, Deserialize)]
struct TrieLeaves {
    epoch: Epoch,
    root: RootHash,
    leaves: BTreeMap<Label, Commitment>,
}

impl From<TrieSnapshot> for TrieLeaves {
    fn from(trie: TrieSnapshot) -> Self {
        Self {
            epoch: trie.epoch,
            root: trie.root,
            leaves: trie.leaves,
        }
    }
}

impl From<TrieLeaves> for TrieSnapshot {
    fn from(stored: TrieLeaves) -> Self {
        let mut trie = TrieSnapshot {
            epoch: stored.epoch,
            root: stored.root,
            leaves: stored.leaves,
            nodes: BTreeMap::new(),
        };
        let labels: Vec<Label> = trie.leaves.keys().copied().collect();
        trie.rehash_paths(&labels);
        trie
    }
}

enum Subtree<'a> {
    Empty,
    Leaf(&'a Label, &'a Commitment),
    Node,
}

impl TrieSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn root_commitment(&self) -> RootHash {
        self.root
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn get(&self, label: &Label) -> Option<&Commitment> {
        self.leaves.get(label)
    }

    /// Walk the trie towards `label`, collecting sibling hashes
    pub fn lookup(&self, label: &Label) -> LookupPath {
        let mut depth = 0;
        let mut siblings = Vec::new();

        let terminal = loop {
            match self.subtree(label, depth) {
                Subtree::Empty => break None,
                Subtree::Leaf(l, c) => break Some((*l, *c)),
                Subtree::Node => {
                    siblings.push(self.subtree_hash(&flip_bit(label, depth), depth + 1));
                    depth += 1;
                }
            }
        };

        LookupPath {
            label: *label,
            leaf: terminal.filter(|(l, _)| l == label).map(|(_, c)| c),
            terminal,
            siblings,
            epoch: self.epoch,
            root: self.root,
        }
    }

    /// Apply a batch of updates as one epoch
    ///
    /// An empty batch leaves the snapshot untouched.
    pub fn apply_batch(&mut self, updates: &[PendingUpdate]) -> (Vec<AppendProof>, RootHash) {
        if updates.is_empty() {
            return (Vec::new(), self.root);
        }

        for update in updates {
            self.leaves.insert(update.label, update.commitment);
        }
        let labels: Vec<Label> = updates.iter().map(|update| update.label).collect();
        self.rehash_paths(&labels);
        self.epoch += 1;

        let proofs = updates
            .iter()
            .map(|update| AppendProof {
                update: *update,
                epoch: self.epoch,
                path: self.lookup(&update.label),
            })
            .collect();

        (proofs, self.root)
    }

    /// Recompute every memoized node on the paths of `labels`, deepest first, then the root
    fn rehash_paths(&mut self, labels: &[Label]) {
        let mut dirty = BTreeSet::new();
        for label in labels {
            let mut depth = 0;
            while let Subtree::Node = self.subtree(label, depth) {
                dirty.insert(node_key(label, depth));
                depth += 1;
            }
        }

        for &(depth, prefix) in dirty.iter().rev() {
            let depth = usize::from(depth);
            let left = self.subtree_hash(&prefix, depth + 1);
            let right = self.subtree_hash(&flip_bit(&prefix, depth), depth + 1);
            self.nodes.insert(node_key(&prefix, depth), node_hash(&left, &right));
        }

        self.root = self.subtree_hash(&[0u8; 32], 0);
    }

    fn subtree(&self, label: &Label, depth: usize) -> Subtree<'_> {
        let (lo, hi) = prefix_range(label, depth);
        let mut leaves = self.leaves.range(lo..=hi);
        match (leaves.next(), leaves.next()) {
            (None, _) => Subtree::Empty,
            (Some((l, c)), None) => Subtree::Leaf(l, c),
            _ => Subtree::Node,
        }
    }

    fn subtree_hash(&self, label: &Label, depth: usize) -> Hash {
        match self.subtree(label, depth) {
            Subtree::Empty => EMPTY_HASH,
            Subtree::Leaf(l, c) => leaf_hash(l, c),
            Subtree::Node => match self.nodes.get(&node_key(label, depth)) {
                Some(hash) => *hash,
                None => node_hash(
                    &self.subtree_hash(&clear_bit(label, depth), depth + 1),
                    &self.subtree_hash(&flip_bit(&clear_bit(label, depth), depth), depth + 1),
                ),
            },
        }
    }
}

/// Check a lookup path against a root commitment
///
/// Accepts both membership paths (terminal leaf is the label) and non-membership
/// paths (empty terminal, or a terminal leaf sharing the walked prefix).
pub fn verify_path(root: &RootHash, path: &LookupPath) -> bool {
    let depth = path.siblings.len();
    if depth > 256 {
        return false;
    }

    let mut hash = match path.terminal {
        None => {
            if path.leaf.is_some() {
                return false;
            }
            EMPTY_HASH
        }
        Some((label, commitment)) => {
            let is_target = label == path.label;
            if is_target != path.leaf.is_some() || (is_target && path.leaf != Some(commitment)) {
                return false;
            }
            if (0..depth).any(|d| bit(&label, d) != bit(&path.label, d)) {
                return false;
            }
            leaf_hash(&label, &commitment)
        }
    };

    for d in (0..depth).rev() {
        let sibling = &path.siblings[d];
        hash = if bit(&path.label, d) {
            node_hash(sibling, &hash)
        } else {
            node_hash(&hash, sibling)
        };
    }

    hash == *root
}

fn bit(label: &Label, depth: usize) -> bool {
    (label[depth / 8] >> (7 - depth % 8)) & 1 == 1
}

fn flip_bit(label: &Label, depth: usize) -> Label {
    let mut out = *label;
    out[depth / 8] ^= 0x80 >> (depth % 8);
    out
}

fn clear_bit(label: &Label, depth: usize) -> Label {
    let mut out = *label;
    out[depth / 8] &= !(0x80 >> (depth % 8));
    out
}

/// Smallest and largest labels sharing the first `depth` bits of `label`
fn prefix_range(label: &Label, depth: usize) -> (Label, Label) {
    let mut lo = *label;
    let mut hi = *label;
    let full = depth / 8;
    if full < lo.len() {
        let tail = 0xffu8 >> (depth % 8);
        lo[full] &= !tail;
        hi[full] |= tail;
        lo[full + 1..].fill(0x00);
        hi[full + 1..].fill(0xff);
    }
    (lo, hi)
}

fn node_key(label: &Label, depth: usize) -> NodeKey {
    (depth as u16, prefix_range(label, depth).0)
}

fn leaf_hash(label: &Label, commitment: &Commitment) -> Hash {
    keccak256(&[LEAF_TAG, label, commitment])
}

fn node_hash(left: &Hash, right: &Hash) -> Hash {
    keccak256(&[NODE_TAG, left, right])
}
