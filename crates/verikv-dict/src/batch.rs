//! Fork-join batch insertion
//!
//! Entries are split into contiguous shards, one blocking worker per shard. Workers
//! derive labels and commitments in parallel and take the dictionary's storage write
//! lock only for each check-then-write. A duplicate stops every worker (fail-fast);
//! entries already written stay written and are still enqueued, so storage and the
//! trie never disagree.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinSet;
use tracing::{debug, warn};
use verikv_core::{
    commit_payload, derive_label, CommitmentScheme, DictionaryId, DictionaryStorage, Error,
    LabelSecret, PendingUpdate, Result, StoredElement,
};

/// One (key, payload) pair
pub type Entry = (Vec<u8>, Vec<u8>);

/// Everything a shard worker needs, cloned into each worker
#[derive(Clone)]
pub(crate) struct ShardWriter {
    pub id: DictionaryId,
    pub secret: Arc<LabelSecret>,
    pub scheme: CommitmentScheme,
    pub storage: Arc<dyn DictionaryStorage>,
    pub write_lock: Arc<Mutex<()>>,
    pub abort: Arc<AtomicBool>,
}

pub(crate) struct ShardOutcome {
    pub updates: Vec<PendingUpdate>,
    pub error: Option<Error>,
}

impl ShardWriter {
    /// Derive and write one entry under the write lock
    pub fn write_entry(&self, key: &[u8], payload: &[u8]) -> Result<PendingUpdate> {
        let (label, _) = derive_label(key, &self.secret);
        let (commitment, randomness) = commit_payload(payload, self.scheme);

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.storage.load_stored_element(&self.id, key)?.is_some() {
            return Err(Error::duplicate_key(key));
        }
        self.storage.save_stored_element(
            &self.id,
            key,
            StoredElement {
                payload: payload.to_vec(),
                randomness,
            },
        )?;
        Ok(PendingUpdate::new(label, commitment))
    }

    fn process_shard(&self, shard: Vec<Entry>) -> ShardOutcome {
        let mut updates = Vec::with_capacity(shard.len());
        for (key, payload) in &shard {
            if self.abort.load(Ordering::SeqCst) {
                break;
            }
            match self.write_entry(key, payload) {
                Ok(update) => updates.push(update),
                Err(e) => {
                    self.abort.store(true, Ordering::SeqCst);
                    return ShardOutcome { updates, error: Some(e) };
                }
            }
        }
        ShardOutcome { updates, error: None }
    }
}

/// Split `entries` into `shards` contiguous runs whose sizes differ by at most one
pub(crate) fn split_shards(entries: Vec<Entry>, shards: usize) -> Vec<Vec<Entry>> {
    let shards = shards.clamp(1, entries.len().max(1));
    let base = entries.len() / shards;
    let extra = entries.len() % shards;

    let mut rest = entries.into_iter();
    (0..shards)
        .map(|i| rest.by_ref().take(base + usize::from(i < extra)).collect())
        .collect()
}

/// Write all entries with up to `threads` workers
///
/// Returns the updates that were written, in shard order, plus the first error
/// (by shard index) if any worker failed.
pub(crate) async fn write_batch(
    writer: ShardWriter,
    entries: Vec<Entry>,
    threads: usize,
) -> (Vec<PendingUpdate>, Option<Error>) {
    if entries.is_empty() {
        return (Vec::new(), None);
    }
    let shards = split_shards(entries, threads);
    let shard_count = shards.len();
    debug!(id = %writer.id, shards = shard_count, "Starting batch workers");

    let mut set = JoinSet::new();
    for (index, shard) in shards.into_iter().enumerate() {
        let writer = writer.clone();
        set.spawn_blocking(move || (index, writer.process_shard(shard)));
    }

    let mut outcomes: Vec<Option<ShardOutcome>> = (0..shard_count).map(|_| None).collect();
    let mut join_error = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, outcome)) => outcomes[index] = Some(outcome),
            Err(e) => {
                writer.abort.store(true, Ordering::SeqCst);
                join_error.get_or_insert(Error::Worker(e.to_string()));
            }
        }
    }

    let mut updates = Vec::new();
    let mut first_error = None;
    for outcome in outcomes.into_iter().flatten() {
        updates.extend(outcome.updates);
        if first_error.is_none() {
            first_error = outcome.error;
        }
    }
    let error = first_error.or(join_error);
    if let Some(e) = &error {
        warn!(id = %writer.id, written = updates.len(), error = %e, "Batch insert stopped early");
    }
    (updates, error)
}
