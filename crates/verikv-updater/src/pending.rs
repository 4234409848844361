//! Process-wide table of pending trie updates, keyed by dictionary

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use verikv_core::{DictionaryId, PendingUpdate};

/// Pending-update queues for every dictionary served by this process
///
/// One lock guards the whole table and is held only for an append or a
/// queue swap, never while a batch is applied to the trie.
#[derive(Debug, Default)]
pub struct PendingUpdates {
    queues: Mutex<HashMap<DictionaryId, Vec<PendingUpdate>>>,
    apply_locks: Mutex<HashMap<DictionaryId, Arc<Mutex<()>>>>,
}

impl PendingUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    fn queues(&self) -> MutexGuard<'_, HashMap<DictionaryId, Vec<PendingUpdate>>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append updates to the queue for `id`, creating it if absent
    pub fn enqueue(&self, id: &DictionaryId, updates: impl IntoIterator<Item = PendingUpdate>) {
        self.queues().entry(*id).or_default().extend(updates);
    }

    /// Swap the queue for `id` with an empty one and return its contents
    pub fn drain(&self, id: &DictionaryId) -> Vec<PendingUpdate> {
        self.queues()
            .get_mut(id)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Put a drained batch back ahead of anything enqueued since
    pub fn requeue_front(&self, id: &DictionaryId, mut batch: Vec<PendingUpdate>) {
        if batch.is_empty() {
            return;
        }
        let mut queues = self.queues();
        let queue = queues.entry(*id).or_default();
        batch.append(queue);
        *queue = batch;
    }

    pub fn pending_len(&self, id: &DictionaryId) -> usize {
        self.queues().get(id).map(Vec::len).unwrap_or(0)
    }

    /// Number of dictionaries with a queue (possibly empty)
    pub fn dictionaries(&self) -> usize {
        self.queues().len()
    }

    /// Serializes drain-apply cycles for one dictionary
    pub fn apply_lock(&self, id: &DictionaryId) -> Arc<Mutex<()>> {
        self.apply_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(*id)
            .or_default()
            .clone()
    }

    /// Forget everything held for `id`, returning the updates that were still pending
    ///
    /// Waits for an in-flight cycle of `id` to finish. The lock table stays locked
    /// meanwhile, so no second cycle can mint a fresh apply lock and overlap it.
    pub fn remove(&self, id: &DictionaryId) -> Vec<PendingUpdate> {
        let mut locks = self.apply_locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.remove(id) {
            drop(lock.lock().unwrap_or_else(PoisonError::into_inner));
        }
        self.queues().remove(id).unwrap_or_default()
    }

    /// Drop every queue, returning how many updates were still pending
    ///
    /// Same waiting rule as [`PendingUpdates::remove`], for every dictionary.
    pub fn clear(&self) -> usize {
        let mut locks = self.apply_locks.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, lock) in locks.drain() {
            drop(lock.lock().unwrap_or_else(PoisonError::into_inner));
        }
        self.queues().drain().map(|(_, queue)| queue.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn update(n: u8) -> PendingUpdate {
        PendingUpdate::new([n; 32], [n; 32])
    }

    #[test]
    fn test_drain_is_idempotent() {
        let table = PendingUpdates::new();
        let id = DictionaryId::random();
        table.enqueue(&id, vec![update(1), update(2)]);

        assert_eq!(table.drain(&id), vec![update(1), update(2)]);
        assert!(table.drain(&id).is_empty());
        assert_eq!(table.pending_len(&id), 0);
    }

    #[test]
    fn test_drain_unknown_id_is_empty() {
        let table = PendingUpdates::new();
        assert!(table.drain(&DictionaryId::random()).is_empty());
        assert_eq!(table.dictionaries(), 0);
    }

    #[test]
    fn test_queues_are_scoped_by_id() {
        let table = PendingUpdates::new();
        let a = DictionaryId::random();
        let b = DictionaryId::random();
        table.enqueue(&a, vec![update(1)]);
        table.enqueue(&b, vec![update(2), update(3)]);

        assert_eq!(table.pending_len(&a), 1);
        assert_eq!(table.pending_len(&b), 2);
        assert_eq!(table.drain(&a), vec![update(1)]);
        assert_eq!(table.pending_len(&b), 2);
    }

    #[test]
    fn test_requeue_front_keeps_order() {
        let table = PendingUpdates::new();
        let id = DictionaryId::random();
        table.enqueue(&id, vec![update(1), update(2)]);
        let batch = table.drain(&id);
        table.enqueue(&id, vec![update(3)]);
        table.requeue_front(&id, batch);

        assert_eq!(table.drain(&id), vec![update(1), update(2), update(3)]);
    }

    #[test]
    fn test_remove_returns_leftovers() {
        let table = PendingUpdates::new();
        let id = DictionaryId::random();
        table.enqueue(&id, vec![update(1)]);
        assert_eq!(table.remove(&id), vec![update(1)]);
        assert_eq!(table.dictionaries(), 0);
    }

    #[test]
    fn test_concurrent_enqueue_and_drain_lose_nothing() {
        let table = Arc::new(PendingUpdates::new());
        let id = DictionaryId::random();

        let writers: Vec<_> = (0..4u8)
            .map(|w| {
                let table = table.clone();
                thread::spawn(move || {
                    for i in 0..250u8 {
                        table.enqueue(&id, [PendingUpdate::new([w; 32], [i; 32])]);
                    }
                })
            })
            .collect();

        let drainer = {
            let table = table.clone();
            thread::spawn(move || {
                let mut seen = Vec::new();
                for _ in 0..100 {
                    seen.extend(table.drain(&id));
                    thread::yield_now();
                }
                seen
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        let mut seen = drainer.join().unwrap();
        seen.extend(table.drain(&id));

        assert_eq!(seen.len(), 1000);
        // per-writer order survives
        for w in 0..4u8 {
            let commitments: Vec<u8> = seen
                .iter()
                .filter(|u| u.label == [w; 32])
                .map(|u| u.commitment[0])
                .collect();
            assert_eq!(commitments, (0..250u8).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_remove_waits_for_in_flight_cycle() {
        let table = Arc::new(PendingUpdates::new());
        let id = DictionaryId::random();
        table.enqueue(&id, vec![update(1)]);

        let lock = table.apply_lock(&id);
        let guard = lock.lock().unwrap();

        let remover = {
            let table = table.clone();
            thread::spawn(move || table.remove(&id))
        };
        thread::sleep(std::time::Duration::from_millis(50));
        assert!(!remover.is_finished());

        drop(guard);
        assert_eq!(remover.join().unwrap(), vec![update(1)]);
        assert!(!Arc::ptr_eq(&lock, &table.apply_lock(&id)));
    }

    #[test]
    fn test_clear_counts_dropped_updates() {
        let table = PendingUpdates::new();
        table.enqueue(&DictionaryId::random(), vec![update(1), update(2)]);
        table.enqueue(&DictionaryId::random(), vec![update(3)]);
        assert_eq!(table.clear(), 3);
        assert_eq!(table.dictionaries(), 0);
    }
}
