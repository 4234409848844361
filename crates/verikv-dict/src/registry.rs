//! Process-wide state shared by every dictionary served in one process

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};
use verikv_core::{DictionaryId, Error, Result};
use verikv_server::QuerierPools;
use verikv_updater::PendingUpdates;

/// Owns the per-dictionary tables: pending updates, querier pools and storage write locks
///
/// Created once at service start and handed to every dictionary. `shutdown` stops all
/// schedulers spawned under it, waits for their final cycles and drops the tables.
#[derive(Default)]
pub struct Registry {
    pending: Arc<PendingUpdates>,
    pools: Arc<QuerierPools>,
    write_locks: Mutex<HashMap<DictionaryId, Arc<Mutex<()>>>>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> &Arc<PendingUpdates> {
        &self.pending
    }

    pub fn pools(&self) -> &Arc<QuerierPools> {
        &self.pools
    }

    /// The single storage-mutation lock for `id`
    pub fn write_lock(&self, id: &DictionaryId) -> Arc<Mutex<()>> {
        self.write_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(*id)
            .or_default()
            .clone()
    }

    /// Token for a background task; cancelled by [`Registry::shutdown`]
    pub fn child_token(&self) -> Result<CancellationToken> {
        if self.cancel.is_cancelled() {
            return Err(Error::Configuration("registry has been shut down".into()));
        }
        Ok(self.cancel.child_token())
    }

    /// Tracker that background tasks are spawned on, awaited by [`Registry::shutdown`]
    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Forget all state held for one dictionary
    pub fn release(&self, id: &DictionaryId) {
        let dropped = self.pending.remove(id).len();
        self.pools.remove(id);
        self.write_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        info!(%id, dropped_updates = dropped, "Released dictionary");
    }

    /// Stop every scheduler, wait for its final cycle, then clear all tables
    ///
    /// Returns the number of updates that were still pending and got dropped: those of
    /// dictionaries without a scheduler, or whose final cycle failed.
    pub async fn shutdown(&self) -> usize {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;

        let dropped = self.pending.clear();
        self.pools.clear();
        self.write_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        if dropped > 0 {
            error!(dropped_updates = dropped, "Registry shut down with unapplied updates");
        } else {
            info!("Registry shut down");
        }
        dropped
    }
}
