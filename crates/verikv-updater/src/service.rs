use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use verikv_core::{
    AppendProof, ApplyFailurePolicy, ApplyOutcome, DictionaryId, DictionaryStorage, Error,
    PendingUpdate, RootHash, UpdateProvider,
};

use crate::config::UpdaterConfig;
use crate::hook::{ApplyHook, NoopApplyHook};
use crate::metrics;
use crate::pending::PendingUpdates;

/// Buffers pending updates and applies them to the trie, one epoch per batch
///
/// The only writer of the trie snapshot for the dictionaries it serves.
pub struct BufferedUpdater {
    config: UpdaterConfig,
    pending: Arc<PendingUpdates>,
    storage: Arc<dyn DictionaryStorage>,
    hook: Arc<dyn ApplyHook>,
}

impl BufferedUpdater {
    pub fn new(
        config: UpdaterConfig,
        pending: Arc<PendingUpdates>,
        storage: Arc<dyn DictionaryStorage>,
    ) -> Self {
        Self {
            config,
            pending,
            storage,
            hook: Arc::new(NoopApplyHook),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn ApplyHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    /// Drain the queue for `id` and apply it
    ///
    /// Cycles for the same id are serialized; enqueues are never blocked by them.
    pub fn run_cycle(&self, id: &DictionaryId) -> verikv_core::Result<ApplyOutcome> {
        let lock = self.pending.apply_lock(id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let batch = self.pending.drain(id);
        if batch.is_empty() {
            debug!(%id, "No pending updates");
            return Ok(ApplyOutcome::Idle);
        }

        let start = Instant::now();
        let updates = batch.len();
        match self.apply_batch(id, &batch) {
            Ok((epoch, root, proofs)) => {
                metrics::record_apply(id, updates, start.elapsed());
                metrics::set_epoch(id, epoch);
                info!(
                    %id,
                    updates,
                    epoch,
                    root = %hex::encode(root),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Applied pending updates"
                );

                if let Err(e) = self.hook.on_applied(id, &root, &proofs) {
                    warn!(%id, epoch, error = %e, "Apply hook failed");
                }

                Ok(ApplyOutcome::Applied { epoch, root, updates })
            }
            Err(e) => {
                metrics::record_apply_failure(id, self.config.on_apply_failure);
                match self.config.on_apply_failure {
                    ApplyFailurePolicy::Requeue => {
                        self.pending.requeue_front(id, batch);
                        warn!(%id, updates, error = %e, "Apply failed, updates requeued");
                    }
                    ApplyFailurePolicy::Discard => {
                        metrics::record_discarded_updates(id, updates);
                        error!(%id, lost = updates, error = %e, "Apply failed, updates discarded");
                    }
                }
                metrics::set_pending(id, self.pending.pending_len(id));
                Err(e)
            }
        }
    }

    fn apply_batch(
        &self,
        id: &DictionaryId,
        batch: &[PendingUpdate],
    ) -> verikv_core::Result<(u64, RootHash, Vec<AppendProof>)> {
        let mut trie = self
            .storage
            .load_trie(id)?
            .map(|snapshot| (*snapshot).clone())
            .unwrap_or_default();

        let (proofs, root) = trie.apply_batch(batch);
        let epoch = trie.epoch();
        self.storage.save_trie(id, trie)?;

        Ok((epoch, root, proofs))
    }

    /// Start the periodic drain-apply loop for `id` on `tasks`
    ///
    /// Needs a tokio runtime and a configured commit interval. The loop stops when
    /// `cancel` fires, after one final cycle if `flush_on_shutdown` is set, so waiting
    /// on `tasks` also waits for that cycle.
    pub fn spawn_scheduler(
        self: &Arc<Self>,
        id: DictionaryId,
        cancel: CancellationToken,
        tasks: &TaskTracker,
    ) -> verikv_core::Result<JoinHandle<()>> {
        let period = self
            .config
            .commit_interval
            .ok_or_else(|| Error::Configuration("scheduler needs a commit interval".into()))?;
        if period.is_zero() {
            return Err(Error::Configuration("commit interval must be non-zero".into()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::Configuration("scheduler needs a tokio runtime".into()))?;

        let updater = Arc::clone(self);
        Ok(tasks.spawn_on(
            async move { updater.run_scheduler(id, period, cancel).await },
            &runtime,
        ))
    }

    async fn run_scheduler(
        self: Arc<Self>,
        id: DictionaryId,
        period: Duration,
        cancel: CancellationToken,
    ) {
        info!(%id, period_ms = period.as_millis() as u64, "Starting commit scheduler");

        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.clone().cycle_blocking(id).await {
                        error!(%id, error = %e, "Scheduled apply failed");
                    }
                }
            }
        }

        if self.config.flush_on_shutdown {
            if let Err(e) = self.clone().cycle_blocking(id).await {
                error!(%id, error = %e, "Final apply on shutdown failed");
            }
        }
        info!(%id, "Commit scheduler stopped");
    }

    async fn cycle_blocking(
        self: Arc<Self>,
        id: DictionaryId,
    ) -> verikv_core::Result<ApplyOutcome> {
        tokio::task::spawn_blocking(move || self.run_cycle(&id))
            .await
            .map_err(|e| Error::Worker(e.to_string()))?
    }
}

impl UpdateProvider for BufferedUpdater {
    fn name(&self) -> &'static str {
        "buffered"
    }

    fn enqueue(&self, id: &DictionaryId, updates: Vec<PendingUpdate>) {
        if updates.is_empty() {
            return;
        }
        self.pending.enqueue(id, updates);
        metrics::set_pending(id, self.pending.pending_len(id));
    }

    fn apply_pending(&self, id: &DictionaryId) -> verikv_core::Result<ApplyOutcome> {
        self.run_cycle(id)
    }

    fn pending_len(&self, id: &DictionaryId) -> usize {
        self.pending.pending_len(id)
    }
}
