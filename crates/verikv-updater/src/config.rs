use std::time::Duration;

use serde::{Deserialize, Serialize};
use verikv_core::{ApplyFailurePolicy, DictionaryConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Period of the background scheduler (`None`: commits are driven by the caller)
    pub commit_interval: Option<Duration>,
    /// What to do with a drained batch that failed to apply
    pub on_apply_failure: ApplyFailurePolicy,
    /// Run one last drain-apply cycle when the scheduler is cancelled
    pub flush_on_shutdown: bool,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            commit_interval: None,
            on_apply_failure: ApplyFailurePolicy::Requeue,
            flush_on_shutdown: true,
        }
    }
}

impl UpdaterConfig {
    pub fn with_commit_interval(mut self, interval: Duration) -> Self {
        self.commit_interval = Some(interval);
        self
    }

    pub fn with_apply_failure_policy(mut self, policy: ApplyFailurePolicy) -> Self {
        self.on_apply_failure = policy;
        self
    }

    pub fn with_flush_on_shutdown(mut self, flush: bool) -> Self {
        self.flush_on_shutdown = flush;
        self
    }
}

impl From<&DictionaryConfig> for UpdaterConfig {
    fn from(config: &DictionaryConfig) -> Self {
        Self {
            commit_interval: config.commit_interval,
            on_apply_failure: config.on_apply_failure,
            ..Self::default()
        }
    }
}
