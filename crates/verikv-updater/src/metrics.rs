//! Updater metrics
//!
//! Only dictionary ids and outcomes are used as labels, never keys or payloads.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use verikv_core::{ApplyFailurePolicy, DictionaryId, Epoch};

pub fn record_apply(id: &DictionaryId, updates: usize, duration: Duration) {
    counter!("verikv_applied_updates_total", "dictionary" => id.to_string())
        .increment(updates as u64);
    histogram!("verikv_apply_duration_seconds", "dictionary" => id.to_string())
        .record(duration.as_secs_f64());
}

pub fn set_epoch(id: &DictionaryId, epoch: Epoch) {
    gauge!("verikv_epoch", "dictionary" => id.to_string()).set(epoch as f64);
}

pub fn record_apply_failure(id: &DictionaryId, policy: ApplyFailurePolicy) {
    let policy = match policy {
        ApplyFailurePolicy::Requeue => "requeue",
        ApplyFailurePolicy::Discard => "discard",
    };
    counter!(
        "verikv_apply_failures_total",
        "dictionary" => id.to_string(),
        "policy" => policy
    )
    .increment(1);
}

pub fn record_discarded_updates(id: &DictionaryId, updates: usize) {
    counter!("verikv_discarded_updates_total", "dictionary" => id.to_string())
        .increment(updates as u64);
}

pub fn set_pending(id: &DictionaryId, pending: usize) {
    gauge!("verikv_pending_updates", "dictionary" => id.to_string()).set(pending as f64);
}
