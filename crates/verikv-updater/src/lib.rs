//! Update buffer and commit scheduler for VeriKV dictionaries
//!
//! Inserts enqueue (label, commitment) pairs into a process-wide [`PendingUpdates`]
//! table. A drain-apply cycle swaps a dictionary's queue out, applies the batch to
//! the trie as a single epoch, saves the snapshot and hands the append proofs to an
//! [`ApplyHook`]. Cycles run on demand or from a tokio interval loop:
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use tokio_util::task::TaskTracker;
//! use verikv_core::{DictionaryId, MemoryStorage};
//! use verikv_updater::{BufferedUpdater, PendingUpdates, UpdaterConfig};
//!
//! #[tokio::main]
//! async fn main() -> verikv_core::Result<()> {
//!     let config = UpdaterConfig::default().with_commit_interval(Duration::from_secs(1));
//!     let updater = Arc::new(BufferedUpdater::new(
//!         config,
//!         Arc::new(PendingUpdates::new()),
//!         Arc::new(MemoryStorage::new()),
//!     ));
//!     let cancel = CancellationToken::new();
//!     let tasks = TaskTracker::new();
//!     updater.spawn_scheduler(DictionaryId::random(), cancel.clone(), &tasks)?;
//!     cancel.cancel();
//!     tasks.close();
//!     tasks.wait().await;
//!     Ok(())
//! }
//! ```

mod config;
mod hook;
pub mod metrics;
mod pending;
mod service;

pub use config::UpdaterConfig;
pub use hook::{ApplyHook, NoopApplyHook};
pub use pending::PendingUpdates;
pub use service::BufferedUpdater;
