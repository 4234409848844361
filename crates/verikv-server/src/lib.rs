//! Read path for VeriKV dictionaries
//!
//! Lookups are served by pools of [`Querier`] replicas. A [`QueryRouter`] keeps one pool
//! per dictionary in a shared [`QuerierPools`] table and picks a replica uniformly at
//! random for each call. Replicas in cached mode may lag the latest epoch until
//! `check_for_update` refreshes them; [`StorageTrieInfo`] reads epoch and root straight
//! from storage and is never stale.

pub mod metrics;
mod querier;
mod router;
mod trie_info;

pub use querier::Querier;
pub use router::{QuerierPool, QuerierPools, QueryRouter, SingleQuerierRouter};
pub use trie_info::StorageTrieInfo;
