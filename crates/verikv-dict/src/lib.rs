//! VeriKV dictionary facade
//!
//! ```no_run
//! use std::sync::Arc;
//! use verikv_core::{DictionaryConfig, MemoryStorage, StorageConfig};
//! use verikv_dict::{Dictionary, Registry};
//!
//! fn main() -> verikv_core::Result<()> {
//!     let registry = Arc::new(Registry::new());
//!     let storage = StorageConfig::new(Arc::new(MemoryStorage::new()));
//!     let dict = Dictionary::new(DictionaryConfig::default(), storage, registry)?;
//!
//!     dict.insert(b"alice", b"1")?;
//!     dict.apply_pending()?;
//!     assert!(dict.query(b"alice")?.is_member());
//!     Ok(())
//! }
//! ```

mod batch;
mod dictionary;
mod registry;
mod response;

pub use batch::Entry;
pub use dictionary::{Dictionary, DictionaryBuilder};
pub use registry::Registry;
pub use response::{DictionaryCommitment, QueryResult};
