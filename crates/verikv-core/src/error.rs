//! Error types for verikv-core

use thiserror::Error;

use crate::snapshot_format::SnapshotFormatError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Inconsistent state: {0}")]
    InconsistentState(String),

    #[error("Snapshot error: {0}")]
    Serialization(#[from] SnapshotFormatError),

    #[error("Lookup error: {0}")]
    Lookup(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker failed: {0}")]
    Worker(String),
}

impl Error {
    /// Duplicate-key error for a raw key
    pub fn duplicate_key(key: &[u8]) -> Self {
        Error::DuplicateKey(format!("0x{}", hex::encode(key)))
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Error::DuplicateKey(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    pub fn is_serialization(&self) -> bool {
        matches!(self, Error::Serialization(_))
    }
}
