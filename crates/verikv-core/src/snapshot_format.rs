//! Binary record format for saving and loading a dictionary
//!
//! All integers are little-endian. Layout:
//!
//! ```text
//! magic "VKD1"      4 bytes
//! version           u16
//! total length      u32  (length of the whole record, prefix included)
//! config length     u32
//! config blob       config length bytes
//! secret-key flag   u8   (0 = absent, 1 = present)
//! key length        u32  (only when the flag is 1)
//! secret key        key length bytes (must be SECRET_KEY_SIZE)
//! dictionary id     16 bytes
//! ```

use crate::label::SECRET_KEY_SIZE;
use crate::types::{DictionaryId, DICTIONARY_ID_SIZE};

/// Magic bytes identifying a dictionary snapshot
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"VKD1";

/// Size of the fixed prefix (magic + version + total length)
pub const SNAPSHOT_PREFIX_SIZE: usize = 10;

/// Saved state of a dictionary: everything needed to rebuild its facade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionarySnapshot {
    /// Format version
    pub version: u16,
    /// Serialized configuration
    pub config_blob: Vec<u8>,
    /// Serialized label secret key (verifiable label scheme only)
    pub secret_key: Option<Vec<u8>>,
    /// Identifier of the saved dictionary
    pub id: DictionaryId,
}

impl DictionarySnapshot {
    /// Current format version
    pub const VERSION: u16 = 1;

    pub fn new(config_blob: Vec<u8>, secret_key: Option<Vec<u8>>, id: DictionaryId) -> Self {
        Self {
            version: Self::VERSION,
            config_blob,
            secret_key,
            id,
        }
    }

    /// Serialize the record
    pub fn to_bytes(&self) -> Vec<u8> {
        let key_len = self.secret_key.as_ref().map(|k| 4 + k.len()).unwrap_or(0);
        let total =
            SNAPSHOT_PREFIX_SIZE + 4 + self.config_blob.len() + 1 + key_len + DICTIONARY_ID_SIZE;

        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&SNAPSHOT_MAGIC);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&(total as u32).to_le_bytes());
        buf.extend_from_slice(&(self.config_blob.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.config_blob);
        match &self.secret_key {
            Some(key) => {
                buf.push(1);
                buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                buf.extend_from_slice(key);
            }
            None => buf.push(0),
        }
        buf.extend_from_slice(self.id.as_bytes());
        buf
    }

    /// Parse and validate a record
    pub fn from_bytes(data: &[u8]) -> Result<Self, SnapshotFormatError> {
        if data.len() < SNAPSHOT_PREFIX_SIZE {
            return Err(SnapshotFormatError::TooShort { actual: data.len() });
        }

        let mut reader = Reader::new(data);

        let magic = reader.array::<4>("magic")?;
        if magic != SNAPSHOT_MAGIC {
            return Err(SnapshotFormatError::InvalidMagic { actual: magic });
        }

        let version = u16::from_le_bytes(reader.array::<2>("version")?);
        if version != Self::VERSION {
            return Err(SnapshotFormatError::UnsupportedVersion {
                expected: Self::VERSION,
                actual: version,
            });
        }

        let total = u32::from_le_bytes(reader.array::<4>("total length")?) as usize;
        if total != data.len() {
            return Err(SnapshotFormatError::LengthMismatch {
                expected: total,
                actual: data.len(),
            });
        }

        let config_len = u32::from_le_bytes(reader.array::<4>("config length")?) as usize;
        let config_blob = reader.take(config_len, "config blob")?.to_vec();

        let secret_key = match reader.array::<1>("secret key flag")?[0] {
            0 => None,
            1 => {
                let key_len = u32::from_le_bytes(reader.array::<4>("secret key length")?) as usize;
                if key_len != SECRET_KEY_SIZE {
                    return Err(SnapshotFormatError::SecretKeySizeMismatch {
                        expected: SECRET_KEY_SIZE,
                        actual: key_len,
                    });
                }
                Some(reader.take(key_len, "secret key")?.to_vec())
            }
            flag => return Err(SnapshotFormatError::InvalidFlag { actual: flag }),
        };

        let id = DictionaryId::from_bytes(reader.array::<DICTIONARY_ID_SIZE>("dictionary id")?);

        if reader.remaining() != 0 {
            return Err(SnapshotFormatError::LengthMismatch {
                expected: data.len() - reader.remaining(),
                actual: data.len(),
            });
        }

        Ok(Self {
            version,
            config_blob,
            secret_key,
            id,
        })
    }

    /// Check if data starts with the snapshot magic
    pub fn has_magic(data: &[u8]) -> bool {
        data.len() >= 4 && data[0..4] == SNAPSHOT_MAGIC
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], SnapshotFormatError> {
        if self.remaining() < len {
            return Err(SnapshotFormatError::Truncated {
                field,
                needed: len,
                available: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn array<const N: usize>(
        &mut self,
        field: &'static str,
    ) -> Result<[u8; N], SnapshotFormatError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }
}

/// Errors for snapshot parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotFormatError {
    /// Buffer is shorter than the fixed prefix
    TooShort { actual: usize },
    /// Invalid magic bytes
    InvalidMagic { actual: [u8; 4] },
    /// Version tag is not supported by this build
    UnsupportedVersion { expected: u16, actual: u16 },
    /// Declared record length doesn't match the buffer
    LengthMismatch { expected: usize, actual: usize },
    /// A field runs past the end of the buffer
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },
    /// Secret-key presence flag is neither 0 nor 1
    InvalidFlag { actual: u8 },
    /// Secret key has the wrong length
    SecretKeySizeMismatch { expected: usize, actual: usize },
    /// Secret key presence disagrees with the configured label scheme
    SecretKeyPresence { expected: bool, actual: bool },
    /// Configuration blob could not be decoded
    InvalidConfig(String),
}

impl core::fmt::Display for SnapshotFormatError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SnapshotFormatError::TooShort { actual } => {
                write!(f, "Snapshot too short: need {} bytes, got {}", SNAPSHOT_PREFIX_SIZE, actual)
            }
            SnapshotFormatError::InvalidMagic { actual } => {
                write!(f, "Invalid magic: expected {:?}, got {:?}", SNAPSHOT_MAGIC, actual)
            }
            SnapshotFormatError::UnsupportedVersion { expected, actual } => {
                write!(f, "Unsupported snapshot version {} (supported: {})", actual, expected)
            }
            SnapshotFormatError::LengthMismatch { expected, actual } => {
                write!(f, "Snapshot length mismatch: expected {} bytes, got {}", expected, actual)
            }
            SnapshotFormatError::Truncated { field, needed, available } => {
                write!(f, "Truncated {}: need {} bytes, {} available", field, needed, available)
            }
            SnapshotFormatError::InvalidFlag { actual } => {
                write!(f, "Invalid secret key flag: {}", actual)
            }
            SnapshotFormatError::SecretKeySizeMismatch { expected, actual } => {
                write!(f, "Secret key size mismatch: expected {} bytes, got {}", expected, actual)
            }
            SnapshotFormatError::SecretKeyPresence { expected, actual } => {
                write!(
                    f,
                    "Secret key presence mismatch: label scheme expects present={}, snapshot has present={}",
                    expected, actual
                )
            }
            SnapshotFormatError::InvalidConfig(msg) => {
                write!(f, "Invalid configuration blob: {}", msg)
            }
        }
    }
}

impl std::error::Error for SnapshotFormatError {}
