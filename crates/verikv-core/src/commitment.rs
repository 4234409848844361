//! Payload commitments: the trie stores these instead of raw payloads

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::hash::{keccak256, sha3_256};
use crate::types::{Commitment, Randomness};

const COMMIT_DOMAIN: &[u8] = b"verikv/commit";

/// Hash function used to bind a payload to its randomness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentScheme {
    #[default]
    Keccak256,
    Sha3_256,
}

impl fmt::Display for CommitmentScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitmentScheme::Keccak256 => write!(f, "keccak256"),
            CommitmentScheme::Sha3_256 => write!(f, "sha3_256"),
        }
    }
}

/// Commit to `payload` with fresh randomness
///
/// Committing the same payload twice yields different commitments (hiding).
pub fn commit_payload(payload: &[u8], scheme: CommitmentScheme) -> (Commitment, Randomness) {
    let mut randomness = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut randomness);
    (open_commitment(payload, &randomness, scheme), randomness)
}

/// Recompute the commitment for a known payload and randomness
pub fn open_commitment(
    payload: &[u8],
    randomness: &Randomness,
    scheme: CommitmentScheme,
) -> Commitment {
    let len = (payload.len() as u64).to_le_bytes();
    let parts: [&[u8]; 4] = [COMMIT_DOMAIN, randomness, &len, payload];
    match scheme {
        CommitmentScheme::Keccak256 => keccak256(&parts),
        CommitmentScheme::Sha3_256 => sha3_256(&parts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commitments_are_hiding() {
        let (a, ra) = commit_payload(b"1", CommitmentScheme::Keccak256);
        let (b, rb) = commit_payload(b"1", CommitmentScheme::Keccak256);
        assert_ne!(ra, rb);
        assert_ne!(a, b);
    }

    #[test]
    fn test_open_matches_commit() {
        for scheme in [CommitmentScheme::Keccak256, CommitmentScheme::Sha3_256] {
            let (commitment, randomness) = commit_payload(b"payload", scheme);
            assert_eq!(open_commitment(b"payload", &randomness, scheme), commitment);
            assert_ne!(open_commitment(b"other", &randomness, scheme), commitment);
        }
    }

    #[test]
    fn test_schemes_differ() {
        let randomness = [3u8; 32];
        assert_ne!(
            open_commitment(b"x", &randomness, CommitmentScheme::Keccak256),
            open_commitment(b"x", &randomness, CommitmentScheme::Sha3_256)
        );
    }

    #[test]
    fn test_scheme_serialization() {
        assert_eq!(serde_json::to_string(&CommitmentScheme::Sha3_256).unwrap(), "\"sha3_256\"");
        assert_eq!(
            serde_json::from_str::<CommitmentScheme>("\"keccak256\"").unwrap(),
            CommitmentScheme::Keccak256
        );
    }
}
