//! Hash primitives shared by labels, commitments and the trie

use tiny_keccak::{Hasher, Keccak, Sha3};

/// 32-byte digest
pub type Hash = [u8; 32];

/// Digest of an empty subtree / absent trie
pub const EMPTY_HASH: Hash = [0u8; 32];

/// Keccak-256 over the concatenation of `parts`
pub fn keccak256(parts: &[&[u8]]) -> Hash {
    let mut hasher = Keccak::v256();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// SHA3-256 over the concatenation of `parts`
pub fn sha3_256(parts: &[&[u8]]) -> Hash {
    let mut hasher = Sha3::v256();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_empty_input() {
        assert_eq!(
            hex::encode(keccak256(&[])),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_sha3_empty_input() {
        assert_eq!(
            hex::encode(sha3_256(&[])),
            "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a"
        );
    }

    #[test]
    fn test_parts_are_concatenated() {
        assert_eq!(keccak256(&[b"ab", b"c"]), keccak256(&[b"abc"]));
        assert_ne!(keccak256(&[b"abc"]), sha3_256(&[b"abc"]));
    }
}
