//! Label derivation: turns a caller key into a fixed-width trie path
//!
//! Two schemes are supported:
//! - `Plain`: keyed keccak hash of the key. Deterministic for a fixed secret, no proof.
//! - `Verifiable`: a verifiable random function over ristretto255. The label is a hash of
//!   `gamma = x * H(key)`, and the proof is a discrete-log equality proof that `gamma` and
//!   the public key share the secret scalar `x`. Every valid proof for a key carries the
//!   same `gamma`, so a key has exactly one label under a given public key.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::traits::IsIdentity;
use curve25519_dalek::Scalar;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::hash::keccak256;
use crate::snapshot_format::SnapshotFormatError;
use crate::types::Label;

/// Serialized size of a verifiable-scheme secret key
pub const SECRET_KEY_SIZE: usize = 32;

/// Serialized size of a verifiable-scheme public key
pub const PUBLIC_KEY_SIZE: usize = 32;

const CHALLENGE_SIZE: usize = 16;

/// Serialized size of a label proof: `gamma || challenge || response`
pub const LABEL_PROOF_SIZE: usize = 32 + CHALLENGE_SIZE + 32;

const LABEL_DOMAIN: &[u8] = b"verikv/label";
const SEED_DOMAIN: &[u8] = b"verikv/seed";
const SCALAR_DOMAIN: &[u8] = b"verikv/vrf/scalar";
const HASH_TO_GROUP_DOMAIN: &[u8] = b"verikv/vrf/h2g";
const NONCE_DOMAIN: &[u8] = b"verikv/vrf/nonce";
const CHALLENGE_DOMAIN: &[u8] = b"verikv/vrf/challenge";

/// How labels are derived from keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelScheme {
    /// Keyed hash, no proof
    #[default]
    Plain,
    /// VRF-based, yields a publicly checkable proof
    Verifiable,
}

impl fmt::Display for LabelScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelScheme::Plain => write!(f, "plain"),
            LabelScheme::Verifiable => write!(f, "verifiable"),
        }
    }
}

/// Proof that a label was derived from a key (verifiable scheme only)
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct LabelProof([u8; LABEL_PROOF_SIZE]);

impl LabelProof {
    pub fn as_bytes(&self) -> &[u8; LABEL_PROOF_SIZE] {
        &self.0
    }
}

impl fmt::Debug for LabelProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LabelProof({}..)", hex::encode(&self.0[..8]))
    }
}

/// VRF key pair over ristretto255, derived from a 32-byte seed
#[derive(Clone)]
pub struct VrfKey {
    seed: [u8; SECRET_KEY_SIZE],
    scalar: Scalar,
    public: RistrettoPoint,
}

impl VrfKey {
    pub fn from_seed(seed: [u8; SECRET_KEY_SIZE]) -> Self {
        let scalar = Scalar::from_bytes_mod_order_wide(&wide_hash(SCALAR_DOMAIN, &[&seed]));
        Self {
            seed,
            scalar,
            public: RistrettoPoint::mul_base(&scalar),
        }
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public.compress().to_bytes()
    }

    fn prove(&self, key: &[u8]) -> (Label, LabelProof) {
        let h = hash_to_group(&self.public_key(), key);
        let nonce = Scalar::from_bytes_mod_order_wide(&wide_hash(
            NONCE_DOMAIN,
            &[self.scalar.as_bytes(), h.compress().as_bytes()],
        ));
        self.prove_with_nonce(key, nonce)
    }

    fn prove_with_nonce(&self, key: &[u8], nonce: Scalar) -> (Label, LabelProof) {
        let public_key = self.public_key();
        let h = hash_to_group(&public_key, key);
        let gamma = h * self.scalar;
        let c = challenge(
            &public_key,
            &h,
            &gamma,
            &RistrettoPoint::mul_base(&nonce),
            &(h * nonce),
        );
        let s = nonce + c * self.scalar;

        let mut proof = [0u8; LABEL_PROOF_SIZE];
        proof[..32].copy_from_slice(gamma.compress().as_bytes());
        proof[32..32 + CHALLENGE_SIZE].copy_from_slice(&c.as_bytes()[..CHALLENGE_SIZE]);
        proof[32 + CHALLENGE_SIZE..].copy_from_slice(s.as_bytes());
        (vrf_output(&gamma), LabelProof(proof))
    }
}

/// Secret material used to derive labels
#[derive(Clone)]
pub enum LabelSecret {
    Plain([u8; 32]),
    Verifiable(VrfKey),
}

impl LabelSecret {
    /// Derive secret material from `seed`, or draw it fresh from the OS RNG
    pub fn generate(scheme: LabelScheme, seed: Option<&[u8; 32]>) -> Self {
        let bytes = match seed {
            Some(seed) => keccak256(&[SEED_DOMAIN, seed]),
            None => {
                let mut bytes = [0u8; 32];
                OsRng.fill_bytes(&mut bytes);
                bytes
            }
        };
        match scheme {
            LabelScheme::Plain => LabelSecret::Plain(bytes),
            LabelScheme::Verifiable => LabelSecret::Verifiable(VrfKey::from_seed(bytes)),
        }
    }

    /// Rebuild a verifiable-scheme secret from its serialized form
    pub fn from_secret_key_bytes(bytes: &[u8]) -> Result<Self, SnapshotFormatError> {
        let seed: [u8; SECRET_KEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| SnapshotFormatError::SecretKeySizeMismatch {
                    expected: SECRET_KEY_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(LabelSecret::Verifiable(VrfKey::from_seed(seed)))
    }

    pub fn scheme(&self) -> LabelScheme {
        match self {
            LabelSecret::Plain(_) => LabelScheme::Plain,
            LabelSecret::Verifiable(_) => LabelScheme::Verifiable,
        }
    }

    /// Serialized secret key (verifiable scheme only)
    pub fn secret_key_bytes(&self) -> Option<[u8; SECRET_KEY_SIZE]> {
        match self {
            LabelSecret::Plain(_) => None,
            LabelSecret::Verifiable(key) => Some(key.seed),
        }
    }

    /// Public verification key (verifiable scheme only)
    pub fn public_key(&self) -> Option<[u8; PUBLIC_KEY_SIZE]> {
        match self {
            LabelSecret::Plain(_) => None,
            LabelSecret::Verifiable(key) => Some(key.public_key()),
        }
    }
}

impl fmt::Debug for LabelSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LabelSecret({}, <redacted>)", self.scheme())
    }
}

/// Derive the label for `key`
pub fn derive_label(key: &[u8], secret: &LabelSecret) -> (Label, Option<LabelProof>) {
    match secret {
        LabelSecret::Plain(bytes) => (keccak256(&[LABEL_DOMAIN, bytes, key]), None),
        LabelSecret::Verifiable(vrf_key) => {
            let (label, proof) = vrf_key.prove(key);
            (label, Some(proof))
        }
    }
}

/// Check that `label` is the unique label of `key` under `public_key`
pub fn verify_label(
    public_key: &[u8; PUBLIC_KEY_SIZE],
    key: &[u8],
    label: &Label,
    proof: &LabelProof,
) -> bool {
    let Some(public) = CompressedRistretto(*public_key).decompress() else {
        return false;
    };
    if public.is_identity() {
        return false;
    }
    let Some((gamma, c, s)) = parse_proof(proof) else {
        return false;
    };

    let h = hash_to_group(public_key, key);
    let u = RistrettoPoint::mul_base(&s) - public * c;
    let v = h * s - gamma * c;
    challenge(public_key, &h, &gamma, &u, &v) == c && vrf_output(&gamma) == *label
}

fn parse_proof(proof: &LabelProof) -> Option<(RistrettoPoint, Scalar, Scalar)> {
    let mut gamma = [0u8; 32];
    gamma.copy_from_slice(&proof.0[..32]);
    let mut c = [0u8; 32];
    c[..CHALLENGE_SIZE].copy_from_slice(&proof.0[32..32 + CHALLENGE_SIZE]);
    let mut s = [0u8; 32];
    s.copy_from_slice(&proof.0[32 + CHALLENGE_SIZE..]);

    let gamma = CompressedRistretto(gamma).decompress()?;
    let s = Option::<Scalar>::from(Scalar::from_canonical_bytes(s))?;
    Some((gamma, Scalar::from_bytes_mod_order(c), s))
}

fn hash_to_group(public_key: &[u8; PUBLIC_KEY_SIZE], key: &[u8]) -> RistrettoPoint {
    RistrettoPoint::from_uniform_bytes(&wide_hash(HASH_TO_GROUP_DOMAIN, &[public_key, key]))
}

fn challenge(
    public_key: &[u8; PUBLIC_KEY_SIZE],
    h: &RistrettoPoint,
    gamma: &RistrettoPoint,
    u: &RistrettoPoint,
    v: &RistrettoPoint,
) -> Scalar {
    let digest = keccak256(&[
        CHALLENGE_DOMAIN,
        public_key,
        h.compress().as_bytes(),
        gamma.compress().as_bytes(),
        u.compress().as_bytes(),
        v.compress().as_bytes(),
    ]);
    let mut bytes = [0u8; 32];
    bytes[..CHALLENGE_SIZE].copy_from_slice(&digest[..CHALLENGE_SIZE]);
    Scalar::from_bytes_mod_order(bytes)
}

fn vrf_output(gamma: &RistrettoPoint) -> Label {
    keccak256(&[LABEL_DOMAIN, gamma.compress().as_bytes()])
}

/// 64 bytes of keccak output, for wide scalar reduction and hash-to-group
fn wide_hash(domain: &[u8], parts: &[&[u8]]) -> [u8; 64] {
    let mut out = [0u8; 64];
    for (i, half) in out.chunks_exact_mut(32).enumerate() {
        let counter = [i as u8];
        let mut input: Vec<&[u8]> = vec![domain, &counter];
        input.extend_from_slice(parts);
        half.copy_from_slice(&keccak256(&input));
    }
    out
}

/// Bounded cache of derived labels, keyed by caller key
///
/// If the capacity is zero, the cache is disabled and has zero overhead.
#[derive(Debug, Clone, Default)]
pub enum LabelCache {
    #[default]
    Disabled,
    Shared(Arc<Mutex<lru::LruCache<Vec<u8>, (Label, Option<LabelProof>)>>>),
}

impl LabelCache {
    pub fn new(capacity: usize) -> Self {
        let Some(capacity) = NonZeroUsize::new(capacity) else {
            return Self::Disabled;
        };
        Self::Shared(Arc::new(Mutex::new(lru::LruCache::new(capacity))))
    }

    pub fn len(&self) -> usize {
        match self {
            LabelCache::Disabled => 0,
            LabelCache::Shared(cache) => cache.lock().unwrap_or_else(PoisonError::into_inner).len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Derive the label for `key`, consulting and filling `cache`
pub fn derive_label_cached(
    key: &[u8],
    secret: &LabelSecret,
    cache: &LabelCache,
) -> (Label, Option<LabelProof>) {
    let LabelCache::Shared(cache) = cache else {
        return derive_label(key, secret);
    };
    if let Some(hit) = cache.lock().unwrap_or_else(PoisonError::into_inner).get(key) {
        return *hit;
    }
    let derived = derive_label(key, secret);
    cache
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .put(key.to_vec(), derived);
    derived
}
