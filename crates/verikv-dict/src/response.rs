use verikv_core::{
    open_commitment, verify_label, verify_path, CommitmentScheme, Epoch, LabelProof, LookupPath,
    Randomness, RootHash, PUBLIC_KEY_SIZE,
};

/// Answer to a key lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    /// Key is present; carries the opening of its commitment
    Membership {
        payload: Vec<u8>,
        randomness: Randomness,
        path: LookupPath,
        proof: Option<LabelProof>,
    },
    /// Key is absent from the snapshot that answered
    NonMembership {
        path: LookupPath,
        proof: Option<LabelProof>,
    },
}

impl QueryResult {
    pub fn is_member(&self) -> bool {
        matches!(self, QueryResult::Membership { .. })
    }

    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            QueryResult::Membership { payload, .. } => Some(payload),
            QueryResult::NonMembership { .. } => None,
        }
    }

    pub fn path(&self) -> &LookupPath {
        match self {
            QueryResult::Membership { path, .. } | QueryResult::NonMembership { path, .. } => path,
        }
    }

    pub fn proof(&self) -> Option<&LabelProof> {
        match self {
            QueryResult::Membership { proof, .. } | QueryResult::NonMembership { proof, .. } => {
                proof.as_ref()
            }
        }
    }

    /// Epoch of the snapshot that answered
    pub fn epoch(&self) -> Epoch {
        self.path().epoch
    }

    /// Check this answer for `key` against `root`
    ///
    /// With a public key the label proof must be present and valid. A membership
    /// answer must also open the commitment stored in the trie.
    pub fn verify(
        &self,
        key: &[u8],
        root: &RootHash,
        public_key: Option<&[u8; PUBLIC_KEY_SIZE]>,
        scheme: CommitmentScheme,
    ) -> bool {
        let path = self.path();
        if let Some(public_key) = public_key {
            match self.proof() {
                Some(proof) if verify_label(public_key, key, &path.label, proof) => {}
                _ => return false,
            }
        }
        if !verify_path(root, path) {
            return false;
        }
        match self {
            QueryResult::Membership {
                payload, randomness, ..
            } => path.leaf == Some(open_commitment(payload, randomness, scheme)),
            QueryResult::NonMembership { .. } => path.leaf.is_none(),
        }
    }
}

/// Public commitment to a dictionary's current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryCommitment {
    pub root: RootHash,
    pub epoch: Epoch,
    /// Label verification key (verifiable label scheme only)
    pub public_key: Option<[u8; PUBLIC_KEY_SIZE]>,
}
