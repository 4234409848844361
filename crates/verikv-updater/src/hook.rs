use verikv_core::{AppendProof, DictionaryId, RootHash};

/// Called after every successful drain-apply cycle
///
/// Extension point for persisting or serving append proofs. The trie snapshot is
/// already saved when the hook runs, so a hook error is logged and the cycle still
/// counts as applied.
pub trait ApplyHook: Send + Sync {
    fn on_applied(
        &self,
        id: &DictionaryId,
        root: &RootHash,
        proofs: &[AppendProof],
    ) -> verikv_core::Result<()>;
}

/// Hook that discards the proofs
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopApplyHook;

impl ApplyHook for NoopApplyHook {
    fn on_applied(
        &self,
        _id: &DictionaryId,
        _root: &RootHash,
        _proofs: &[AppendProof],
    ) -> verikv_core::Result<()> {
        Ok(())
    }
}
