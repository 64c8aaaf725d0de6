use serde::{Deserialize, Serialize};
use shared_types::{Signature, SignatureStatus};

/// Signature counts for one document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentProgress {
    pub total: usize,
    pub pending: usize,
    pub signed: usize,
    pub rejected: usize,
    /// At least one signature and every one of them signed
    pub ready_to_finalize: bool,
    /// At least one signature is signed
    pub can_finalize: bool,
}

impl DocumentProgress {
    pub fn from_signatures(signatures: &[Signature]) -> Self {
        let mut progress = Self {
            total: signatures.len(),
            ..Self::default()
        };
        for sig in signatures {
            match sig.status {
                SignatureStatus::Pending => progress.pending += 1,
                SignatureStatus::Signed => progress.signed += 1,
                SignatureStatus::Rejected => progress.rejected += 1,
            }
        }
        progress.ready_to_finalize =
            progress.total > 0 && progress.pending == 0 && progress.rejected == 0;
        progress.can_finalize = progress.signed > 0;
        progress
    }
}
