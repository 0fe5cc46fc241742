use crate::error::QbftError;
use crate::types::{QbftBlock, RlpSignature};

/// Hands a committed block and the commit seals that finalised it back to the chain.
pub trait QbftBlockImporter: Send + Sync {
    fn import_block(&self, block: &QbftBlock, commit_seals: &[RlpSignature]) -> Result<(), QbftError>;
}
