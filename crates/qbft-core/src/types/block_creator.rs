use crate::error::QbftError;
use crate::types::{ConsensusRoundIdentifier, QbftBlock};

/// Builds a fresh block when the local node proposes without a mandatory re-proposal.
pub trait QbftBlockCreator: Send + Sync {
    fn create_block(&self, round: &ConsensusRoundIdentifier) -> Result<QbftBlock, QbftError>;
}
