use alloy_primitives::{Address, B256 as Hash};
use tracing::warn;

use crate::error::QbftError;
use crate::messagewrappers::{Commit, Prepare};
use crate::payload::QbftPayload;
use crate::types::{ConsensusRoundIdentifier, SignedData};
use crate::validation::ValidationContext;

/// Validates Prepare and Commit messages of one round.
///
/// Messages can arrive before the round's proposal. [`MessageValidator::validate_origin`]
/// covers what is known up front; the digest checks run once the proposal is accepted.
#[derive(Debug, Clone)]
pub struct MessageValidator {
    context: ValidationContext,
    round: ConsensusRoundIdentifier,
}

impl MessageValidator {
    pub fn new(context: ValidationContext, round: ConsensusRoundIdentifier) -> Self {
        Self { context, round }
    }

    pub fn round(&self) -> &ConsensusRoundIdentifier {
        &self.round
    }

    /// Author is a validator and the message belongs to this round.
    pub fn validate_origin<P: QbftPayload>(&self, signed: &SignedData<P>) -> Result<Address, QbftError> {
        let author = self.context.member_author(signed)?;
        if *signed.payload().round_identifier() != self.round {
            return Err(QbftError::ValidationError(format!(
                "message for {} handled in round {}",
                signed.payload().round_identifier(),
                self.round
            )));
        }
        Ok(author)
    }

    pub fn validate_prepare(&self, prepare: &Prepare, proposal_digest: Hash) -> Result<Address, QbftError> {
        let author = self.validate_origin(prepare.signed_payload())?;
        if prepare.digest() != proposal_digest {
            return Err(QbftError::ValidationError(format!(
                "prepare from {author} for block {}, proposal is {proposal_digest}",
                prepare.digest()
            )));
        }
        Ok(author)
    }

    /// Also checks that the commit seal is the author's signature over the proposed block.
    pub fn validate_commit(&self, commit: &Commit, proposal_digest: Hash) -> Result<Address, QbftError> {
        let author = self.validate_origin(commit.signed_payload())?;
        if commit.digest() != proposal_digest {
            return Err(QbftError::ValidationError(format!(
                "commit from {author} for block {}, proposal is {proposal_digest}",
                commit.digest()
            )));
        }
        let sealer = self.context.recovery().recover_address(proposal_digest, commit.committed_seal())?;
        if sealer != author {
            warn!(target: "consensus::qbft::validation", %author, %sealer, round = %self.round, "Commit seal signed by another key");
            return Err(QbftError::ValidationError(format!("commit seal from {sealer} in commit by {author}")));
        }
        Ok(author)
    }
}
