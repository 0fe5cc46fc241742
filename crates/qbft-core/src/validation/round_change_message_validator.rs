use alloy_primitives::Address;
use tracing::{trace, warn};

use crate::error::QbftError;
use crate::messagewrappers::RoundChange;
use crate::types::ConsensusRoundIdentifier;
use crate::validation::ValidationContext;

/// Validates a RoundChange and the prepared certificate it carries.
///
/// The pairing between metadata, block and prepares is already enforced when the message
/// is constructed. This checks what needs the validator set: membership, height, the block
/// behind the claim and the prepare quorum.
#[derive(Debug, Clone)]
pub struct RoundChangeMessageValidator {
    context: ValidationContext,
}

impl RoundChangeMessageValidator {
    pub fn new(context: ValidationContext) -> Self {
        Self { context }
    }

    /// Returns the author of a valid RoundChange.
    pub fn validate(&self, round_change: &RoundChange) -> Result<Address, QbftError> {
        let author = self.context.member_author(round_change.signed_payload())?;
        let target = *round_change.round_identifier();

        if target.sequence_number != self.context.height() {
            return Err(QbftError::ValidationError(format!(
                "round change targets height {}, expected {}",
                target.sequence_number,
                self.context.height()
            )));
        }

        let (Some(metadata), Some(block)) = (round_change.prepared_round_metadata(), round_change.proposed_block()) else {
            trace!(target: "consensus::qbft::validation", %author, %target, "Round change without prepared certificate");
            return Ok(author);
        };

        if metadata.prepared_round >= target.round_number {
            warn!(
                target: "consensus::qbft::validation",
                %author, %target, prepared_round = metadata.prepared_round,
                "Round change claims a prepared round that is not below its target"
            );
            return Err(QbftError::ValidationError(format!(
                "prepared round {} is not below target round {}",
                metadata.prepared_round, target.round_number
            )));
        }
        let block_hash = self.context.block_hash(block);
        if block_hash != metadata.prepared_block_hash {
            return Err(QbftError::ValidationError(format!(
                "proposed block {block_hash} does not match prepared block {}",
                metadata.prepared_block_hash
            )));
        }
        if block.number() != target.sequence_number {
            return Err(QbftError::ValidationError(format!(
                "proposed block number {} does not match height {}",
                block.number(),
                target.sequence_number
            )));
        }

        let prepared_round = ConsensusRoundIdentifier::new(target.sequence_number, metadata.prepared_round);
        self.context
            .verify_prepare_certificate(round_change.prepares(), prepared_round, metadata.prepared_block_hash)
            .inspect_err(|e| {
                warn!(target: "consensus::qbft::validation", %author, %target, error = %e, "Invalid prepared certificate in round change")
            })?;

        Ok(author)
    }
}
