pub mod message_validator;
pub mod proposal_validator;
pub mod round_change_message_validator;

use alloy_primitives::{Address, B256 as Hash};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::error::QbftError;
use crate::payload::{PreparePayload, QbftPayload};
use crate::types::{
    byzantine_fault_tolerance, quorum_size, select_proposer, ConsensusRoundIdentifier, ProposerBaseStrategy,
    QbftBlock, QbftBlockCodec, Secp256k1Recovery, SignatureRecovery, SignedData,
};

pub use message_validator::MessageValidator;
pub use proposal_validator::ProposalValidator;
pub use round_change_message_validator::RoundChangeMessageValidator;

/// Everything needed to judge messages of one height: the validator snapshot and the
/// capabilities used to hash blocks and recover authors.
#[derive(Clone)]
pub struct ValidationContext {
    height: u64,
    validators: Arc<[Address]>,
    proposer_strategy: Arc<dyn ProposerBaseStrategy>,
    block_codec: Arc<dyn QbftBlockCodec>,
    recovery: Arc<dyn SignatureRecovery>,
}

impl ValidationContext {
    /// Fails with [`QbftError::EmptyValidatorSet`] when there is nobody to validate.
    pub fn new(
        height: u64,
        validators: Vec<Address>,
        proposer_strategy: Arc<dyn ProposerBaseStrategy>,
        block_codec: Arc<dyn QbftBlockCodec>,
    ) -> Result<Self, QbftError> {
        if validators.is_empty() {
            return Err(QbftError::EmptyValidatorSet);
        }
        Ok(Self {
            height,
            validators: validators.into(),
            proposer_strategy,
            block_codec,
            recovery: Arc::new(Secp256k1Recovery),
        })
    }

    pub fn with_recovery(mut self, recovery: Arc<dyn SignatureRecovery>) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn validators(&self) -> &[Address] {
        &self.validators
    }

    pub fn is_validator(&self, address: &Address) -> bool {
        self.validators.contains(address)
    }

    pub fn quorum(&self) -> usize {
        quorum_size(self.validators.len())
    }

    pub fn fault_tolerance(&self) -> usize {
        byzantine_fault_tolerance(self.validators.len())
    }

    pub fn expected_proposer(&self, round: &ConsensusRoundIdentifier) -> Result<Address, QbftError> {
        select_proposer(round, &self.validators, self.proposer_strategy.as_ref())
    }

    pub fn block_hash(&self, block: &QbftBlock) -> Hash {
        block.hash_with(self.block_codec.as_ref())
    }

    pub fn recovery(&self) -> &dyn SignatureRecovery {
        self.recovery.as_ref()
    }

    /// Recovers the author and checks validator-set membership.
    pub fn member_author<P: QbftPayload>(&self, signed: &SignedData<P>) -> Result<Address, QbftError> {
        let author = signed.author_with(self.recovery())?;
        if !self.is_validator(&author) {
            warn!(
                target: "consensus::qbft::validation",
                ?author, round = %signed.payload().round_identifier(), "Message from non-validator"
            );
            return Err(QbftError::UnauthorizedAuthor { author });
        }
        Ok(author)
    }

    /// Checks that `prepares` prove a prepare quorum for `digest` at `round`: every entry is
    /// for that round and block, from a distinct validator, and there are at least a quorum.
    pub fn verify_prepare_certificate(
        &self,
        prepares: &[SignedData<PreparePayload>],
        round: ConsensusRoundIdentifier,
        digest: Hash,
    ) -> Result<(), QbftError> {
        let mut authors = HashSet::with_capacity(prepares.len());
        for prepare in prepares {
            let payload = prepare.payload();
            if payload.round_identifier != round {
                return Err(QbftError::ValidationError(format!(
                    "prepare for {} in certificate for {round}",
                    payload.round_identifier
                )));
            }
            if payload.digest != digest {
                return Err(QbftError::ValidationError(format!(
                    "prepare for block {} in certificate for block {digest}",
                    payload.digest
                )));
            }
            let author = self.member_author(prepare)?;
            if !authors.insert(author) {
                return Err(QbftError::ValidationError(format!("duplicate prepare from {author} in certificate")));
            }
        }
        if authors.len() < self.quorum() {
            return Err(QbftError::ValidationError(format!(
                "prepare certificate has {} prepares, quorum is {}",
                authors.len(),
                self.quorum()
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for ValidationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationContext")
            .field("height", &self.height)
            .field("validators", &self.validators)
            .field("proposer_strategy", &self.proposer_strategy)
            .field("block_codec", &self.block_codec)
            .finish_non_exhaustive()
    }
}
