use alloy_primitives::Address;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::QbftError;
use crate::messagewrappers::Proposal;
use crate::payload::PreparedRoundMetadata;
use crate::types::ConsensusRoundIdentifier;
use crate::validation::ValidationContext;

/// Validates a Proposal against the height's validator set.
///
/// Round 0 proposals only need the right proposer and a consistent block. Later rounds must
/// carry a quorum of RoundChanges targeting the round; when any of them claims a prepared
/// block, the proposal must re-propose the block of the highest claim and carry the prepare
/// quorum for it.
#[derive(Debug, Clone)]
pub struct ProposalValidator {
    context: ValidationContext,
}

impl ProposalValidator {
    pub fn new(context: ValidationContext) -> Self {
        Self { context }
    }

    /// Returns the author of a valid proposal.
    pub fn validate(&self, proposal: &Proposal) -> Result<Address, QbftError> {
        let author = self.context.member_author(proposal.signed_payload())?;
        let round = *proposal.round_identifier();

        if round.sequence_number != self.context.height() {
            return Err(QbftError::ValidationError(format!(
                "proposal for height {}, expected {}",
                round.sequence_number,
                self.context.height()
            )));
        }
        let expected_proposer = self.context.expected_proposer(&round)?;
        if author != expected_proposer {
            warn!(
                target: "consensus::qbft::validation",
                %author, %expected_proposer, %round, "Proposal from unexpected proposer"
            );
            return Err(QbftError::ValidationError(format!(
                "proposal for {round} from {author}, expected proposer {expected_proposer}"
            )));
        }

        let block = proposal.block();
        let block_hash = self.context.block_hash(block);
        if block_hash != proposal.digest() {
            return Err(QbftError::ValidationError(format!(
                "proposed block hash {block_hash} does not match signed digest {}",
                proposal.digest()
            )));
        }
        if block.number() != round.sequence_number {
            return Err(QbftError::ValidationError(format!(
                "proposed block number {} does not match height {}",
                block.number(),
                round.sequence_number
            )));
        }

        if round.round_number == 0 {
            if proposal.prepare_certificate().is_some() {
                return Err(QbftError::ValidationError("prepare certificate in round 0 proposal".to_string()));
            }
        } else {
            self.validate_round_change_certificate(proposal, round)?;
        }

        debug!(target: "consensus::qbft::validation", %author, %round, %block_hash, "Proposal is valid");
        Ok(author)
    }

    fn validate_round_change_certificate(
        &self,
        proposal: &Proposal,
        round: ConsensusRoundIdentifier,
    ) -> Result<(), QbftError> {
        let round_changes = proposal.round_change_certificate().unwrap_or_default();
        let mut authors = HashSet::with_capacity(round_changes.len());
        for round_change in round_changes {
            let payload = round_change.payload();
            if payload.round_identifier != round {
                return Err(QbftError::ValidationError(format!(
                    "round change for {} in certificate for {round}",
                    payload.round_identifier
                )));
            }
            if let Some(metadata) = &payload.prepared_round_metadata {
                if metadata.prepared_round >= round.round_number {
                    return Err(QbftError::ValidationError(format!(
                        "round change claims prepared round {} at round {}",
                        metadata.prepared_round, round.round_number
                    )));
                }
            }
            let author = self.context.member_author(round_change)?;
            if !authors.insert(author) {
                return Err(QbftError::ValidationError(format!("duplicate round change from {author} in certificate")));
            }
        }
        if authors.len() < self.context.quorum() {
            return Err(QbftError::ValidationError(format!(
                "round-change certificate has {} entries, quorum is {}",
                authors.len(),
                self.context.quorum()
            )));
        }

        let claims = round_changes.iter().filter_map(|rc| rc.payload().prepared_round_metadata.as_ref());
        let highest = PreparedRoundMetadata::highest(claims).inspect_err(|e| {
            warn!(target: "consensus::qbft::validation", %round, error = %e, "Proposal certificate carries conflicting prepared blocks")
        })?;

        match highest {
            Some(metadata) => {
                if proposal.digest() != metadata.prepared_block_hash {
                    return Err(QbftError::ValidationError(format!(
                        "proposal must re-propose prepared block {}, got {}",
                        metadata.prepared_block_hash,
                        proposal.digest()
                    )));
                }
                let prepared_round = ConsensusRoundIdentifier::new(round.sequence_number, metadata.prepared_round);
                self.context.verify_prepare_certificate(
                    proposal.prepare_certificate().unwrap_or_default(),
                    prepared_round,
                    metadata.prepared_block_hash,
                )
            }
            None if proposal.prepare_certificate().is_some() => Err(QbftError::ValidationError(
                "prepare certificate without a prepared round change".to_string(),
            )),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messagewrappers::PreparedCertificate;
    use crate::mocks::{test_block, test_context, test_factories, test_validators, CountingBlockCodec};
    use crate::payload::{MessageFactory, PreparePayload, RoundChangePayload};
    use crate::types::{HeightRoundRobin, QbftBlock, QbftBlockCodec, RlpBlockCodec, SignedData};
    use alloy_primitives::{keccak256, Bytes, B256 as Hash};
    use alloy_rlp::BufMut;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    /// Digest over the whole block encoding rather than the header.
    #[derive(Debug)]
    struct FullEncodingCodec;

    impl QbftBlockCodec for FullEncodingCodec {
        fn encode_block(&self, block: &QbftBlock, out: &mut dyn BufMut) {
            RlpBlockCodec.encode_block(block, out)
        }

        fn decode_block(&self, buf: &mut &[u8]) -> alloy_rlp::Result<QbftBlock> {
            RlpBlockCodec.decode_block(buf)
        }

        fn block_hash(&self, block: &QbftBlock) -> Hash {
            keccak256(alloy_rlp::encode(block))
        }
    }

    fn round_changes(
        factories: &[MessageFactory],
        target: ConsensusRoundIdentifier,
        prepared: Option<&PreparedCertificate>,
    ) -> Vec<SignedData<RoundChangePayload>> {
        factories
            .iter()
            .map(|f| f.create_round_change(target, prepared).unwrap().signed_payload().clone())
            .collect()
    }

    fn prepares(factories: &[MessageFactory], round: ConsensusRoundIdentifier, block: &QbftBlock) -> Vec<SignedData<PreparePayload>> {
        factories.iter().map(|f| f.create_prepare(round, block.hash()).unwrap().into_signed_payload()).collect()
    }

    #[test]
    fn accepts_round_zero_proposal_from_expected_proposer() {
        let factories = test_factories(4);
        let validator = ProposalValidator::new(test_context(1, 4));
        // HeightRoundRobin: height 1, round 0 -> index 1.
        let proposal = factories[1].create_proposal(ConsensusRoundIdentifier::new(1, 0), test_block(1, 0), vec![], vec![]).unwrap();

        assert_eq!(validator.validate(&proposal).unwrap(), factories[1].local_address());
    }

    #[test]
    fn rejects_relayed_block_with_swapped_transactions() {
        let factories = test_factories(4);
        let validator = ProposalValidator::new(test_context(1, 4));
        let honest = factories[1].create_proposal(ConsensusRoundIdentifier::new(1, 0), test_block(1, 0), vec![], vec![]).unwrap();
        let swapped = QbftBlock::new(honest.block().header().clone(), vec![Bytes::from_static(b"injected")]);
        let relayed = Proposal::new(honest.signed_payload().clone(), swapped, vec![], vec![]).unwrap();

        assert!(validator.validate(&honest).is_ok());
        assert_matches!(validator.validate(&relayed), Err(QbftError::ValidationError(_)));
    }

    #[test]
    fn proposal_digest_follows_injected_codec() {
        let codec: Arc<dyn QbftBlockCodec> = Arc::new(FullEncodingCodec);
        let context = ValidationContext::new(1, test_validators(4), Arc::new(HeightRoundRobin), codec.clone()).unwrap();
        let proposer = test_factories(4).remove(1).with_block_codec(codec.clone());

        let proposal = proposer.create_proposal(ConsensusRoundIdentifier::new(1, 0), test_block(1, 0), vec![], vec![]).unwrap();
        assert_eq!(proposal.digest(), keccak256(alloy_rlp::encode(proposal.block())));

        let received = Proposal::decode(&proposal.encode(codec.as_ref()), codec.as_ref()).unwrap();
        assert!(ProposalValidator::new(context).validate(&received).is_ok());
    }

    #[test]
    fn received_block_is_hashed_once() {
        let codec = Arc::new(CountingBlockCodec::default());
        let context = ValidationContext::new(1, test_validators(4), Arc::new(HeightRoundRobin), codec.clone()).unwrap();
        let proposal = test_factories(4)[1]
            .create_proposal(ConsensusRoundIdentifier::new(1, 0), test_block(1, 0), vec![], vec![])
            .unwrap();
        let received = Proposal::decode(&proposal.encode(codec.as_ref()), codec.as_ref()).unwrap();

        let validator = ProposalValidator::new(context.clone());
        validator.validate(&received).unwrap();
        validator.validate(&received).unwrap();
        assert_eq!(context.block_hash(received.block()), received.digest());
        assert_eq!(codec.hash_calls(), 1);
    }

    #[test]
    fn rejects_wrong_proposer() {
        let factories = test_factories(4);
        let validator = ProposalValidator::new(test_context(1, 4));
        let proposal = factories[0].create_proposal(ConsensusRoundIdentifier::new(1, 0), test_block(1, 0), vec![], vec![]).unwrap();

        assert_matches!(validator.validate(&proposal), Err(QbftError::ValidationError(_)));
    }

    #[test]
    fn rejects_block_for_other_height() {
        let factories = test_factories(4);
        let validator = ProposalValidator::new(test_context(1, 4));
        let proposal = factories[1].create_proposal(ConsensusRoundIdentifier::new(1, 0), test_block(2, 0), vec![], vec![]).unwrap();

        assert_matches!(validator.validate(&proposal), Err(QbftError::ValidationError(_)));
    }

    #[test]
    fn accepts_fresh_block_with_round_change_quorum() {
        let factories = test_factories(4);
        let validator = ProposalValidator::new(test_context(1, 4));
        let target = ConsensusRoundIdentifier::new(1, 1);
        let rcs = round_changes(&factories[..3], target, None);
        let proposal = factories[2].create_proposal(target, test_block(1, 7), rcs, vec![]).unwrap();

        assert!(validator.validate(&proposal).is_ok());
    }

    #[test]
    fn rejects_round_change_certificate_below_quorum() {
        let factories = test_factories(4);
        let validator = ProposalValidator::new(test_context(1, 4));
        let target = ConsensusRoundIdentifier::new(1, 1);
        let rcs = round_changes(&factories[..2], target, None);
        let proposal = factories[2].create_proposal(target, test_block(1, 7), rcs, vec![]).unwrap();

        assert_matches!(validator.validate(&proposal), Err(QbftError::ValidationError(_)));
    }

    #[test]
    fn requires_reproposal_of_prepared_block() {
        let factories = test_factories(4);
        let validator = ProposalValidator::new(test_context(1, 4));
        let prepared_block = test_block(1, 0);
        let prepared_round = ConsensusRoundIdentifier::new(1, 0);
        let certificate = PreparedCertificate::new(prepared_block.clone(), prepared_block.hash(), prepares(&factories[..3], prepared_round, &prepared_block), 0);
        let target = ConsensusRoundIdentifier::new(1, 1);
        let rcs = round_changes(&factories[..3], target, Some(&certificate));

        let honest = factories[2]
            .create_proposal(target, prepared_block.clone(), rcs.clone(), certificate.prepares().to_vec())
            .unwrap();
        assert!(validator.validate(&honest).is_ok());

        let fresh = factories[2].create_proposal(target, test_block(1, 9), rcs.clone(), certificate.prepares().to_vec()).unwrap();
        assert_matches!(validator.validate(&fresh), Err(QbftError::ValidationError(_)));

        let unproven = factories[2].create_proposal(target, prepared_block, rcs, vec![]).unwrap();
        assert_matches!(validator.validate(&unproven), Err(QbftError::ValidationError(_)));
    }

    #[test]
    fn conflicting_prepared_claims_are_reported() {
        let factories = test_factories(4);
        let validator = ProposalValidator::new(test_context(1, 4));
        let round_zero = ConsensusRoundIdentifier::new(1, 0);
        let block_a = test_block(1, 1);
        let block_b = test_block(1, 2);
        let cert_a = PreparedCertificate::new(block_a.clone(), block_a.hash(), prepares(&factories[..3], round_zero, &block_a), 0);
        let cert_b = PreparedCertificate::new(block_b.clone(), block_b.hash(), prepares(&factories[..3], round_zero, &block_b), 0);
        let target = ConsensusRoundIdentifier::new(1, 1);
        let mut rcs = round_changes(&factories[..2], target, Some(&cert_a));
        rcs.extend(round_changes(&factories[2..3], target, Some(&cert_b)));

        let proposal = factories[2].create_proposal(target, block_a, rcs, cert_a.prepares().to_vec()).unwrap();
        assert_matches!(validator.validate(&proposal), Err(QbftError::ConflictingPreparedBlocks { prepared_round: 0, .. }));
    }
}
