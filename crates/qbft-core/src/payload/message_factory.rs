use alloy_primitives::{Address, B256 as Hash};
use std::sync::Arc;

use crate::error::QbftError;
use crate::messagewrappers::{Commit, Prepare, PreparedCertificate, Proposal, RoundChange};
use crate::payload::{CommitPayload, PreparePayload, ProposalPayload, RoundChangePayload};
use crate::types::{ConsensusRoundIdentifier, NodeKey, QbftBlock, QbftBlockCodec, RlpBlockCodec, RlpSignature, SignedData};

/// Creates messages authored and signed by the local node.
///
/// Proposal digests come from the same [`QbftBlockCodec`] that peers validate with.
#[derive(Debug, Clone)]
pub struct MessageFactory {
    node_key: Arc<dyn NodeKey>,
    block_codec: Arc<dyn QbftBlockCodec>,
}

impl MessageFactory {
    /// Hashes blocks with [`RlpBlockCodec`].
    pub fn new(node_key: Arc<dyn NodeKey>) -> Self {
        Self { node_key, block_codec: Arc::new(RlpBlockCodec) }
    }

    pub fn with_block_codec(mut self, block_codec: Arc<dyn QbftBlockCodec>) -> Self {
        self.block_codec = block_codec;
        self
    }

    pub fn local_address(&self) -> Address {
        self.node_key.address()
    }

    pub fn create_proposal(
        &self,
        round_identifier: ConsensusRoundIdentifier,
        block: QbftBlock,
        round_changes: Vec<SignedData<RoundChangePayload>>,
        prepares: Vec<SignedData<PreparePayload>>,
    ) -> Result<Proposal, QbftError> {
        let payload = ProposalPayload::new(round_identifier, block.hash_with(self.block_codec.as_ref()));
        let signed_payload = SignedData::create(payload, self.node_key.as_ref())?;
        Proposal::new(signed_payload, block, round_changes, prepares)
    }

    pub fn create_prepare(&self, round_identifier: ConsensusRoundIdentifier, digest: Hash) -> Result<Prepare, QbftError> {
        let signed_payload = SignedData::create(PreparePayload::new(round_identifier, digest), self.node_key.as_ref())?;
        Ok(Prepare::new(signed_payload))
    }

    /// Creates a Commit whose seal is the node's signature over `digest`.
    pub fn create_commit(&self, round_identifier: ConsensusRoundIdentifier, digest: Hash) -> Result<Commit, QbftError> {
        let committed_seal = self.create_commit_seal(digest)?;
        let payload = CommitPayload::new(round_identifier, digest, committed_seal);
        let signed_payload = SignedData::create(payload, self.node_key.as_ref())?;
        Ok(Commit::new(signed_payload))
    }

    pub fn create_commit_seal(&self, digest: Hash) -> Result<RlpSignature, QbftError> {
        self.node_key.sign_hash(digest)
    }

    /// Creates a RoundChange for `target`, carrying the prepared certificate if there is one.
    pub fn create_round_change(
        &self,
        target: ConsensusRoundIdentifier,
        prepared: Option<&PreparedCertificate>,
    ) -> Result<RoundChange, QbftError> {
        let payload = RoundChangePayload::new(target, prepared.map(PreparedCertificate::metadata));
        let signed_payload = SignedData::create(payload, self.node_key.as_ref())?;
        match prepared {
            Some(certificate) => {
                RoundChange::new(signed_payload, Some(certificate.block().clone()), certificate.prepares().to_vec())
            }
            None => RoundChange::new(signed_payload, None, Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{test_block, test_keys};
    use crate::types::Secp256k1Recovery;
    use crate::types::SignatureRecovery;

    #[test]
    fn commit_seal_recovers_to_local_address() {
        let factory = MessageFactory::new(Arc::new(test_keys(1).remove(0)));
        let block = test_block(2, 0);

        let commit = factory.create_commit(ConsensusRoundIdentifier::new(2, 0), block.hash()).unwrap();

        let sealer = Secp256k1Recovery.recover_address(block.hash(), commit.committed_seal()).unwrap();
        assert_eq!(sealer, factory.local_address());
        assert_eq!(commit.author().unwrap(), factory.local_address());
    }

    #[test]
    fn round_change_carries_prepared_certificate() {
        let keys = test_keys(2);
        let factory = MessageFactory::new(Arc::new(keys[0].clone()));
        let peer = MessageFactory::new(Arc::new(keys[1].clone()));
        let block = test_block(2, 0);
        let prepared_round = ConsensusRoundIdentifier::new(2, 0);
        let prepare = peer.create_prepare(prepared_round, block.hash()).unwrap();
        let certificate = PreparedCertificate::new(block.clone(), block.hash(), vec![prepare.signed_payload().clone()], 0);

        let round_change = factory.create_round_change(prepared_round.next_round(), Some(&certificate)).unwrap();

        assert_eq!(round_change.prepared_round_metadata(), Some(&certificate.metadata()));
        assert_eq!(round_change.proposed_block(), Some(&block));
        assert_eq!(round_change.prepares(), certificate.prepares());
    }
}
