use alloy_primitives::{Bytes, B256 as Hash};
use alloy_rlp::{BufMut, Encodable};
use std::ops::Deref;

use crate::error::QbftError;
use crate::messagedata::rlp_helpers::{decode_items, ensure_consumed, take_list, write_list};
use crate::messagewrappers::bft_message::BftMessage;
use crate::payload::{PreparePayload, ProposalPayload, RoundChangePayload};
use crate::types::{QbftBlock, QbftBlockCodec, SignedData};

/// A QBFT Proposal: the signed digest, the block itself and, for rounds above zero, the
/// round-change certificate justifying the round plus the prepares backing a re-proposed
/// block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    inner: BftMessage<ProposalPayload>,
    block: QbftBlock,
    round_changes: Vec<SignedData<RoundChangePayload>>,
    prepares: Vec<SignedData<PreparePayload>>,
}

impl Deref for Proposal {
    type Target = BftMessage<ProposalPayload>;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Proposal {
    /// Fails when the round-change certificate is present at round 0 or missing above it.
    pub fn new(
        signed_payload: SignedData<ProposalPayload>,
        block: QbftBlock,
        round_changes: Vec<SignedData<RoundChangePayload>>,
        prepares: Vec<SignedData<PreparePayload>>,
    ) -> Result<Self, QbftError> {
        let round_number = signed_payload.payload().round_identifier.round_number;
        if round_number == 0 && !round_changes.is_empty() {
            return Err(QbftError::malformed("proposal.round_changes", "round-change certificate present at round 0"));
        }
        if round_number > 0 && round_changes.is_empty() {
            return Err(QbftError::malformed(
                "proposal.round_changes",
                format!("round-change certificate missing at round {round_number}"),
            ));
        }
        Ok(Self { inner: BftMessage::new(signed_payload), block, round_changes, prepares })
    }

    pub fn block(&self) -> &QbftBlock {
        &self.block
    }

    pub fn digest(&self) -> Hash {
        self.payload().digest
    }

    /// `None` at round 0.
    pub fn round_change_certificate(&self) -> Option<&[SignedData<RoundChangePayload>]> {
        (!self.round_changes.is_empty()).then_some(self.round_changes.as_slice())
    }

    /// `None` unless the proposal re-proposes a previously prepared block.
    pub fn prepare_certificate(&self) -> Option<&[SignedData<PreparePayload>]> {
        (!self.prepares.is_empty()).then_some(self.prepares.as_slice())
    }

    pub(crate) fn encode_to(&self, codec: &dyn QbftBlockCodec, out: &mut dyn BufMut) {
        let mut round_changes = Vec::new();
        for round_change in &self.round_changes {
            round_change.encode(&mut round_changes);
        }
        let mut prepares = Vec::new();
        for prepare in &self.prepares {
            prepare.encode(&mut prepares);
        }
        let mut certificates = Vec::with_capacity(round_changes.len() + prepares.len() + 6);
        write_list(&round_changes, &mut certificates);
        write_list(&prepares, &mut certificates);

        let mut body = Vec::new();
        self.signed_payload().encode(&mut body);
        codec.encode_block(&self.block, &mut body);
        write_list(&certificates, &mut body);
        write_list(&body, out);
    }

    pub fn encode(&self, codec: &dyn QbftBlockCodec) -> Bytes {
        let mut out = Vec::new();
        self.encode_to(codec, &mut out);
        out.into()
    }

    pub fn decode(data: &[u8], codec: &dyn QbftBlockCodec) -> Result<Self, QbftError> {
        let mut buf = data;
        let mut body = take_list(&mut buf, "proposal_message")?;
        ensure_consumed(buf, "proposal_message")?;

        let signed_payload = SignedData::<ProposalPayload>::decode(&mut body)?;
        let block = codec.decode_block(&mut body).map_err(|e| QbftError::malformed("proposal.block", e))?;
        let mut certificates = take_list(&mut body, "proposal.certificates")?;
        ensure_consumed(body, "proposal_message")?;

        let round_changes = decode_items(take_list(&mut certificates, "proposal.round_changes")?, SignedData::decode)?;
        let prepares = decode_items(take_list(&mut certificates, "proposal.prepares")?, SignedData::decode)?;
        ensure_consumed(certificates, "proposal.certificates")?;

        Self::new(signed_payload, block, round_changes, prepares)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{test_block, test_keys, CountingBlockCodec};
    use crate::payload::PreparedRoundMetadata;
    use crate::types::{ConsensusRoundIdentifier, NodeKey, RlpBlockCodec};
    use assert_matches::assert_matches;

    fn signed_proposal(key: &dyn NodeKey, round: ConsensusRoundIdentifier, block: &QbftBlock) -> SignedData<ProposalPayload> {
        SignedData::create(ProposalPayload::new(round, block.hash()), key).unwrap()
    }

    #[test]
    fn round_zero_roundtrip() {
        let keys = test_keys(1);
        let block = test_block(3, 0);
        let round = ConsensusRoundIdentifier::new(3, 0);
        let original = Proposal::new(signed_proposal(&keys[0], round, &block), block, vec![], vec![]).unwrap();

        let decoded = Proposal::decode(&original.encode(&RlpBlockCodec), &RlpBlockCodec).unwrap();

        assert_eq!(decoded, original);
        assert!(decoded.round_change_certificate().is_none());
        assert!(decoded.prepare_certificate().is_none());
        assert_eq!(decoded.author().unwrap(), keys[0].address());
    }

    #[test]
    fn roundtrip_with_certificates() {
        let keys = test_keys(4);
        let block = test_block(3, 0);
        let target = ConsensusRoundIdentifier::new(3, 1);
        let metadata = PreparedRoundMetadata::new(block.hash(), 0);
        let round_changes = keys[..3]
            .iter()
            .map(|k| SignedData::create(RoundChangePayload::new(target, Some(metadata)), k).unwrap())
            .collect();
        let prepares = keys[1..]
            .iter()
            .map(|k| SignedData::create(PreparePayload::new(ConsensusRoundIdentifier::new(3, 0), block.hash()), k).unwrap())
            .collect();
        let original =
            Proposal::new(signed_proposal(&keys[1], target, &block), block.clone(), round_changes, prepares).unwrap();

        let codec = CountingBlockCodec::default();
        let decoded = Proposal::decode(&original.encode(&codec), &codec).unwrap();

        assert_eq!(decoded, original);
        assert_eq!(decoded.round_change_certificate().map(<[_]>::len), Some(3));
        assert_eq!(decoded.prepare_certificate().map(<[_]>::len), Some(3));
        assert_eq!(decoded.block().hash(), block.hash());
        assert_eq!(codec.decode_calls(), 1);
    }

    #[test]
    fn certificate_presence_follows_round() {
        let keys = test_keys(1);
        let block = test_block(3, 0);

        let err = Proposal::new(signed_proposal(&keys[0], ConsensusRoundIdentifier::new(3, 2), &block), block.clone(), vec![], vec![])
            .unwrap_err();
        assert_matches!(err, QbftError::MalformedMessage { field: "proposal.round_changes", .. });

        let stray = SignedData::create(RoundChangePayload::new(ConsensusRoundIdentifier::new(3, 0), None), &keys[0]).unwrap();
        let err = Proposal::new(signed_proposal(&keys[0], ConsensusRoundIdentifier::new(3, 0), &block), block, vec![stray], vec![])
            .unwrap_err();
        assert_matches!(err, QbftError::MalformedMessage { field: "proposal.round_changes", .. });
    }

    #[test]
    fn rejects_truncated_block() {
        let keys = test_keys(1);
        let block = test_block(3, 0);
        let signed = signed_proposal(&keys[0], ConsensusRoundIdentifier::new(3, 0), &block);
        let mut body = Vec::new();
        signed.encode(&mut body);
        write_list(&[0x01, 0x02], &mut body);
        write_list(&[0xc0, 0xc0], &mut body);
        let mut encoded = Vec::new();
        write_list(&body, &mut encoded);

        let err = Proposal::decode(&encoded, &RlpBlockCodec).unwrap_err();
        assert_matches!(err, QbftError::MalformedMessage { field: "proposal.block", .. });
    }
}
