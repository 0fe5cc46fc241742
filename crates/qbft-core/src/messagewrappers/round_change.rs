use alloy_primitives::Bytes;
use alloy_rlp::{BufMut, Encodable};
use std::ops::Deref;

use crate::error::QbftError;
use crate::messagedata::rlp_helpers::{
    decode_items, ensure_consumed, take_empty_list, take_list, write_empty_list, write_list,
};
use crate::messagewrappers::bft_message::BftMessage;
use crate::payload::{PreparePayload, PreparedRoundMetadata, RoundChangePayload};
use crate::types::{QbftBlock, QbftBlockCodec, SignedData};

/// A QBFT RoundChange message with the evidence for its prepared claim, if any.
///
/// `proposed_block` is present exactly when the signed payload carries
/// [`PreparedRoundMetadata`]; the prepares are then non-empty and each one matches the
/// metadata's round and block hash. Any other combination cannot be constructed or decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundChange {
    inner: BftMessage<RoundChangePayload>,
    proposed_block: Option<QbftBlock>,
    prepares: Vec<SignedData<PreparePayload>>,
}

impl Deref for RoundChange {
    type Target = BftMessage<RoundChangePayload>;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl RoundChange {
    pub fn new(
        signed_payload: SignedData<RoundChangePayload>,
        proposed_block: Option<QbftBlock>,
        prepares: Vec<SignedData<PreparePayload>>,
    ) -> Result<Self, QbftError> {
        check_pairing(signed_payload.payload().prepared_round_metadata.as_ref(), proposed_block.as_ref(), &prepares)?;
        Ok(Self { inner: BftMessage::new(signed_payload), proposed_block, prepares })
    }

    pub fn prepared_round_metadata(&self) -> Option<&PreparedRoundMetadata> {
        self.payload().prepared_round_metadata.as_ref()
    }

    pub fn proposed_block(&self) -> Option<&QbftBlock> {
        self.proposed_block.as_ref()
    }

    pub fn prepares(&self) -> &[SignedData<PreparePayload>] {
        &self.prepares
    }

    pub(crate) fn encode_to(&self, codec: &dyn QbftBlockCodec, out: &mut dyn BufMut) {
        let mut body = Vec::new();
        self.signed_payload().encode(&mut body);
        match &self.proposed_block {
            Some(block) => codec.encode_block(block, &mut body),
            None => write_empty_list(&mut body),
        }
        let mut prepares = Vec::new();
        for prepare in &self.prepares {
            prepare.encode(&mut prepares);
        }
        write_list(&prepares, &mut body);
        write_list(&body, out);
    }

    pub fn encode(&self, codec: &dyn QbftBlockCodec) -> Bytes {
        let mut out = Vec::new();
        self.encode_to(codec, &mut out);
        out.into()
    }

    pub(crate) fn decode_from(buf: &mut &[u8], codec: &dyn QbftBlockCodec) -> Result<Self, QbftError> {
        let mut body = take_list(buf, "round_change_message")?;
        let signed_payload = SignedData::<RoundChangePayload>::decode(&mut body)?;
        let proposed_block = if take_empty_list(&mut body) {
            None
        } else {
            Some(
                codec
                    .decode_block(&mut body)
                    .map_err(|e| QbftError::malformed("round_change.proposed_block", e))?,
            )
        };
        let prepares = decode_items(take_list(&mut body, "round_change.prepares")?, SignedData::decode)?;
        ensure_consumed(body, "round_change_message")?;
        Self::new(signed_payload, proposed_block, prepares)
    }

    pub fn decode(data: &[u8], codec: &dyn QbftBlockCodec) -> Result<Self, QbftError> {
        let mut buf = data;
        let round_change = Self::decode_from(&mut buf, codec)?;
        ensure_consumed(buf, "round_change_message")?;
        Ok(round_change)
    }
}

fn check_pairing(
    metadata: Option<&PreparedRoundMetadata>,
    proposed_block: Option<&QbftBlock>,
    prepares: &[SignedData<PreparePayload>],
) -> Result<(), QbftError> {
    let Some(metadata) = metadata else {
        if proposed_block.is_some() {
            return Err(QbftError::malformed("round_change.proposed_block", "block present without prepared metadata"));
        }
        if !prepares.is_empty() {
            return Err(QbftError::malformed("round_change.prepares", "prepares present without prepared metadata"));
        }
        return Ok(());
    };
    if proposed_block.is_none() {
        return Err(QbftError::malformed("round_change.proposed_block", "prepared metadata without a block"));
    }
    if prepares.is_empty() {
        return Err(QbftError::malformed("round_change.prepares", "prepared metadata without prepares"));
    }
    for prepare in prepares {
        let payload = prepare.payload();
        if payload.round_identifier.round_number != metadata.prepared_round {
            return Err(QbftError::malformed(
                "round_change.prepares",
                format!(
                    "prepare for round {} does not match prepared round {}",
                    payload.round_identifier.round_number, metadata.prepared_round
                ),
            ));
        }
        if payload.digest != metadata.prepared_block_hash {
            return Err(QbftError::malformed("round_change.prepares", "prepare digest does not match prepared block"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{test_block, test_keys};
    use crate::types::{ConsensusRoundIdentifier, NodeKey, RlpBlockCodec};
    use alloy_primitives::B256;
    use assert_matches::assert_matches;

    fn prepare(key: &dyn NodeKey, round: ConsensusRoundIdentifier, digest: B256) -> SignedData<PreparePayload> {
        SignedData::create(PreparePayload::new(round, digest), key).unwrap()
    }

    #[test]
    fn roundtrip_with_proposed_block_and_prepare() {
        let keys = test_keys(2);
        let block = test_block(1, 0);
        let prepared_round = ConsensusRoundIdentifier::new(1, 0);
        let metadata = PreparedRoundMetadata::new(block.hash(), 0);
        let payload = RoundChangePayload::new(ConsensusRoundIdentifier::new(1, 1), Some(metadata));
        let signed = SignedData::create(payload, &keys[0]).unwrap();
        let original =
            RoundChange::new(signed, Some(block.clone()), vec![prepare(&keys[1], prepared_round, block.hash())]).unwrap();

        let encoded = original.encode(&RlpBlockCodec);
        let decoded = RoundChange::decode(&encoded, &RlpBlockCodec).unwrap();

        assert_eq!(decoded, original);
        assert_eq!(decoded.author().unwrap(), keys[0].address());
        assert_eq!(decoded.proposed_block(), Some(&block));
        assert_eq!(decoded.prepares().len(), 1);
        assert_eq!(decoded.prepares()[0].author().unwrap(), keys[1].address());
    }

    #[test]
    fn roundtrip_without_prepared_metadata() {
        let keys = test_keys(1);
        let payload = RoundChangePayload::new(ConsensusRoundIdentifier::new(1, 1), None);
        let original = RoundChange::new(SignedData::create(payload, &keys[0]).unwrap(), None, vec![]).unwrap();

        let decoded = RoundChange::decode(&original.encode(&RlpBlockCodec), &RlpBlockCodec).unwrap();

        assert_eq!(decoded.author().unwrap(), keys[0].address());
        assert!(decoded.proposed_block().is_none());
        assert!(decoded.prepares().is_empty());
        assert!(decoded.prepared_round_metadata().is_none());
    }

    #[test]
    fn rejects_block_without_metadata() {
        let keys = test_keys(1);
        let payload = RoundChangePayload::new(ConsensusRoundIdentifier::new(1, 1), None);
        let signed = SignedData::create(payload, &keys[0]).unwrap();

        let err = RoundChange::new(signed, Some(test_block(1, 0)), vec![]).unwrap_err();
        assert_matches!(err, QbftError::MalformedMessage { field: "round_change.proposed_block", .. });
    }

    #[test]
    fn rejects_metadata_without_prepares() {
        let keys = test_keys(1);
        let block = test_block(1, 0);
        let metadata = PreparedRoundMetadata::new(block.hash(), 0);
        let payload = RoundChangePayload::new(ConsensusRoundIdentifier::new(1, 1), Some(metadata));
        let signed = SignedData::create(payload, &keys[0]).unwrap();

        let err = RoundChange::new(signed, Some(block), vec![]).unwrap_err();
        assert_matches!(err, QbftError::MalformedMessage { field: "round_change.prepares", .. });
    }

    #[test]
    fn rejects_prepare_from_other_round() {
        let keys = test_keys(2);
        let block = test_block(1, 0);
        let metadata = PreparedRoundMetadata::new(block.hash(), 0);
        let payload = RoundChangePayload::new(ConsensusRoundIdentifier::new(1, 2), Some(metadata));
        let signed = SignedData::create(payload, &keys[0]).unwrap();
        let stray = prepare(&keys[1], ConsensusRoundIdentifier::new(1, 1), block.hash());

        let err = RoundChange::new(signed, Some(block), vec![stray]).unwrap_err();
        assert_matches!(err, QbftError::MalformedMessage { field: "round_change.prepares", .. });
    }

    #[test]
    fn decode_rejects_unpaired_block_on_the_wire() {
        let keys = test_keys(1);
        let payload = RoundChangePayload::new(ConsensusRoundIdentifier::new(1, 1), None);
        let signed = SignedData::create(payload, &keys[0]).unwrap();
        let mut body = Vec::new();
        signed.encode(&mut body);
        test_block(1, 0).encode(&mut body);
        write_empty_list(&mut body);
        let mut encoded = Vec::new();
        write_list(&body, &mut encoded);

        let err = RoundChange::decode(&encoded, &RlpBlockCodec).unwrap_err();
        assert_matches!(err, QbftError::MalformedMessage { field: "round_change.proposed_block", .. });
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let keys = test_keys(1);
        let payload = RoundChangePayload::new(ConsensusRoundIdentifier::new(1, 1), None);
        let original = RoundChange::new(SignedData::create(payload, &keys[0]).unwrap(), None, vec![]).unwrap();
        let mut encoded = original.encode(&RlpBlockCodec).to_vec();
        encoded.push(0x80);

        let err = RoundChange::decode(&encoded, &RlpBlockCodec).unwrap_err();
        assert_matches!(err, QbftError::MalformedMessage { field: "round_change_message", .. });
    }
}
