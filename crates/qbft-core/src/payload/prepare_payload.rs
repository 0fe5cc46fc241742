use alloy_primitives::B256 as Hash;
use alloy_rlp::{BufMut, Encodable};

use crate::error::QbftError;
use crate::messagedata::qbft_v1;
use crate::messagedata::rlp_helpers::{decode_field, ensure_consumed, take_list, write_list};
use crate::payload::qbft_payload::QbftPayload;
use crate::types::ConsensusRoundIdentifier;

/// Payload of a Prepare message: agreement to the proposal with the given block digest.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PreparePayload {
    pub round_identifier: ConsensusRoundIdentifier,
    pub digest: Hash,
}

impl PreparePayload {
    pub fn new(round_identifier: ConsensusRoundIdentifier, digest: Hash) -> Self {
        Self { round_identifier, digest }
    }
}

impl Encodable for PreparePayload {
    fn encode(&self, out: &mut dyn BufMut) {
        let mut body = Vec::with_capacity(self.round_identifier.fields_length() + 33);
        self.round_identifier.encode_fields(&mut body);
        self.digest.encode(&mut body);
        write_list(&body, out);
    }
}

impl QbftPayload for PreparePayload {
    fn round_identifier(&self) -> &ConsensusRoundIdentifier {
        &self.round_identifier
    }

    fn message_type(&self) -> u8 {
        qbft_v1::PREPARE
    }

    fn decode_payload(buf: &mut &[u8]) -> Result<Self, QbftError> {
        let mut body = take_list(buf, "prepare")?;
        let round_identifier = ConsensusRoundIdentifier::decode_fields(&mut body)?;
        let digest = decode_field(&mut body, "prepare.digest")?;
        ensure_consumed(body, "prepare")?;
        Ok(Self { round_identifier, digest })
    }
}
