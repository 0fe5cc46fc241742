use alloy_rlp::{BufMut, Encodable};

use crate::error::QbftError;
use crate::messagedata::qbft_v1;
use crate::messagedata::rlp_helpers::{
    decode_field, ensure_consumed, take_empty_list, take_list, write_empty_list, write_list,
};
use crate::payload::prepared_round_metadata::PreparedRoundMetadata;
use crate::payload::qbft_payload::QbftPayload;
use crate::types::ConsensusRoundIdentifier;

/// Payload of a RoundChange message. `round_identifier` is the target round.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoundChangePayload {
    pub round_identifier: ConsensusRoundIdentifier,
    /// Set when the author prepared a block in an earlier round of this height.
    pub prepared_round_metadata: Option<PreparedRoundMetadata>,
}

impl RoundChangePayload {
    pub fn new(
        round_identifier: ConsensusRoundIdentifier,
        prepared_round_metadata: Option<PreparedRoundMetadata>,
    ) -> Self {
        Self { round_identifier, prepared_round_metadata }
    }
}

impl Encodable for RoundChangePayload {
    fn encode(&self, out: &mut dyn BufMut) {
        let mut body = Vec::with_capacity(self.round_identifier.fields_length() + 40);
        self.round_identifier.encode_fields(&mut body);
        match &self.prepared_round_metadata {
            Some(metadata) => metadata.encode(&mut body),
            None => write_empty_list(&mut body),
        }
        write_list(&body, out);
    }
}

impl QbftPayload for RoundChangePayload {
    fn round_identifier(&self) -> &ConsensusRoundIdentifier {
        &self.round_identifier
    }

    fn message_type(&self) -> u8 {
        qbft_v1::ROUND_CHANGE
    }

    fn decode_payload(buf: &mut &[u8]) -> Result<Self, QbftError> {
        let mut body = take_list(buf, "round_change")?;
        let round_identifier = ConsensusRoundIdentifier::decode_fields(&mut body)?;
        let prepared_round_metadata = if take_empty_list(&mut body) {
            None
        } else {
            Some(decode_field(&mut body, "round_change.prepared_round_metadata")?)
        };
        ensure_consumed(body, "round_change")?;
        Ok(Self { round_identifier, prepared_round_metadata })
    }
}
