use alloy_primitives::B256 as Hash;
use alloy_rlp::{BufMut, Encodable};

use crate::error::QbftError;
use crate::messagedata::qbft_v1;
use crate::messagedata::rlp_helpers::{decode_field, ensure_consumed, take_list, write_list};
use crate::payload::qbft_payload::QbftPayload;
use crate::types::ConsensusRoundIdentifier;

/// Payload of a Proposal message.
///
/// Only the digest of the proposed block is signed. The block itself travels beside the
/// signed payload in [`crate::messagewrappers::Proposal`] and must hash to `digest`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProposalPayload {
    pub round_identifier: ConsensusRoundIdentifier,
    pub digest: Hash,
}

impl ProposalPayload {
    pub fn new(round_identifier: ConsensusRoundIdentifier, digest: Hash) -> Self {
        Self { round_identifier, digest }
    }
}

impl Encodable for ProposalPayload {
    fn encode(&self, out: &mut dyn BufMut) {
        let mut body = Vec::with_capacity(self.round_identifier.fields_length() + 33);
        self.round_identifier.encode_fields(&mut body);
        self.digest.encode(&mut body);
        write_list(&body, out);
    }
}

impl QbftPayload for ProposalPayload {
    fn round_identifier(&self) -> &ConsensusRoundIdentifier {
        &self.round_identifier
    }

    fn message_type(&self) -> u8 {
        qbft_v1::PROPOSAL
    }

    fn decode_payload(buf: &mut &[u8]) -> Result<Self, QbftError> {
        let mut body = take_list(buf, "proposal")?;
        let round_identifier = ConsensusRoundIdentifier::decode_fields(&mut body)?;
        let digest = decode_field(&mut body, "proposal.digest")?;
        ensure_consumed(body, "proposal")?;
        Ok(Self { round_identifier, digest })
    }
}
