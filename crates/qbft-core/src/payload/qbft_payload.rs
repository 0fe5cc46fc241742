use alloy_primitives::{keccak256, B256 as Hash};
use alloy_rlp::Encodable;
use std::fmt;

use crate::error::QbftError;
use crate::messagedata::rlp_helpers::write_list;
use crate::types::ConsensusRoundIdentifier;

/// Trait for QBFT message payloads, the part of every message covered by the author's signature.
pub trait QbftPayload: Encodable + Clone + fmt::Debug + PartialEq + Eq + Send + Sync {
    /// The consensus round (height and round) this payload pertains to.
    fn round_identifier(&self) -> &ConsensusRoundIdentifier;

    /// Message code from [`crate::messagedata::qbft_v1`].
    fn message_type(&self) -> u8;

    /// Decodes one payload list, leaving `buf` positioned after it.
    fn decode_payload(buf: &mut &[u8]) -> Result<Self, QbftError>;

    /// `keccak256(rlp([message_type, payload]))`.
    fn hash_for_signature(&self) -> Hash {
        let mut body = Vec::with_capacity(1 + self.length());
        self.message_type().encode(&mut body);
        self.encode(&mut body);
        let mut out = Vec::with_capacity(body.len() + 3);
        write_list(&body, &mut out);
        keccak256(out)
    }
}
