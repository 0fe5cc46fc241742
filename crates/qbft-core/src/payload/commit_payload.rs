use alloy_primitives::B256 as Hash;
use alloy_rlp::{BufMut, Encodable};

use crate::error::QbftError;
use crate::messagedata::qbft_v1;
use crate::messagedata::rlp_helpers::{decode_field, ensure_consumed, take_list, write_list};
use crate::payload::qbft_payload::QbftPayload;
use crate::types::{ConsensusRoundIdentifier, RlpSignature};

/// Payload of a Commit message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommitPayload {
    pub round_identifier: ConsensusRoundIdentifier,
    /// Digest of the block being committed.
    pub digest: Hash,
    /// The committer's signature over `digest`. Collected seals end up in the imported block.
    pub committed_seal: RlpSignature,
}

impl CommitPayload {
    pub fn new(round_identifier: ConsensusRoundIdentifier, digest: Hash, committed_seal: RlpSignature) -> Self {
        Self { round_identifier, digest, committed_seal }
    }
}

impl Encodable for CommitPayload {
    fn encode(&self, out: &mut dyn BufMut) {
        let mut body =
            Vec::with_capacity(self.round_identifier.fields_length() + 33 + self.committed_seal.length());
        self.round_identifier.encode_fields(&mut body);
        self.digest.encode(&mut body);
        self.committed_seal.encode(&mut body);
        write_list(&body, out);
    }
}

impl QbftPayload for CommitPayload {
    fn round_identifier(&self) -> &ConsensusRoundIdentifier {
        &self.round_identifier
    }

    fn message_type(&self) -> u8 {
        qbft_v1::COMMIT
    }

    fn decode_payload(buf: &mut &[u8]) -> Result<Self, QbftError> {
        let mut body = take_list(buf, "commit")?;
        let round_identifier = ConsensusRoundIdentifier::decode_fields(&mut body)?;
        let digest = decode_field(&mut body, "commit.digest")?;
        let committed_seal = RlpSignature::decode_field(&mut body, "commit.committed_seal")?;
        ensure_consumed(body, "commit")?;
        Ok(Self { round_identifier, digest, committed_seal })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{K256NodeKey, NodeKey};
    use alloy_primitives::b256;

    fn digest() -> Hash {
        b256!("0000000000000000000000000000000000000000000000000000000000000002")
    }

    #[test]
    fn rlp_roundtrip_keeps_seal() {
        let key = K256NodeKey::from_slice(&[0x21; 32]).unwrap();
        let payload = CommitPayload::new(ConsensusRoundIdentifier::new(1, 2), digest(), key.sign_hash(digest()).unwrap());

        let encoded = alloy_rlp::encode(&payload);
        let decoded = CommitPayload::decode_payload(&mut encoded.as_slice()).unwrap();

        assert_eq!(decoded, payload);
        assert_eq!(decoded.message_type(), qbft_v1::COMMIT);
    }

    #[test]
    fn malformed_seal_names_the_field() {
        let mut body = Vec::new();
        ConsensusRoundIdentifier::new(1, 2).encode_fields(&mut body);
        digest().encode(&mut body);
        [0u8; 64].as_slice().encode(&mut body);
        let mut encoded = Vec::new();
        write_list(&body, &mut encoded);

        let err = CommitPayload::decode_payload(&mut encoded.as_slice()).unwrap_err();
        assert!(matches!(err, QbftError::MalformedMessage { field: "commit.committed_seal", .. }));
    }
}
