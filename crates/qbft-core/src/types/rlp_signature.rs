use alloy_primitives::{Signature, U256};
use alloy_rlp::{BufMut, Encodable, Header};

use crate::error::QbftError;

/// Width of an encoded recoverable signature: `r (32) || s (32) || recovery id (1)`.
pub const SIGNATURE_LENGTH: usize = 65;

/// A recoverable secp256k1 signature as carried on the wire.
///
/// Encoded as a single 65-byte RLP string. The recovery id byte is 0 or 1; anything else is
/// rejected at decode time. Scalar validity (zero, out of range) is only checked on recovery
/// so a structurally sound but mathematically bogus signature fails there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RlpSignature(pub Signature);

impl RlpSignature {
    pub fn new(signature: Signature) -> Self {
        Self(signature)
    }

    pub fn from_parts(r: U256, s: U256, y_parity: bool) -> Self {
        Self(Signature::new(r, s, y_parity))
    }

    pub fn into_inner(self) -> Signature {
        self.0
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        let mut bytes = [0u8; SIGNATURE_LENGTH];
        bytes[..32].copy_from_slice(&self.0.r().to_be_bytes::<32>());
        bytes[32..64].copy_from_slice(&self.0.s().to_be_bytes::<32>());
        bytes[64] = self.0.v() as u8;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, QbftError> {
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(QbftError::malformed(
                "signature",
                format!("expected {SIGNATURE_LENGTH} bytes, got {}", bytes.len()),
            ));
        }
        let y_parity = match bytes[64] {
            0 => false,
            1 => true,
            other => return Err(QbftError::malformed("signature", format!("invalid recovery id {other}"))),
        };
        Ok(Self::from_parts(
            U256::from_be_slice(&bytes[..32]),
            U256::from_be_slice(&bytes[32..64]),
            y_parity,
        ))
    }

    pub(crate) fn decode_field(buf: &mut &[u8], field: &'static str) -> Result<Self, QbftError> {
        let header = Header::decode(buf).map_err(|e| QbftError::malformed(field, e))?;
        if header.list {
            return Err(QbftError::malformed(field, "expected a byte string"));
        }
        if buf.len() < header.payload_length {
            return Err(QbftError::malformed(field, "length exceeds available input"));
        }
        let (bytes, rest) = buf.split_at(header.payload_length);
        *buf = rest;
        Self::from_bytes(bytes).map_err(|e| match e {
            QbftError::MalformedMessage { reason, .. } => QbftError::MalformedMessage { field, reason },
            other => other,
        })
    }
}

impl std::ops::Deref for RlpSignature {
    type Target = Signature;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Encodable for RlpSignature {
    fn encode(&self, out: &mut dyn BufMut) {
        self.to_bytes().as_slice().encode(out);
    }

    fn length(&self) -> usize {
        Header { list: false, payload_length: SIGNATURE_LENGTH }.length() + SIGNATURE_LENGTH
    }
}

impl From<Signature> for RlpSignature {
    fn from(sig: Signature) -> Self {
        RlpSignature(sig)
    }
}

impl From<RlpSignature> for Signature {
    fn from(rlp_sig: RlpSignature) -> Self {
        rlp_sig.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RlpSignature {
        RlpSignature::from_parts(U256::from(0x1234u64), U256::from(0x5678u64), true)
    }

    #[test]
    fn encodes_as_fixed_width_string() {
        let mut encoded = Vec::new();
        sample().encode(&mut encoded);
        assert_eq!(encoded.len(), sample().length());
        assert_eq!(encoded.len(), 2 + SIGNATURE_LENGTH);

        let decoded = RlpSignature::decode_field(&mut encoded.as_slice(), "signature").unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn rejects_short_signature() {
        let mut encoded = Vec::new();
        sample().to_bytes()[..64].encode(&mut encoded);
        let err = RlpSignature::decode_field(&mut encoded.as_slice(), "commit_seal").unwrap_err();
        assert!(matches!(err, QbftError::MalformedMessage { field: "commit_seal", .. }));
    }

    #[test]
    fn rejects_out_of_range_recovery_id() {
        let mut bytes = sample().to_bytes();
        bytes[64] = 27;
        assert!(RlpSignature::from_bytes(&bytes).is_err());
    }
}
