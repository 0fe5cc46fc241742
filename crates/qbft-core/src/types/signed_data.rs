use alloy_primitives::Address;
use alloy_rlp::{BufMut, Encodable};
use std::sync::OnceLock;

use crate::error::QbftError;
use crate::messagedata::rlp_helpers::{ensure_consumed, take_list, write_list};
use crate::payload::QbftPayload;
use crate::types::{NodeKey, RlpSignature, Secp256k1Recovery, SignatureRecovery};

/// A payload bound to its author's recoverable signature.
///
/// The author is never carried on the wire. It is recovered from the signature over the
/// payload's signing hash the first time it is asked for and memoised, including a failed
/// recovery: once a signature has been found unrecoverable every later call returns the same
/// error.
#[derive(Debug, Clone)]
pub struct SignedData<P: QbftPayload> {
    payload: P,
    signature: RlpSignature,
    author: OnceLock<Result<Address, QbftError>>,
}

impl<P: QbftPayload> SignedData<P> {
    pub fn new(payload: P, signature: RlpSignature) -> Self {
        Self { payload, signature, author: OnceLock::new() }
    }

    /// Signs `payload` with the node key.
    ///
    /// The signer's address is known up front, so the author cache is seeded with it.
    pub fn create(payload: P, node_key: &dyn NodeKey) -> Result<Self, QbftError> {
        let signature = node_key.sign_hash(payload.hash_for_signature())?;
        let signed = Self::new(payload, signature);
        let _ = signed.author.set(Ok(node_key.address()));
        Ok(signed)
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn signature(&self) -> &RlpSignature {
        &self.signature
    }

    /// Recovers the author with secp256k1 public-key recovery.
    pub fn author(&self) -> Result<Address, QbftError> {
        self.author_with(&Secp256k1Recovery)
    }

    /// Recovers the author with the supplied capability. Only the first call performs recovery.
    pub fn author_with(&self, recovery: &dyn SignatureRecovery) -> Result<Address, QbftError> {
        self.author
            .get_or_init(|| recovery.recover_address(self.payload.hash_for_signature(), &self.signature))
            .clone()
    }

    pub fn decode(buf: &mut &[u8]) -> Result<Self, QbftError> {
        let mut body = take_list(buf, "signed_payload")?;
        let payload = P::decode_payload(&mut body)?;
        let signature = RlpSignature::decode_field(&mut body, "signature")?;
        ensure_consumed(body, "signed_payload")?;
        Ok(Self::new(payload, signature))
    }
}

impl<P: QbftPayload> PartialEq for SignedData<P> {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload && self.signature == other.signature
    }
}

impl<P: QbftPayload> Eq for SignedData<P> {}

impl<P: QbftPayload> Encodable for SignedData<P> {
    fn encode(&self, out: &mut dyn BufMut) {
        let mut body = Vec::with_capacity(self.payload.length() + self.signature.length());
        self.payload.encode(&mut body);
        self.signature.encode(&mut body);
        write_list(&body, out);
    }
}
