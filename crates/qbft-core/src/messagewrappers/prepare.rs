use alloy_primitives::{Bytes, B256 as Hash};
use std::ops::Deref;

use crate::error::QbftError;
use crate::messagedata::rlp_helpers::ensure_consumed;
use crate::messagewrappers::bft_message::BftMessage;
use crate::payload::PreparePayload;
use crate::types::SignedData;

/// A QBFT Prepare message. On the wire it is just the signed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepare {
    inner: BftMessage<PreparePayload>,
}

impl Deref for Prepare {
    type Target = BftMessage<PreparePayload>;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Prepare {
    pub fn new(signed_payload: SignedData<PreparePayload>) -> Self {
        Self { inner: BftMessage::new(signed_payload) }
    }

    pub fn digest(&self) -> Hash {
        self.payload().digest
    }

    pub fn into_signed_payload(self) -> SignedData<PreparePayload> {
        self.inner.into_signed_payload()
    }

    pub fn encode(&self) -> Bytes {
        alloy_rlp::encode(self.signed_payload()).into()
    }

    pub fn decode(data: &[u8]) -> Result<Self, QbftError> {
        let mut buf = data;
        let signed_payload = SignedData::decode(&mut buf)?;
        ensure_consumed(buf, "prepare_message")?;
        Ok(Self::new(signed_payload))
    }
}
