use alloy_primitives::{Bytes, B256 as Hash};
use std::ops::Deref;

use crate::error::QbftError;
use crate::messagedata::rlp_helpers::ensure_consumed;
use crate::messagewrappers::bft_message::BftMessage;
use crate::payload::CommitPayload;
use crate::types::{RlpSignature, SignedData};

/// A QBFT Commit message. On the wire it is just the signed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    inner: BftMessage<CommitPayload>,
}

impl Deref for Commit {
    type Target = BftMessage<CommitPayload>;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Commit {
    pub fn new(signed_payload: SignedData<CommitPayload>) -> Self {
        Self { inner: BftMessage::new(signed_payload) }
    }

    pub fn digest(&self) -> Hash {
        self.payload().digest
    }

    pub fn committed_seal(&self) -> &RlpSignature {
        &self.payload().committed_seal
    }

    pub fn encode(&self) -> Bytes {
        alloy_rlp::encode(self.signed_payload()).into()
    }

    pub fn decode(data: &[u8]) -> Result<Self, QbftError> {
        let mut buf = data;
        let signed_payload = SignedData::decode(&mut buf)?;
        ensure_consumed(buf, "commit_message")?;
        Ok(Self::new(signed_payload))
    }
}
