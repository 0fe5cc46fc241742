use alloy_primitives::Address;

use crate::error::QbftError;
use crate::payload::QbftPayload;
use crate::types::{ConsensusRoundIdentifier, SignatureRecovery, SignedData};

/// Common part of every QBFT message: the author-signed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BftMessage<P: QbftPayload> {
    signed_payload: SignedData<P>,
}

impl<P: QbftPayload> BftMessage<P> {
    pub fn new(signed_payload: SignedData<P>) -> Self {
        Self { signed_payload }
    }

    pub fn signed_payload(&self) -> &SignedData<P> {
        &self.signed_payload
    }

    pub fn into_signed_payload(self) -> SignedData<P> {
        self.signed_payload
    }

    pub fn author(&self) -> Result<Address, QbftError> {
        self.signed_payload.author()
    }

    pub fn author_with(&self, recovery: &dyn SignatureRecovery) -> Result<Address, QbftError> {
        self.signed_payload.author_with(recovery)
    }

    pub fn payload(&self) -> &P {
        self.signed_payload.payload()
    }

    pub fn round_identifier(&self) -> &ConsensusRoundIdentifier {
        self.payload().round_identifier()
    }

    pub fn message_type(&self) -> u8 {
        self.payload().message_type()
    }
}
