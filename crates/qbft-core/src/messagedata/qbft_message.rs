use alloy_primitives::{Address, Bytes};

use crate::error::QbftError;
use crate::messagedata::qbft_v1;
use crate::messagewrappers::{Commit, Prepare, Proposal, RoundChange};
use crate::types::{ConsensusRoundIdentifier, QbftBlockCodec, SignatureRecovery};

/// Any QBFT message, framed on the wire as `code || rlp(message)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QbftMessage {
    Proposal(Proposal),
    Prepare(Prepare),
    Commit(Commit),
    RoundChange(RoundChange),
}

impl QbftMessage {
    pub fn message_type(&self) -> u8 {
        match self {
            QbftMessage::Proposal(_) => qbft_v1::PROPOSAL,
            QbftMessage::Prepare(_) => qbft_v1::PREPARE,
            QbftMessage::Commit(_) => qbft_v1::COMMIT,
            QbftMessage::RoundChange(_) => qbft_v1::ROUND_CHANGE,
        }
    }

    pub fn name(&self) -> &'static str {
        qbft_v1::message_name(self.message_type())
    }

    pub fn round_identifier(&self) -> &ConsensusRoundIdentifier {
        match self {
            QbftMessage::Proposal(m) => m.round_identifier(),
            QbftMessage::Prepare(m) => m.round_identifier(),
            QbftMessage::Commit(m) => m.round_identifier(),
            QbftMessage::RoundChange(m) => m.round_identifier(),
        }
    }

    pub fn author(&self) -> Result<Address, QbftError> {
        self.author_with(&crate::types::Secp256k1Recovery)
    }

    pub fn author_with(&self, recovery: &dyn SignatureRecovery) -> Result<Address, QbftError> {
        match self {
            QbftMessage::Proposal(m) => m.author_with(recovery),
            QbftMessage::Prepare(m) => m.author_with(recovery),
            QbftMessage::Commit(m) => m.author_with(recovery),
            QbftMessage::RoundChange(m) => m.author_with(recovery),
        }
    }

    pub fn encode(&self, codec: &dyn QbftBlockCodec) -> Bytes {
        let mut out = vec![self.message_type()];
        match self {
            QbftMessage::Proposal(m) => m.encode_to(codec, &mut out),
            QbftMessage::Prepare(m) => out.extend_from_slice(&m.encode()),
            QbftMessage::Commit(m) => out.extend_from_slice(&m.encode()),
            QbftMessage::RoundChange(m) => m.encode_to(codec, &mut out),
        }
        out.into()
    }

    /// Decodes a framed message. Nothing is returned unless the whole frame is well formed.
    pub fn decode(data: &[u8], codec: &dyn QbftBlockCodec) -> Result<Self, QbftError> {
        let (&code, body) = data
            .split_first()
            .ok_or_else(|| QbftError::malformed("message_code", "empty message"))?;
        match code {
            qbft_v1::PROPOSAL => Proposal::decode(body, codec).map(QbftMessage::Proposal),
            qbft_v1::PREPARE => Prepare::decode(body).map(QbftMessage::Prepare),
            qbft_v1::COMMIT => Commit::decode(body).map(QbftMessage::Commit),
            qbft_v1::ROUND_CHANGE => RoundChange::decode(body, codec).map(QbftMessage::RoundChange),
            other => Err(QbftError::InvalidMessageType(other)),
        }
    }

    /// Decodes a frame and recovers the author of every signature it carries.
    ///
    /// Recovery results are memoised on the message, so running this on the receiving peer's
    /// task keeps the expensive work off the consensus intake.
    pub fn decode_authenticated(
        data: &[u8],
        codec: &dyn QbftBlockCodec,
        recovery: &dyn SignatureRecovery,
    ) -> Result<Self, QbftError> {
        let message = Self::decode(data, codec)?;
        message.author_with(recovery)?;
        match &message {
            QbftMessage::Proposal(proposal) => {
                for round_change in proposal.round_change_certificate().unwrap_or_default() {
                    round_change.author_with(recovery)?;
                }
                for prepare in proposal.prepare_certificate().unwrap_or_default() {
                    prepare.author_with(recovery)?;
                }
            }
            QbftMessage::RoundChange(round_change) => {
                for prepare in round_change.prepares() {
                    prepare.author_with(recovery)?;
                }
            }
            QbftMessage::Prepare(_) | QbftMessage::Commit(_) => {}
        }
        Ok(message)
    }
}

impl From<Proposal> for QbftMessage {
    fn from(message: Proposal) -> Self {
        QbftMessage::Proposal(message)
    }
}

impl From<Prepare> for QbftMessage {
    fn from(message: Prepare) -> Self {
        QbftMessage::Prepare(message)
    }
}

impl From<Commit> for QbftMessage {
    fn from(message: Commit) -> Self {
        QbftMessage::Commit(message)
    }
}

impl From<RoundChange> for QbftMessage {
    fn from(message: RoundChange) -> Self {
        QbftMessage::RoundChange(message)
    }
}
