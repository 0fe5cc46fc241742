use alloy_primitives::{Address, B256 as Hash};
use thiserror::Error;

/// Errors raised by the QBFT message core.
///
/// Per-message faults (see [`QbftError::is_message_fault`]) are handled where they occur:
/// the offending message is dropped and the round carries on. The remaining variants are
/// configuration or instance level faults and propagate to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QbftError {
    #[error("Malformed message, field `{field}`: {reason}")]
    MalformedMessage { field: &'static str, reason: String },
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Author {author:?} is not a member of the validator set")]
    UnauthorizedAuthor { author: Address },
    #[error("Conflicting prepared blocks at prepared round {prepared_round}: {first:?} vs {second:?}")]
    ConflictingPreparedBlocks { prepared_round: u32, first: Hash, second: Hash },
    #[error("No validators available")]
    EmptyValidatorSet,
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Invalid message type: {0}")]
    InvalidMessageType(u8),
    #[error("Signing error: {0}")]
    SigningError(String),
    #[error("Block creation error: {0}")]
    BlockCreationError(String),
    #[error("Block import error: {0}")]
    BlockImportError(String),
}

impl QbftError {
    pub(crate) fn malformed(field: &'static str, reason: impl std::fmt::Display) -> Self {
        QbftError::MalformedMessage { field, reason: reason.to_string() }
    }

    /// True when the error condemns a single message rather than the consensus instance.
    pub fn is_message_fault(&self) -> bool {
        matches!(
            self,
            QbftError::MalformedMessage { .. }
                | QbftError::InvalidSignature(_)
                | QbftError::UnauthorizedAuthor { .. }
                | QbftError::ValidationError(_)
                | QbftError::InvalidMessageType(_)
        )
    }
}

impl From<k256::ecdsa::Error> for QbftError {
    fn from(err: k256::ecdsa::Error) -> Self {
        QbftError::SigningError(err.to_string())
    }
}
