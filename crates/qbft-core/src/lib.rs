//! Message-level core of QBFT, a round-based Byzantine fault tolerant block agreement
//! protocol for a known validator set.
//!
//! [`payload`] and [`messagewrappers`] define the four signed messages and their RLP wire
//! form, [`validation`] checks them against a height's validator set and [`statemachine`]
//! drives rounds, round changes and heights from a single ordered intake.

pub mod error;
pub mod messagedata;
pub mod messagewrappers;
pub mod payload;
pub mod statemachine;
pub mod types;
pub mod validation;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use error::QbftError;
pub use messagedata::QbftMessage;
pub use statemachine::{QbftController, QbftEvent, QbftServices};
pub use types::{ConsensusRoundIdentifier, QbftConfig};
