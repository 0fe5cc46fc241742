use alloy_primitives::Address;
use std::time::Duration;

use crate::error::QbftError;
use crate::messagedata::QbftMessage;
use crate::types::ConsensusRoundIdentifier;

/// Chain-side view the consensus instance needs: who we are and who validates each height.
pub trait QbftFinalState: Send + Sync {
    fn local_address(&self) -> Address;

    /// Ordered validator set for `height`. The order drives proposer rotation.
    fn validators_for_height(&self, height: u64) -> Result<Vec<Address>, QbftError>;
}

/// One-shot round timeouts. An expiry is reported back to the controller as a
/// [`crate::statemachine::QbftEvent::RoundExpiry`].
pub trait RoundTimer: Send + Sync {
    fn start_timer(&self, round: ConsensusRoundIdentifier, timeout: Duration);
    fn cancel_timer(&self, round: ConsensusRoundIdentifier);
}

/// Outbound message sink. Fire and forget.
pub trait ValidatorMulticaster: Send + Sync {
    fn multicast(&self, message: &QbftMessage);
}
