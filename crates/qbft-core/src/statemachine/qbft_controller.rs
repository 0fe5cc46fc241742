use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::error::QbftError;
use crate::messagedata::QbftMessage;
use crate::statemachine::{QbftBlockHeightManager, QbftServices};
use crate::types::{ConsensusRoundIdentifier, QbftBlockHeader, QbftConfig, QbftFinalState};

/// Input of the consensus intake.
#[derive(Debug, Clone)]
pub enum QbftEvent {
    /// A decoded message from a peer.
    Message(QbftMessage),
    /// The timer of this round ran out.
    RoundExpiry(ConsensusRoundIdentifier),
    /// The chain imported this block, from consensus or from sync.
    NewChainHead(QbftBlockHeader),
}

/// Single mutator of consensus state. Routes events to the manager of the current height,
/// buffers messages for upcoming heights and moves to the next height after a commit.
pub struct QbftController {
    config: Arc<QbftConfig>,
    final_state: Arc<dyn QbftFinalState>,
    services: QbftServices,
    current: Option<QbftBlockHeightManager>,
    future_heights: BTreeMap<u64, Vec<QbftMessage>>,
    buffered: usize,
}

impl QbftController {
    pub fn new(config: Arc<QbftConfig>, final_state: Arc<dyn QbftFinalState>, services: QbftServices) -> Self {
        Self { config, final_state, services, current: None, future_heights: BTreeMap::new(), buffered: 0 }
    }

    pub fn current_height(&self) -> Option<u64> {
        self.current.as_ref().map(QbftBlockHeightManager::height)
    }

    pub fn current_manager(&self) -> Option<&QbftBlockHeightManager> {
        self.current.as_ref()
    }

    /// Number of messages held back for later heights.
    pub fn buffered_messages(&self) -> usize {
        self.buffered
    }

    /// Starts consensus at `height`. Fails if the height has no validators.
    pub fn start(&mut self, height: u64) -> Result<(), QbftError> {
        self.start_height(height)
    }

    pub fn handle_event(&mut self, event: QbftEvent) -> Result<(), QbftError> {
        match event {
            QbftEvent::Message(message) => self.handle_message(message),
            QbftEvent::RoundExpiry(round) => self.handle_round_expiry(round),
            QbftEvent::NewChainHead(header) => self.handle_new_chain_head(&header),
        }
    }

    /// Drains `events` until every sender is gone. Returns early on instance-level errors.
    pub async fn run(mut self, mut events: mpsc::Receiver<QbftEvent>) -> Result<(), QbftError> {
        info!(target: "consensus::qbft::controller", height = ?self.current_height(), "Consensus intake running");
        while let Some(event) = events.recv().await {
            self.handle_event(event)?;
        }
        info!(target: "consensus::qbft::controller", "Consensus intake closed");
        Ok(())
    }

    fn handle_message(&mut self, message: QbftMessage) -> Result<(), QbftError> {
        let sequence = message.round_identifier().sequence_number;
        let Some(manager) = self.current.as_mut() else {
            trace!(target: "consensus::qbft::controller", sequence, "No height running, dropping message");
            return Ok(());
        };
        let height = manager.height();
        match sequence.cmp(&height) {
            Ordering::Less => {
                trace!(target: "consensus::qbft::controller", sequence, height, "Dropping message for a past height");
                Ok(())
            }
            Ordering::Equal => {
                manager.handle_message(message)?;
                if manager.is_committed() {
                    self.start_height(height + 1)?;
                }
                Ok(())
            }
            Ordering::Greater => {
                self.buffer(height, message);
                Ok(())
            }
        }
    }

    fn handle_round_expiry(&mut self, round: ConsensusRoundIdentifier) -> Result<(), QbftError> {
        match self.current.as_mut() {
            Some(manager) if manager.height() == round.sequence_number => manager.round_expired(&round),
            _ => {
                debug!(target: "consensus::qbft::controller", %round, "Ignoring expiry for a height that is not running");
                Ok(())
            }
        }
    }

    fn handle_new_chain_head(&mut self, header: &QbftBlockHeader) -> Result<(), QbftError> {
        let next = header.number.saturating_add(1);
        if self.current_height().is_some_and(|height| height >= next) {
            trace!(target: "consensus::qbft::controller", head = header.number, "Chain head already covered");
            return Ok(());
        }
        info!(target: "consensus::qbft::controller", head = header.number, "Chain advanced, starting next height");
        self.start_height(next)
    }

    fn buffer(&mut self, height: u64, message: QbftMessage) {
        let sequence = message.round_identifier().sequence_number;
        if sequence - height > self.config.future_message_max_distance {
            debug!(target: "consensus::qbft::controller", sequence, height, "Dropping message too far ahead");
            return;
        }
        if let Err(e) = self.check_member(sequence, &message) {
            debug!(target: "consensus::qbft::controller", sequence, error = %e, "Dropping future message");
            return;
        }
        if self.buffered >= self.config.future_messages_limit {
            debug!(target: "consensus::qbft::controller", sequence, "Future height buffer full, dropping");
            return;
        }
        self.future_heights.entry(sequence).or_default().push(message);
        self.buffered += 1;
    }

    /// Author of `message` must be in the validator set of its height.
    fn check_member(&self, sequence: u64, message: &QbftMessage) -> Result<(), QbftError> {
        let author = message.author_with(self.services.recovery.as_ref())?;
        if !self.final_state.validators_for_height(sequence)?.contains(&author) {
            warn!(target: "consensus::qbft::controller", sequence, %author, "Future-height message from non-validator");
            return Err(QbftError::UnauthorizedAuthor { author });
        }
        Ok(())
    }

    /// Starts `height`, replays its buffered messages and keeps moving on while the replay
    /// commits heights.
    fn start_height(&mut self, height: u64) -> Result<(), QbftError> {
        let mut next = Some(height);
        while let Some(height) = next.take() {
            if let Some(previous) = self.current.take() {
                self.services.round_timer.cancel_timer(*previous.current_round());
            }
            let validators = self.final_state.validators_for_height(height)?;
            let mut manager =
                QbftBlockHeightManager::new(height, validators, self.config.clone(), self.services.clone())?;
            info!(
                target: "consensus::qbft::controller",
                height, local = %self.final_state.local_address(), "Starting consensus height"
            );
            manager.start()?;

            for message in self.take_buffered(height) {
                manager.handle_message(message)?;
            }
            if manager.is_committed() {
                next = Some(height + 1);
            }
            self.current = Some(manager);
        }
        Ok(())
    }

    fn take_buffered(&mut self, height: u64) -> Vec<QbftMessage> {
        let mut later = self.future_heights.split_off(&height);
        let ready = later.remove(&height).unwrap_or_default();
        self.future_heights = later;
        self.buffered = self.future_heights.values().map(Vec::len).sum();
        ready
    }
}
