use alloy_primitives::Address;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use crate::error::QbftError;
use crate::messagedata::QbftMessage;
use crate::messagewrappers::{PreparedCertificate, Proposal, RoundChange};
use crate::statemachine::round_change_manager::{RoundChangeCertificate, RoundChangeManager};
use crate::statemachine::round_state::RoundState;
use crate::statemachine::{QbftRound, QbftServices};
use crate::types::{ConsensusRoundIdentifier, QbftConfig};
use crate::validation::{MessageValidator, ProposalValidator, ValidationContext};

/// Where the current round of a height stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QbftPhase {
    /// Waiting for a proposal, or for a prepare quorum on it.
    NewRound,
    /// A prepare quorum was seen and the local commit went out.
    Prepared,
    /// A commit quorum was seen and the block handed to the importer. Final for the height.
    Committed,
    /// The node left its previous round and waits for the new round to be justified.
    RoundChanging,
}

/// Runs consensus for one height: the current round, round changes between rounds, the
/// round timer and the buffer of messages for later rounds.
///
/// Per-message failures are logged and dropped here. Only instance-level errors (an empty
/// validator set, a broken signing key) are returned to the caller.
pub struct QbftBlockHeightManager {
    height: u64,
    config: Arc<QbftConfig>,
    services: QbftServices,
    context: ValidationContext,
    proposal_validator: ProposalValidator,
    round_change_manager: RoundChangeManager,
    local_address: Address,
    participates: bool,
    current_round: QbftRound,
    round_changing: bool,
    latest_prepared: Option<PreparedCertificate>,
    future_messages: BTreeMap<u32, Vec<QbftMessage>>,
    buffered: usize,
}

impl QbftBlockHeightManager {
    pub fn new(
        height: u64,
        validators: Vec<Address>,
        config: Arc<QbftConfig>,
        services: QbftServices,
    ) -> Result<Self, QbftError> {
        let context =
            ValidationContext::new(height, validators, services.proposer_strategy.clone(), services.block_codec.clone())?
                .with_recovery(services.recovery.clone());
        let local_address = services.message_factory.local_address();
        let participates = context.is_validator(&local_address);
        let current_round =
            new_round(&context, &services, participates, ConsensusRoundIdentifier::new(height, 0));
        let max_round_distance = u32::try_from(config.future_message_max_distance).unwrap_or(u32::MAX);

        Ok(Self {
            height,
            config,
            proposal_validator: ProposalValidator::new(context.clone()),
            round_change_manager: RoundChangeManager::new(context.clone(), max_round_distance),
            context,
            services,
            local_address,
            participates,
            current_round,
            round_changing: false,
            latest_prepared: None,
            future_messages: BTreeMap::new(),
            buffered: 0,
        })
    }

    /// Starts round 0: arms its timer and proposes if the local node is the proposer.
    pub fn start(&mut self) -> Result<(), QbftError> {
        let round = *self.current_round.round_identifier();
        info!(
            target: "consensus::qbft::round",
            height = self.height,
            validators = self.context.validators().len(),
            participates = self.participates,
            "Starting height"
        );
        self.services.round_timer.start_timer(round, self.config.round_timeout(0));
        let result = self.propose_if_proposer(None);
        self.absorb("start", round, result)
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn current_round(&self) -> &ConsensusRoundIdentifier {
        self.current_round.round_identifier()
    }

    pub fn phase(&self) -> QbftPhase {
        if self.current_round.is_committed() {
            QbftPhase::Committed
        } else if self.round_changing {
            QbftPhase::RoundChanging
        } else if self.current_round.is_prepared() {
            QbftPhase::Prepared
        } else {
            QbftPhase::NewRound
        }
    }

    pub fn is_committed(&self) -> bool {
        self.current_round.is_committed()
    }

    /// The most recent prepare quorum this node saw at this height.
    pub fn latest_prepared_certificate(&self) -> Option<&PreparedCertificate> {
        self.latest_prepared.as_ref()
    }

    /// Number of messages held back for later rounds.
    pub fn buffered_messages(&self) -> usize {
        self.buffered
    }

    pub fn handle_message(&mut self, message: QbftMessage) -> Result<(), QbftError> {
        let round = *message.round_identifier();
        if round.sequence_number != self.height {
            trace!(target: "consensus::qbft::round", %round, height = self.height, "Ignoring message for another height");
            return Ok(());
        }
        let kind = message.name();
        let result = match message {
            QbftMessage::Proposal(proposal) => self.handle_proposal(proposal),
            QbftMessage::RoundChange(round_change) => self.handle_round_change(round_change),
            QbftMessage::Prepare(_) | QbftMessage::Commit(_) => self.handle_round_message(message),
        };
        self.absorb(kind, round, result)
    }

    /// Timer callback. Expiries of rounds that are no longer current are no-ops.
    pub fn round_expired(&mut self, round: &ConsensusRoundIdentifier) -> Result<(), QbftError> {
        if round != self.current_round.round_identifier() || self.is_committed() {
            debug!(
                target: "consensus::qbft::round",
                expired = %round, current = %self.current_round.round_identifier(), "Ignoring stale round expiry"
            );
            return Ok(());
        }
        info!(target: "consensus::qbft::round", %round, "Round expired");
        let result = self.start_round_change(round.round_number.saturating_add(1));
        self.absorb("round_expiry", *round, result)
    }

    fn handle_proposal(&mut self, proposal: Proposal) -> Result<(), QbftError> {
        let round = *proposal.round_identifier();
        let current = self.current_round.round_identifier().round_number;
        if round.round_number < current || self.is_committed() {
            trace!(target: "consensus::qbft::round", %round, current, "Ignoring proposal for a finished round");
            return Ok(());
        }
        self.proposal_validator.validate(&proposal)?;
        if round.round_number > current {
            info!(target: "consensus::qbft::round", %round, "Valid proposal for a later round, moving to it");
            self.advance_to_round(round.round_number)?;
        }
        self.current_round.accept_proposal(proposal)?;
        self.round_changing = false;
        self.after_progress();
        Ok(())
    }

    fn handle_round_message(&mut self, message: QbftMessage) -> Result<(), QbftError> {
        let round = *message.round_identifier();
        match round.round_number.cmp(&self.current_round.round_identifier().round_number) {
            Ordering::Less => {
                trace!(target: "consensus::qbft::round", %round, kind = message.name(), "Ignoring message for a past round");
                Ok(())
            }
            Ordering::Greater => self.buffer(message),
            Ordering::Equal => {
                match message {
                    QbftMessage::Prepare(prepare) => self.current_round.handle_prepare(prepare)?,
                    QbftMessage::Commit(commit) => self.current_round.handle_commit(commit)?,
                    QbftMessage::Proposal(_) | QbftMessage::RoundChange(_) => {}
                }
                self.after_progress();
                Ok(())
            }
        }
    }

    fn handle_round_change(&mut self, round_change: RoundChange) -> Result<(), QbftError> {
        let target = *round_change.round_identifier();
        let current = self.current_round.round_identifier().round_number;
        if target.round_number < current || self.is_committed() {
            trace!(target: "consensus::qbft::round_change", %target, current, "Ignoring round change for a finished round");
            return Ok(());
        }
        if let Some(certificate) = self.round_change_manager.append(round_change)? {
            return self.on_certificate(certificate);
        }
        if self.config.early_round_change {
            if let Some(early_round) = self.round_change_manager.early_round_target(current) {
                info!(
                    target: "consensus::qbft::round_change",
                    from = current, to = early_round, "f+1 validators are ahead, changing round early"
                );
                return self.start_round_change(early_round);
            }
        }
        Ok(())
    }

    fn on_certificate(&mut self, certificate: RoundChangeCertificate) -> Result<(), QbftError> {
        let round = *certificate.round();
        let current = self.current_round.round_identifier().round_number;
        if round.round_number < current {
            return Ok(());
        }
        info!(
            target: "consensus::qbft::round_change",
            %round,
            round_changes = certificate.round_changes().len(),
            reproposal = certificate.mandatory_block().is_some(),
            "Round-change certificate assembled"
        );
        if round.round_number > current {
            self.advance_to_round(round.round_number)?;
        }
        self.round_changing = false;
        self.propose_if_proposer(Some(certificate))
    }

    /// Leaves the current round for `target_round` and broadcasts the local RoundChange.
    fn start_round_change(&mut self, target_round: u32) -> Result<(), QbftError> {
        self.advance_to_round(target_round)?;
        self.round_changing = true;
        if !self.participates {
            return Ok(());
        }

        let target = *self.current_round.round_identifier();
        let round_change = self.current_round.create_round_change(target, self.latest_prepared.as_ref())?;
        info!(
            target: "consensus::qbft::round_change",
            %target, prepared_round = ?self.latest_prepared.as_ref().map(PreparedCertificate::round), "Sending round change"
        );
        self.services.multicaster.multicast(&QbftMessage::from(round_change.clone()));
        match self.round_change_manager.append(round_change)? {
            Some(certificate) => self.on_certificate(certificate),
            None => Ok(()),
        }
    }

    fn propose_if_proposer(&mut self, certificate: Option<RoundChangeCertificate>) -> Result<(), QbftError> {
        let round = *self.current_round.round_identifier();
        if !self.participates || self.current_round.has_proposal() {
            return Ok(());
        }
        if self.context.expected_proposer(&round)? != self.local_address {
            return Ok(());
        }

        if round.round_number == 0 {
            let block = self.services.block_creator.create_block(&round)?;
            self.current_round.propose(block, Vec::new(), Vec::new())?;
        } else {
            let Some(certificate) = certificate else {
                debug!(target: "consensus::qbft::round", %round, "Local proposer waiting for round-change quorum");
                return Ok(());
            };
            let (round_changes, mandatory_block, prepares) = certificate.into_parts();
            let block = match mandatory_block {
                Some(block) => block,
                None => self.services.block_creator.create_block(&round)?,
            };
            self.current_round.propose(block, round_changes, prepares)?;
        }
        self.round_changing = false;
        self.after_progress();
        Ok(())
    }

    fn advance_to_round(&mut self, round_number: u32) -> Result<(), QbftError> {
        let previous = *self.current_round.round_identifier();
        let round = ConsensusRoundIdentifier::new(self.height, round_number);
        self.services.round_timer.cancel_timer(previous);
        self.current_round = new_round(&self.context, &self.services, self.participates, round);
        self.services.round_timer.start_timer(round, self.config.round_timeout(round_number));
        self.round_change_manager.discard_rounds_before(round_number);
        debug!(target: "consensus::qbft::round", from = %previous, to = %round, "Moved to round");
        self.replay_buffered(round_number)
    }

    fn after_progress(&mut self) {
        let round_number = self.current_round.round_identifier().round_number;
        let recorded = self.latest_prepared.as_ref().map(PreparedCertificate::round);
        if self.current_round.is_prepared() && recorded != Some(round_number) {
            self.latest_prepared = self.current_round.prepared_certificate();
        }
        if self.current_round.is_committed() {
            self.services.round_timer.cancel_timer(*self.current_round.round_identifier());
        }
    }

    /// Holds a later-round message. Only validators get a share of the buffer.
    fn buffer(&mut self, message: QbftMessage) -> Result<(), QbftError> {
        let round = *message.round_identifier();
        let author = message.author_with(self.context.recovery())?;
        if !self.context.is_validator(&author) {
            warn!(target: "consensus::qbft::round", %round, %author, "Future-round message from non-validator");
            return Err(QbftError::UnauthorizedAuthor { author });
        }
        if self.buffered >= self.config.future_messages_limit {
            debug!(target: "consensus::qbft::round", %round, kind = message.name(), "Future message buffer full, dropping");
            return Ok(());
        }
        trace!(target: "consensus::qbft::round", %round, kind = message.name(), %author, "Buffering message for a later round");
        self.future_messages.entry(round.round_number).or_default().push(message);
        self.buffered += 1;
        Ok(())
    }

    /// Replays messages buffered for `round_number` and drops those for earlier rounds.
    fn replay_buffered(&mut self, round_number: u32) -> Result<(), QbftError> {
        let mut later = self.future_messages.split_off(&round_number);
        let ready = later.remove(&round_number).unwrap_or_default();
        self.future_messages = later;
        self.buffered = self.future_messages.values().map(Vec::len).sum();

        for message in ready {
            let round = *message.round_identifier();
            let kind = message.name();
            let result = self.handle_round_message(message);
            self.absorb(kind, round, result)?;
        }
        Ok(())
    }

    fn absorb(
        &self,
        kind: &'static str,
        round: ConsensusRoundIdentifier,
        result: Result<(), QbftError>,
    ) -> Result<(), QbftError> {
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_message_fault() => {
                debug!(target: "consensus::qbft::round", kind, %round, error = %e, "Dropping message");
                Ok(())
            }
            Err(e @ QbftError::ConflictingPreparedBlocks { .. }) => {
                warn!(target: "consensus::qbft::round_change", kind, %round, error = %e, "Waiting for more round changes");
                Ok(())
            }
            Err(e @ (QbftError::BlockCreationError(_) | QbftError::BlockImportError(_))) => {
                error!(target: "consensus::qbft::round", kind, %round, error = %e, "Block handling failed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn new_round(
    context: &ValidationContext,
    services: &QbftServices,
    participates: bool,
    round: ConsensusRoundIdentifier,
) -> QbftRound {
    let state = RoundState::new(round, MessageValidator::new(context.clone(), round), context.quorum());
    QbftRound::new(
        state,
        services.message_factory.clone(),
        services.multicaster.clone(),
        services.block_importer.clone(),
        participates,
    )
}
