use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::error::QbftError;
use crate::messagedata::QbftMessage;
use crate::messagewrappers::{Commit, Prepare, PreparedCertificate, Proposal, RoundChange};
use crate::payload::{MessageFactory, PreparePayload, RoundChangePayload};
use crate::statemachine::round_state::RoundState;
use crate::types::{ConsensusRoundIdentifier, QbftBlock, QbftBlockImporter, SignedData, ValidatorMulticaster};

/// Drives one round: answers the proposal with a Prepare, sends a Commit once prepared and
/// imports the block once committed.
///
/// Proposals reaching this type are already validated. Prepares and commits are validated
/// by the [`RoundState`].
pub struct QbftRound {
    state: RoundState,
    message_factory: Arc<MessageFactory>,
    multicaster: Arc<dyn ValidatorMulticaster>,
    block_importer: Arc<dyn QbftBlockImporter>,
    /// Whether the local node is in the validator set and sends its own messages.
    participates: bool,
    commit_sent: bool,
    imported: bool,
}

impl QbftRound {
    pub fn new(
        state: RoundState,
        message_factory: Arc<MessageFactory>,
        multicaster: Arc<dyn ValidatorMulticaster>,
        block_importer: Arc<dyn QbftBlockImporter>,
        participates: bool,
    ) -> Self {
        Self { state, message_factory, multicaster, block_importer, participates, commit_sent: false, imported: false }
    }

    pub fn round_identifier(&self) -> &ConsensusRoundIdentifier {
        self.state.round_identifier()
    }

    pub fn has_proposal(&self) -> bool {
        self.state.proposal().is_some()
    }

    pub fn is_prepared(&self) -> bool {
        self.state.is_prepared()
    }

    pub fn is_committed(&self) -> bool {
        self.state.is_committed()
    }

    pub fn proposed_block(&self) -> Option<&QbftBlock> {
        self.state.proposed_block()
    }

    pub fn prepared_certificate(&self) -> Option<PreparedCertificate> {
        self.state.prepared_certificate()
    }

    /// Signs and broadcasts a proposal for this round, then treats it as received.
    pub fn propose(
        &mut self,
        block: QbftBlock,
        round_changes: Vec<SignedData<RoundChangePayload>>,
        prepares: Vec<SignedData<PreparePayload>>,
    ) -> Result<(), QbftError> {
        let round = *self.round_identifier();
        let proposal = self.message_factory.create_proposal(round, block, round_changes, prepares)?;
        info!(
            target: "consensus::qbft::round",
            %round, block = %proposal.digest(), reproposal = proposal.prepare_certificate().is_some(), "Proposing block"
        );
        self.multicaster.multicast(&QbftMessage::from(proposal.clone()));
        self.accept_proposal(proposal)
    }

    /// Takes a validated proposal. A second proposal for the round is ignored.
    pub fn accept_proposal(&mut self, proposal: Proposal) -> Result<(), QbftError> {
        let round = *self.round_identifier();
        let digest = proposal.digest();
        if !self.state.set_proposal(proposal) {
            debug!(target: "consensus::qbft::round", %round, %digest, "Round already has a proposal");
            return Ok(());
        }
        debug!(target: "consensus::qbft::round", %round, %digest, "Accepted proposal");

        if self.participates {
            let prepare = self.message_factory.create_prepare(round, digest)?;
            trace!(target: "consensus::qbft::round", %round, %digest, "Sending prepare");
            self.multicaster.multicast(&QbftMessage::from(prepare.clone()));
            self.state.add_prepare(prepare)?;
        }
        self.progress()
    }

    pub fn handle_prepare(&mut self, prepare: Prepare) -> Result<(), QbftError> {
        self.state.add_prepare(prepare)?;
        self.progress()
    }

    pub fn handle_commit(&mut self, commit: Commit) -> Result<(), QbftError> {
        self.state.add_commit(commit)?;
        self.progress()
    }

    /// Signs a RoundChange away from this round, carrying `prepared` when the node has one.
    pub fn create_round_change(
        &self,
        target: ConsensusRoundIdentifier,
        prepared: Option<&PreparedCertificate>,
    ) -> Result<RoundChange, QbftError> {
        self.message_factory.create_round_change(target, prepared)
    }

    fn progress(&mut self) -> Result<(), QbftError> {
        let round = *self.round_identifier();
        if self.participates && !self.commit_sent && self.state.is_prepared() {
            if let Some(digest) = self.state.proposal().map(Proposal::digest) {
                let commit = self.message_factory.create_commit(round, digest)?;
                self.commit_sent = true;
                debug!(target: "consensus::qbft::round", %round, %digest, "Prepared, sending commit");
                self.multicaster.multicast(&QbftMessage::from(commit.clone()));
                self.state.add_commit(commit)?;
            }
        }

        if self.imported {
            return Ok(());
        }
        let (Some(seals), Some(proposal)) = (self.state.commit_seals(), self.state.proposal()) else {
            return Ok(());
        };
        self.imported = true;
        let block = proposal.block();
        info!(
            target: "consensus::qbft::round",
            %round, number = block.number(), hash = %proposal.digest(), seals = seals.len(), "Committed, importing block"
        );
        self.block_importer.import_block(block, &seals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{test_block, test_context, test_factories, MockBlockImporter, RecordingMulticaster};
    use crate::validation::MessageValidator;

    const HEIGHT: u64 = 1;

    struct Harness {
        round: QbftRound,
        multicaster: Arc<RecordingMulticaster>,
        importer: Arc<MockBlockImporter>,
        factories: Vec<MessageFactory>,
    }

    fn harness(local: usize, participates: bool) -> Harness {
        let factories = test_factories(4);
        let context = test_context(HEIGHT, 4);
        let round_id = ConsensusRoundIdentifier::new(HEIGHT, 0);
        let state = RoundState::new(round_id, MessageValidator::new(context.clone(), round_id), context.quorum());
        let multicaster = Arc::new(RecordingMulticaster::default());
        let importer = Arc::new(MockBlockImporter::default());
        let round = QbftRound::new(
            state,
            Arc::new(factories[local].clone()),
            multicaster.clone(),
            importer.clone(),
            participates,
        );
        Harness { round, multicaster, importer, factories }
    }

    #[test]
    fn runs_a_round_to_import() {
        let mut h = harness(0, true);
        let round = *h.round.round_identifier();
        let block = test_block(HEIGHT, 0);
        let digest = block.hash();
        let proposal = h.factories[1].create_proposal(round, block.clone(), Vec::new(), Vec::new()).unwrap();

        h.round.accept_proposal(proposal).unwrap();
        assert_eq!(h.multicaster.prepares().len(), 1);

        h.round.handle_prepare(h.factories[1].create_prepare(round, digest).unwrap()).unwrap();
        assert!(h.multicaster.commits().is_empty());
        h.round.handle_prepare(h.factories[2].create_prepare(round, digest).unwrap()).unwrap();
        assert!(h.round.is_prepared());
        assert_eq!(h.multicaster.commits().len(), 1);
        assert_eq!(h.round.prepared_certificate().unwrap().block(), &block);

        h.round.handle_commit(h.factories[1].create_commit(round, digest).unwrap()).unwrap();
        assert!(h.importer.imported().is_empty());
        h.round.handle_commit(h.factories[3].create_commit(round, digest).unwrap()).unwrap();
        h.round.handle_commit(h.factories[2].create_commit(round, digest).unwrap()).unwrap();

        let imported = h.importer.imported();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].0, block);
        assert_eq!(imported[0].1.len(), 3);
        assert_eq!(h.multicaster.commits().len(), 1);
    }

    #[test]
    fn proposer_broadcasts_proposal_and_prepare() {
        let mut h = harness(1, true);
        h.round.propose(test_block(HEIGHT, 0), Vec::new(), Vec::new()).unwrap();

        assert_eq!(h.multicaster.proposals().len(), 1);
        assert_eq!(h.multicaster.prepares().len(), 1);
        assert!(h.round.has_proposal());
    }

    #[test]
    fn observer_sends_nothing() {
        let mut h = harness(0, false);
        let round = *h.round.round_identifier();
        let block = test_block(HEIGHT, 0);
        let proposal = h.factories[1].create_proposal(round, block.clone(), Vec::new(), Vec::new()).unwrap();
        h.round.accept_proposal(proposal).unwrap();
        for factory in &h.factories[1..] {
            h.round.handle_prepare(factory.create_prepare(round, block.hash()).unwrap()).unwrap();
        }

        assert!(h.round.is_prepared());
        assert!(h.multicaster.messages().is_empty());
    }
}
