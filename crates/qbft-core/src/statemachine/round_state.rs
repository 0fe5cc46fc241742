use alloy_primitives::{Address, B256 as Hash};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::QbftError;
use crate::messagewrappers::{Commit, Prepare, PreparedCertificate, Proposal};
use crate::types::{ConsensusRoundIdentifier, QbftBlock, RlpSignature};
use crate::validation::MessageValidator;

/// Messages gathered for one round of one height.
///
/// Prepares and commits that arrive before the proposal are kept once their origin checks
/// out. Accepting the proposal re-checks them against its digest and drops the mismatches.
/// The first message per author wins; a second, different message from the same author is
/// equivocation and only logged.
#[derive(Debug)]
pub struct RoundState {
    round_identifier: ConsensusRoundIdentifier,
    validator: MessageValidator,
    quorum: usize,
    proposal: Option<Proposal>,
    prepares: HashMap<Address, Prepare>,
    commits: HashMap<Address, Commit>,
}

impl RoundState {
    pub fn new(round_identifier: ConsensusRoundIdentifier, validator: MessageValidator, quorum: usize) -> Self {
        Self {
            round_identifier,
            validator,
            quorum,
            proposal: None,
            prepares: HashMap::new(),
            commits: HashMap::new(),
        }
    }

    pub fn round_identifier(&self) -> &ConsensusRoundIdentifier {
        &self.round_identifier
    }

    /// Stores an already validated proposal. Returns false if the round has one already.
    pub fn set_proposal(&mut self, proposal: Proposal) -> bool {
        if let Some(existing) = &self.proposal {
            if existing.digest() != proposal.digest() {
                warn!(
                    target: "consensus::qbft::round",
                    round = %self.round_identifier,
                    first = %existing.digest(),
                    second = %proposal.digest(),
                    "Second proposal for a round with a different block"
                );
            }
            return false;
        }

        let digest = proposal.digest();
        let validator = &self.validator;
        let round = self.round_identifier;
        self.prepares.retain(|author, prepare| {
            let keep = validator.validate_prepare(prepare, digest).is_ok();
            if !keep {
                debug!(target: "consensus::qbft::round", %round, %author, "Dropping early prepare for another block");
            }
            keep
        });
        self.commits.retain(|author, commit| {
            let keep = validator.validate_commit(commit, digest).is_ok();
            if !keep {
                debug!(target: "consensus::qbft::round", %round, %author, "Dropping early commit for another block");
            }
            keep
        });
        self.proposal = Some(proposal);
        true
    }

    pub fn add_prepare(&mut self, prepare: Prepare) -> Result<(), QbftError> {
        let author = match self.proposal_digest() {
            Some(digest) => self.validator.validate_prepare(&prepare, digest)?,
            None => self.validator.validate_origin(prepare.signed_payload())?,
        };
        if let Some(existing) = self.prepares.get(&author) {
            if existing.digest() != prepare.digest() {
                warn!(
                    target: "consensus::qbft::round",
                    round = %self.round_identifier, %author, "Validator sent prepares for two different blocks"
                );
            }
            return Ok(());
        }
        self.prepares.insert(author, prepare);
        Ok(())
    }

    pub fn add_commit(&mut self, commit: Commit) -> Result<(), QbftError> {
        let author = match self.proposal_digest() {
            Some(digest) => self.validator.validate_commit(&commit, digest)?,
            None => self.validator.validate_origin(commit.signed_payload())?,
        };
        if let Some(existing) = self.commits.get(&author) {
            if existing.digest() != commit.digest() {
                warn!(
                    target: "consensus::qbft::round",
                    round = %self.round_identifier, %author, "Validator sent commits for two different blocks"
                );
            }
            return Ok(());
        }
        self.commits.insert(author, commit);
        Ok(())
    }

    pub fn proposal(&self) -> Option<&Proposal> {
        self.proposal.as_ref()
    }

    pub fn proposed_block(&self) -> Option<&QbftBlock> {
        self.proposal.as_ref().map(Proposal::block)
    }

    fn proposal_digest(&self) -> Option<Hash> {
        self.proposal.as_ref().map(Proposal::digest)
    }

    /// A proposal plus a quorum of matching prepares.
    pub fn is_prepared(&self) -> bool {
        self.proposal.is_some() && self.prepares.len() >= self.quorum
    }

    /// A proposal plus a quorum of matching commits.
    pub fn is_committed(&self) -> bool {
        self.proposal.is_some() && self.commits.len() >= self.quorum
    }

    pub fn prepared_certificate(&self) -> Option<PreparedCertificate> {
        if !self.is_prepared() {
            return None;
        }
        let proposal = self.proposal.as_ref()?;
        let prepares = self.prepares.values().map(|prepare| prepare.signed_payload().clone()).collect();
        Some(PreparedCertificate::new(
            proposal.block().clone(),
            proposal.digest(),
            prepares,
            self.round_identifier.round_number,
        ))
    }

    /// Seals of the matching commits, once the round is committed.
    pub fn commit_seals(&self) -> Option<Vec<RlpSignature>> {
        self.is_committed().then(|| self.commits.values().map(|commit| *commit.committed_seal()).collect())
    }
}
