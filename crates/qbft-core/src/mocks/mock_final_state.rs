use alloy_primitives::Address;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::QbftError;
use crate::mocks::lock;
use crate::types::{ProposerHistory, QbftFinalState};

/// The same validator set at every height.
#[derive(Debug, Clone)]
pub struct StaticFinalState {
    local_address: Address,
    validators: Vec<Address>,
}

impl StaticFinalState {
    pub fn new(local_address: Address, validators: Vec<Address>) -> Self {
        Self { local_address, validators }
    }
}

impl QbftFinalState for StaticFinalState {
    fn local_address(&self) -> Address {
        self.local_address
    }

    fn validators_for_height(&self, _height: u64) -> Result<Vec<Address>, QbftError> {
        Ok(self.validators.clone())
    }
}

/// Proposer history filled in by the test.
#[derive(Debug, Default)]
pub struct StaticProposerHistory {
    proposers: Mutex<HashMap<u64, Address>>,
}

impl StaticProposerHistory {
    pub fn record(&self, height: u64, proposer: Address) {
        lock(&self.proposers).insert(height, proposer);
    }
}

impl ProposerHistory for StaticProposerHistory {
    fn proposer_of(&self, height: u64) -> Option<Address> {
        lock(&self.proposers).get(&height).copied()
    }
}
