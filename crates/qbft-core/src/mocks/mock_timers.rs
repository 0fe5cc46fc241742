use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::mocks::lock;
use crate::types::{ConsensusRoundIdentifier, RoundTimer};

/// Round timer driven by the test: nothing ever fires on its own.
#[derive(Debug, Default)]
pub struct ManualRoundTimer {
    active: Mutex<HashMap<ConsensusRoundIdentifier, Duration>>,
    started: Mutex<Vec<(ConsensusRoundIdentifier, Duration)>>,
}

impl ManualRoundTimer {
    pub fn is_active(&self, round: &ConsensusRoundIdentifier) -> bool {
        lock(&self.active).contains_key(round)
    }

    pub fn active_rounds(&self) -> Vec<ConsensusRoundIdentifier> {
        let mut rounds: Vec<_> = lock(&self.active).keys().copied().collect();
        rounds.sort();
        rounds
    }

    /// Every `start_timer` call, in order.
    pub fn started(&self) -> Vec<(ConsensusRoundIdentifier, Duration)> {
        lock(&self.started).clone()
    }
}

impl RoundTimer for ManualRoundTimer {
    fn start_timer(&self, round: ConsensusRoundIdentifier, timeout: Duration) {
        lock(&self.active).insert(round, timeout);
        lock(&self.started).push((round, timeout));
    }

    fn cancel_timer(&self, round: ConsensusRoundIdentifier) {
        lock(&self.active).remove(&round);
    }
}
