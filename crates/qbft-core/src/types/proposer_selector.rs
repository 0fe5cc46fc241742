use alloy_primitives::Address;
use std::fmt;

use crate::error::QbftError;
use crate::types::ConsensusRoundIdentifier;

/// Chooses the validator index that proposes round 0 of a height. Later rounds rotate from it.
pub trait ProposerBaseStrategy: Send + Sync + fmt::Debug {
    fn base_index(&self, height: u64, validators: &[Address]) -> usize;
}

/// Base index is `height mod N`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeightRoundRobin;

impl ProposerBaseStrategy for HeightRoundRobin {
    fn base_index(&self, height: u64, validators: &[Address]) -> usize {
        if validators.is_empty() {
            return 0;
        }
        (height % validators.len() as u64) as usize
    }
}

/// Looks up who proposed an already finalised block.
pub trait ProposerHistory: Send + Sync {
    fn proposer_of(&self, height: u64) -> Option<Address>;
}

/// Base index is the validator following the proposer of the previous block.
///
/// Falls back to index 0 at genesis, when the previous proposer is unknown, or when it has
/// left the validator set.
pub struct AfterPreviousProposer<H> {
    history: H,
}

impl<H: ProposerHistory> AfterPreviousProposer<H> {
    pub fn new(history: H) -> Self {
        Self { history }
    }
}

impl<H> fmt::Debug for AfterPreviousProposer<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AfterPreviousProposer").finish_non_exhaustive()
    }
}

impl<H: ProposerHistory> ProposerBaseStrategy for AfterPreviousProposer<H> {
    fn base_index(&self, height: u64, validators: &[Address]) -> usize {
        let Some(previous_height) = height.checked_sub(1) else { return 0 };
        self.history
            .proposer_of(previous_height)
            .and_then(|previous| validators.iter().position(|v| *v == previous))
            .map_or(0, |index| index + 1)
    }
}

/// `validators[(base_index(height) + round) mod N]`.
pub fn select_proposer(
    round: &ConsensusRoundIdentifier,
    validators: &[Address],
    strategy: &dyn ProposerBaseStrategy,
) -> Result<Address, QbftError> {
    if validators.is_empty() {
        return Err(QbftError::EmptyValidatorSet);
    }
    let len = validators.len() as u64;
    let base = strategy.base_index(round.sequence_number, validators) as u64 % len;
    let index = (base + u64::from(round.round_number) % len) % len;
    Ok(validators[index as usize])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::StaticProposerHistory;

    fn validators(n: u8) -> Vec<Address> {
        (1..=n).map(|i| Address::from([i; 20])).collect()
    }

    #[test]
    fn rotates_with_round() {
        let set = validators(4);
        let picks: Vec<_> = (0..6)
            .map(|r| select_proposer(&ConsensusRoundIdentifier::new(8, r), &set, &HeightRoundRobin).unwrap())
            .collect();
        assert_eq!(picks, vec![set[0], set[1], set[2], set[3], set[0], set[1]]);
    }

    #[test]
    fn selection_is_deterministic() {
        let set = validators(7);
        let round = ConsensusRoundIdentifier::new(12_345, u32::MAX);
        let first = select_proposer(&round, &set, &HeightRoundRobin).unwrap();
        for _ in 0..10 {
            assert_eq!(select_proposer(&round, &set, &HeightRoundRobin).unwrap(), first);
        }
    }

    #[test]
    fn empty_validator_set_is_an_error() {
        let err = select_proposer(&ConsensusRoundIdentifier::new(1, 0), &[], &HeightRoundRobin).unwrap_err();
        assert_eq!(err, QbftError::EmptyValidatorSet);
    }

    #[test]
    fn follows_previous_proposer() {
        let set = validators(4);
        let history = StaticProposerHistory::default();
        history.record(4, set[3]);
        history.record(5, Address::ZERO);
        let strategy = AfterPreviousProposer::new(history);

        assert_eq!(select_proposer(&ConsensusRoundIdentifier::new(5, 0), &set, &strategy).unwrap(), set[0]);
        assert_eq!(select_proposer(&ConsensusRoundIdentifier::new(5, 2), &set, &strategy).unwrap(), set[2]);
        assert_eq!(select_proposer(&ConsensusRoundIdentifier::new(6, 0), &set, &strategy).unwrap(), set[0]);
        assert_eq!(select_proposer(&ConsensusRoundIdentifier::new(0, 1), &set, &strategy).unwrap(), set[1]);
    }
}
