use alloy_primitives::{Address, Bytes, B256};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::QbftError;
use crate::types::{ConsensusRoundIdentifier, QbftBlock, QbftBlockCreator, QbftBlockHeader};

/// Creates an empty block per round, with the round number in `extra_data` so blocks of
/// different rounds hash differently.
#[derive(Debug, Default)]
pub struct MockBlockCreator {
    beneficiary: Address,
    created: AtomicUsize,
    fail: AtomicBool,
}

impl MockBlockCreator {
    pub fn new(beneficiary: Address) -> Self {
        Self { beneficiary, ..Default::default() }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl QbftBlockCreator for MockBlockCreator {
    fn create_block(&self, round: &ConsensusRoundIdentifier) -> Result<QbftBlock, QbftError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(QbftError::BlockCreationError(format!("refusing to build a block for {round}")));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        let header = QbftBlockHeader::new(
            B256::with_last_byte(round.sequence_number.saturating_sub(1) as u8),
            self.beneficiary,
            round.sequence_number,
            1_700_000_000 + round.sequence_number,
            Bytes::copy_from_slice(&round.round_number.to_be_bytes()),
        );
        Ok(QbftBlock::new(header, Vec::new()))
    }
}
