//! Deterministic collaborators for tests.

mod mock_block_codec;
mod mock_block_creator;
mod mock_final_state;
mod mock_node;
mod mock_services;
mod mock_timers;

pub use mock_block_codec::CountingBlockCodec;
pub use mock_block_creator::MockBlockCreator;
pub use mock_final_state::{StaticFinalState, StaticProposerHistory};
pub use mock_node::TestNode;
pub use mock_services::{MockBlockImporter, RecordingMulticaster};
pub use mock_timers::ManualRoundTimer;

use alloy_primitives::{Address, Bytes, B256};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::payload::MessageFactory;
use crate::types::{HeightRoundRobin, K256NodeKey, NodeKey, QbftBlock, QbftBlockHeader, RlpBlockCodec};
use crate::validation::ValidationContext;

/// Keys derived from the secrets `[1; 32]`, `[2; 32]`, ... in that order.
pub fn test_keys(count: usize) -> Vec<K256NodeKey> {
    (1..=count)
        .map(|seed| K256NodeKey::from_slice(&[seed as u8; 32]).expect("small scalars are valid secp256k1 secrets"))
        .collect()
}

pub fn test_validators(count: usize) -> Vec<Address> {
    test_keys(count).iter().map(NodeKey::address).collect()
}

pub fn test_factories(count: usize) -> Vec<MessageFactory> {
    test_keys(count).into_iter().map(|key| MessageFactory::new(Arc::new(key))).collect()
}

/// A block at `number`. Different `salt`s give different hashes.
pub fn test_block(number: u64, salt: u8) -> QbftBlock {
    let header = QbftBlockHeader::new(
        B256::with_last_byte(number as u8),
        Address::ZERO,
        number,
        1_700_000_000 + number,
        Bytes::from(vec![salt]),
    );
    QbftBlock::new(header, vec![Bytes::from_static(b"tx")])
}

/// Validation context over [`test_validators`] with round-robin-by-height proposers.
pub fn test_context(height: u64, validator_count: usize) -> ValidationContext {
    ValidationContext::new(height, test_validators(validator_count), Arc::new(HeightRoundRobin), Arc::new(RlpBlockCodec))
        .expect("test validator set is not empty")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
