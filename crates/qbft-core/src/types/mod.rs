pub mod bft_helpers;
pub mod block;
pub mod block_creator;
pub mod block_importer;
pub mod consensus_round_identifier;
pub mod header;
pub mod node_key;
pub mod proposer_selector;
pub mod qbft_final_state;
pub mod rlp_signature;
pub mod signed_data;

use std::time::Duration;

pub use bft_helpers::{byzantine_fault_tolerance, quorum_size};
pub use block::{QbftBlock, QbftBlockCodec, RlpBlockCodec};
pub use block_creator::QbftBlockCreator;
pub use block_importer::QbftBlockImporter;
pub use consensus_round_identifier::ConsensusRoundIdentifier;
pub use header::{transactions_root, QbftBlockHeader};
pub use node_key::{address_from_verifying_key, K256NodeKey, NodeKey, Secp256k1Recovery, SignatureRecovery};
pub use proposer_selector::{
    select_proposer, AfterPreviousProposer, HeightRoundRobin, ProposerBaseStrategy, ProposerHistory,
};
pub use qbft_final_state::{QbftFinalState, RoundTimer, ValidatorMulticaster};
pub use rlp_signature::RlpSignature;
pub use signed_data::SignedData;

/// Configuration for the QBFT consensus engine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(default))]
pub struct QbftConfig {
    /// Round 0 timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Timeouts double each round up to `2^max_timeout_exponent` times the base.
    pub max_timeout_exponent: u32,
    /// Messages for heights further ahead than this are dropped instead of buffered. Round
    /// changes for rounds further ahead than this only count towards the early round change.
    pub future_message_max_distance: u64,
    /// Upper bound on buffered future-round and future-height messages.
    pub future_messages_limit: usize,
    /// Jump ahead once f+1 validators announce higher rounds.
    pub early_round_change: bool,
}

impl Default for QbftConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            max_timeout_exponent: 6,
            future_message_max_distance: 10,
            future_messages_limit: 1_000,
            early_round_change: true,
        }
    }
}

impl QbftConfig {
    pub fn round_timeout(&self, round_number: u32) -> Duration {
        let exponent = round_number.min(self.max_timeout_exponent).min(63);
        Duration::from_millis(self.request_timeout_ms.saturating_mul(1u64 << exponent))
    }
}
