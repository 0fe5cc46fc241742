use alloy_primitives::{keccak256, Address, Bytes, B256 as Hash};
use alloy_rlp::{RlpDecodable, RlpEncodable};

/// Header fields the consensus core needs to reason about a block.
///
/// `transactions_root` commits the header, and so the block hash, to the block body.
/// Execution-level fields are opaque to QBFT and belong in `extra_data` or in the
/// integrating chain's own header type behind a custom [`crate::types::QbftBlockCodec`].
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QbftBlockHeader {
    pub parent_hash: Hash,
    pub beneficiary: Address,
    pub transactions_root: Hash,
    pub number: u64,
    pub timestamp: u64,
    pub extra_data: Bytes,
}

impl QbftBlockHeader {
    /// A header over an empty body. [`crate::types::QbftBlock::new`] reseals the root.
    pub fn new(parent_hash: Hash, beneficiary: Address, number: u64, timestamp: u64, extra_data: Bytes) -> Self {
        Self { parent_hash, beneficiary, transactions_root: transactions_root(&[]), number, timestamp, extra_data }
    }

    /// keccak256 of the RLP-encoded header.
    pub fn hash_slow(&self) -> Hash {
        keccak256(alloy_rlp::encode(self))
    }
}

/// keccak256 of the RLP list of transaction payloads.
pub fn transactions_root(transactions: &[Bytes]) -> Hash {
    keccak256(alloy_rlp::encode(transactions.to_vec()))
}
