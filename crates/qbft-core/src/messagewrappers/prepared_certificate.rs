use alloy_primitives::B256 as Hash;

use crate::payload::{PreparePayload, PreparedRoundMetadata};
use crate::types::{QbftBlock, SignedData};

/// Proof that a block gathered a prepare quorum in `round`. Carried into the next
/// RoundChange so the block survives the round change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCertificate {
    block: QbftBlock,
    digest: Hash,
    prepares: Vec<SignedData<PreparePayload>>,
    round: u32,
}

impl PreparedCertificate {
    /// `digest` is the block digest the prepares signed.
    pub fn new(block: QbftBlock, digest: Hash, prepares: Vec<SignedData<PreparePayload>>, round: u32) -> Self {
        Self { block, digest, prepares, round }
    }

    pub fn block(&self) -> &QbftBlock {
        &self.block
    }

    pub fn digest(&self) -> Hash {
        self.digest
    }

    pub fn prepares(&self) -> &[SignedData<PreparePayload>] {
        &self.prepares
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn metadata(&self) -> PreparedRoundMetadata {
        PreparedRoundMetadata::new(self.digest, self.round)
    }
}
