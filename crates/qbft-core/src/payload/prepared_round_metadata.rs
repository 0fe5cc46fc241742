use alloy_primitives::B256 as Hash;
use alloy_rlp::{RlpDecodable, RlpEncodable};

use crate::error::QbftError;

/// Claim carried in a RoundChange that the author saw a prepare quorum for a block.
///
/// The evidence (the block and the prepares) travels beside the signed payload in
/// [`crate::messagewrappers::RoundChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PreparedRoundMetadata {
    pub prepared_block_hash: Hash,
    pub prepared_round: u32,
}

impl PreparedRoundMetadata {
    pub fn new(prepared_block_hash: Hash, prepared_round: u32) -> Self {
        Self { prepared_block_hash, prepared_round }
    }

    /// Picks the claim with the highest prepared round.
    ///
    /// Claims below the highest round are ignored even if they disagree with each other.
    /// Two claims at the highest round naming different blocks are Byzantine evidence and
    /// reported as [`QbftError::ConflictingPreparedBlocks`].
    pub fn highest<'a>(
        claims: impl IntoIterator<Item = &'a PreparedRoundMetadata> + Clone,
    ) -> Result<Option<PreparedRoundMetadata>, QbftError> {
        let Some(best) = claims.clone().into_iter().max_by_key(|m| m.prepared_round).copied() else {
            return Ok(None);
        };
        if let Some(conflict) = claims
            .into_iter()
            .find(|m| m.prepared_round == best.prepared_round && m.prepared_block_hash != best.prepared_block_hash)
        {
            return Err(QbftError::ConflictingPreparedBlocks {
                prepared_round: best.prepared_round,
                first: best.prepared_block_hash,
                second: conflict.prepared_block_hash,
            });
        }
        Ok(Some(best))
    }
}
