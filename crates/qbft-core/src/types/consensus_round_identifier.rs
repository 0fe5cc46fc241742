use alloy_rlp::Encodable;
use std::cmp::Ordering;
use std::fmt;

use crate::error::QbftError;
use crate::messagedata::rlp_helpers::decode_field;

/// Uniquely identifies a specific consensus round for a specific block height.
///
/// Ordered by `sequence_number` first, then `round_number`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConsensusRoundIdentifier {
    /// The block height (sequence number).
    pub sequence_number: u64,
    /// The consensus round number within that height.
    pub round_number: u32,
}

impl ConsensusRoundIdentifier {
    pub fn new(sequence_number: u64, round_number: u32) -> Self {
        Self { sequence_number, round_number }
    }

    /// Whether both identifiers belong to the same consensus instance (same height).
    pub fn is_instance_of(&self, other: &ConsensusRoundIdentifier) -> bool {
        self.sequence_number == other.sequence_number
    }

    /// The identifier of the next round at the same height.
    pub fn next_round(&self) -> Self {
        Self::new(self.sequence_number, self.round_number.saturating_add(1))
    }

    /// Writes the identifier inline, as two scalars, into an enclosing payload list.
    pub(crate) fn encode_fields(&self, out: &mut dyn alloy_rlp::BufMut) {
        self.sequence_number.encode(out);
        self.round_number.encode(out);
    }

    pub(crate) fn fields_length(&self) -> usize {
        self.sequence_number.length() + self.round_number.length()
    }

    pub(crate) fn decode_fields(buf: &mut &[u8]) -> Result<Self, QbftError> {
        let sequence_number = decode_field::<u64>(buf, "round.sequence_number")?;
        let round_number = decode_field::<u32>(buf, "round.round_number")?;
        Ok(Self { sequence_number, round_number })
    }
}

impl Ord for ConsensusRoundIdentifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sequence_number
            .cmp(&other.sequence_number)
            .then(self.round_number.cmp(&other.round_number))
    }
}

impl PartialOrd for ConsensusRoundIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ConsensusRoundIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.sequence_number, self.round_number)
    }
}
