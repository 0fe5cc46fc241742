//! Message codes of QBFT version 1. The code is the first byte of every framed message.

pub const PROPOSAL: u8 = 0x00;
pub const PREPARE: u8 = 0x01;
pub const COMMIT: u8 = 0x02;
pub const ROUND_CHANGE: u8 = 0x03;

pub fn message_name(code: u8) -> &'static str {
    match code {
        PROPOSAL => "Proposal",
        PREPARE => "Prepare",
        COMMIT => "Commit",
        ROUND_CHANGE => "RoundChange",
        _ => "Unknown",
    }
}
