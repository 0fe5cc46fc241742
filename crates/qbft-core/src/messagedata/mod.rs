pub mod qbft_message;
pub mod qbft_v1;
pub(crate) mod rlp_helpers;

pub use qbft_message::QbftMessage;
