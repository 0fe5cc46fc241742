pub mod bft_message;
pub mod commit;
pub mod prepare;
pub mod prepared_certificate;
pub mod proposal;
pub mod round_change;

pub use bft_message::BftMessage;
pub use commit::Commit;
pub use prepare::Prepare;
pub use prepared_certificate::PreparedCertificate;
pub use proposal::Proposal;
pub use round_change::RoundChange;
