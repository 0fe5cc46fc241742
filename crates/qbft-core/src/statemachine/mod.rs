pub mod qbft_block_height_manager;
pub mod qbft_controller;
pub mod qbft_round;
pub mod round_change_manager;
pub mod round_state;
pub mod round_timer;

use std::fmt;
use std::sync::Arc;

use crate::payload::MessageFactory;
use crate::types::{
    ProposerBaseStrategy, QbftBlockCodec, QbftBlockCreator, QbftBlockImporter, RoundTimer, Secp256k1Recovery,
    SignatureRecovery, ValidatorMulticaster,
};

pub use qbft_block_height_manager::{QbftBlockHeightManager, QbftPhase};
pub use qbft_controller::{QbftController, QbftEvent};
pub use qbft_round::QbftRound;
pub use round_change_manager::{RoundChangeCertificate, RoundChangeManager};
pub use round_state::RoundState;
pub use round_timer::TokioRoundTimer;

/// Collaborators shared by every height the node runs.
#[derive(Clone)]
pub struct QbftServices {
    pub message_factory: Arc<MessageFactory>,
    pub block_creator: Arc<dyn QbftBlockCreator>,
    pub block_importer: Arc<dyn QbftBlockImporter>,
    pub multicaster: Arc<dyn ValidatorMulticaster>,
    pub round_timer: Arc<dyn RoundTimer>,
    pub proposer_strategy: Arc<dyn ProposerBaseStrategy>,
    pub block_codec: Arc<dyn QbftBlockCodec>,
    pub recovery: Arc<dyn SignatureRecovery>,
}

impl QbftServices {
    /// Uses secp256k1 recovery for message authors. `message_factory` is rebound to
    /// `block_codec` so the digests it signs are the ones peers check.
    pub fn new(
        message_factory: Arc<MessageFactory>,
        block_creator: Arc<dyn QbftBlockCreator>,
        block_importer: Arc<dyn QbftBlockImporter>,
        multicaster: Arc<dyn ValidatorMulticaster>,
        round_timer: Arc<dyn RoundTimer>,
        proposer_strategy: Arc<dyn ProposerBaseStrategy>,
        block_codec: Arc<dyn QbftBlockCodec>,
    ) -> Self {
        let message_factory = Arc::new(message_factory.as_ref().clone().with_block_codec(block_codec.clone()));
        Self {
            message_factory,
            block_creator,
            block_importer,
            multicaster,
            round_timer,
            proposer_strategy,
            block_codec,
            recovery: Arc::new(Secp256k1Recovery),
        }
    }
}

impl fmt::Debug for QbftServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QbftServices")
            .field("local_address", &self.message_factory.local_address())
            .field("proposer_strategy", &self.proposer_strategy)
            .field("block_codec", &self.block_codec)
            .finish_non_exhaustive()
    }
}
