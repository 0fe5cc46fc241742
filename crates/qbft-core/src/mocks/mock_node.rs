use alloy_primitives::Address;
use std::sync::Arc;

use crate::mocks::{test_keys, ManualRoundTimer, MockBlockCreator, MockBlockImporter, RecordingMulticaster};
use crate::payload::MessageFactory;
use crate::statemachine::QbftServices;
use crate::types::{HeightRoundRobin, NodeKey, RlpBlockCodec};

/// One node's recording collaborators, keyed like [`test_keys`].
#[derive(Debug, Clone)]
pub struct TestNode {
    pub factory: Arc<MessageFactory>,
    pub multicaster: Arc<RecordingMulticaster>,
    pub timer: Arc<ManualRoundTimer>,
    pub block_creator: Arc<MockBlockCreator>,
    pub importer: Arc<MockBlockImporter>,
}

impl TestNode {
    pub fn new(index: usize) -> Self {
        let key = test_keys(index + 1).remove(index);
        let address = key.address();
        Self {
            factory: Arc::new(MessageFactory::new(Arc::new(key))),
            multicaster: Arc::default(),
            timer: Arc::default(),
            block_creator: Arc::new(MockBlockCreator::new(address)),
            importer: Arc::default(),
        }
    }

    pub fn address(&self) -> Address {
        self.factory.local_address()
    }

    /// Services with round-robin-by-height proposers and the plain RLP block codec.
    pub fn services(&self) -> QbftServices {
        QbftServices::new(
            self.factory.clone(),
            self.block_creator.clone(),
            self.importer.clone(),
            self.multicaster.clone(),
            self.timer.clone(),
            Arc::new(HeightRoundRobin),
            Arc::new(RlpBlockCodec),
        )
    }
}
