use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::QbftError;
use crate::messagedata::QbftMessage;
use crate::messagewrappers::{Commit, Prepare, Proposal, RoundChange};
use crate::mocks::lock;
use crate::types::{QbftBlock, QbftBlockImporter, RlpSignature, ValidatorMulticaster};

/// Keeps every multicast message in order.
#[derive(Debug, Default)]
pub struct RecordingMulticaster {
    sent: Mutex<Vec<QbftMessage>>,
}

impl RecordingMulticaster {
    pub fn messages(&self) -> Vec<QbftMessage> {
        lock(&self.sent).clone()
    }

    pub fn take(&self) -> Vec<QbftMessage> {
        std::mem::take(&mut *lock(&self.sent))
    }

    pub fn proposals(&self) -> Vec<Proposal> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                QbftMessage::Proposal(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn prepares(&self) -> Vec<Prepare> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                QbftMessage::Prepare(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn commits(&self) -> Vec<Commit> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                QbftMessage::Commit(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn round_changes(&self) -> Vec<RoundChange> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                QbftMessage::RoundChange(rc) => Some(rc),
                _ => None,
            })
            .collect()
    }
}

impl ValidatorMulticaster for RecordingMulticaster {
    fn multicast(&self, message: &QbftMessage) {
        lock(&self.sent).push(message.clone());
    }
}

/// Records imported blocks and their commit seals.
#[derive(Debug, Default)]
pub struct MockBlockImporter {
    imported: Mutex<Vec<(QbftBlock, Vec<RlpSignature>)>>,
    fail: AtomicBool,
}

impl MockBlockImporter {
    pub fn imported(&self) -> Vec<(QbftBlock, Vec<RlpSignature>)> {
        lock(&self.imported).clone()
    }

    pub fn imported_blocks(&self) -> Vec<QbftBlock> {
        lock(&self.imported).iter().map(|(block, _)| block.clone()).collect()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl QbftBlockImporter for MockBlockImporter {
    fn import_block(&self, block: &QbftBlock, commit_seals: &[RlpSignature]) -> Result<(), QbftError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(QbftError::BlockImportError(format!("refusing to import block {}", block.number())));
        }
        lock(&self.imported).push((block.clone(), commit_seals.to_vec()));
        Ok(())
    }
}
