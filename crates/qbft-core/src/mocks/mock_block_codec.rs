use alloy_primitives::B256 as Hash;
use alloy_rlp::BufMut;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::types::{QbftBlock, QbftBlockCodec, RlpBlockCodec};

/// RLP block codec that counts how often it decodes and computes a block digest.
#[derive(Debug, Default)]
pub struct CountingBlockCodec {
    decode_calls: AtomicUsize,
    hash_calls: AtomicUsize,
}

impl CountingBlockCodec {
    pub fn decode_calls(&self) -> usize {
        self.decode_calls.load(Ordering::SeqCst)
    }

    pub fn hash_calls(&self) -> usize {
        self.hash_calls.load(Ordering::SeqCst)
    }
}

impl QbftBlockCodec for CountingBlockCodec {
    fn encode_block(&self, block: &QbftBlock, out: &mut dyn BufMut) {
        RlpBlockCodec.encode_block(block, out)
    }

    fn decode_block(&self, buf: &mut &[u8]) -> alloy_rlp::Result<QbftBlock> {
        self.decode_calls.fetch_add(1, Ordering::SeqCst);
        RlpBlockCodec.decode_block(buf)
    }

    fn block_hash(&self, block: &QbftBlock) -> Hash {
        self.hash_calls.fetch_add(1, Ordering::SeqCst);
        RlpBlockCodec.block_hash(block)
    }
}
