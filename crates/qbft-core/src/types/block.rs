use alloy_primitives::{Bytes, B256 as Hash};
use alloy_rlp::{BufMut, Decodable, Encodable, Header as RlpHeader, RlpDecodable, RlpEncodable};
use std::fmt;
use std::sync::OnceLock;

use crate::types::header::{transactions_root, QbftBlockHeader};

/// A block as seen by the consensus core: a header plus opaque transaction payloads.
///
/// Immutable once built. The header's transactions root always matches the body, so the
/// header hash covers the transactions. The digest is computed at most once per instance.
#[derive(Clone)]
pub struct QbftBlock {
    header: QbftBlockHeader,
    transactions: Vec<Bytes>,
    hash: OnceLock<Hash>,
}

#[derive(RlpEncodable, RlpDecodable)]
struct BlockFields {
    header: QbftBlockHeader,
    transactions: Vec<Bytes>,
}

impl QbftBlock {
    /// Builds a block, sealing `transactions` into the header's transactions root.
    pub fn new(mut header: QbftBlockHeader, transactions: Vec<Bytes>) -> Self {
        header.transactions_root = transactions_root(&transactions);
        Self { header, transactions, hash: OnceLock::new() }
    }

    pub fn header(&self) -> &QbftBlockHeader {
        &self.header
    }

    pub fn transactions(&self) -> &[Bytes] {
        &self.transactions
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// Digest under `codec`. Computed on first use and cached for the life of the instance,
    /// so a node must hash every block with the one codec it validates with.
    pub fn hash_with(&self, codec: &dyn QbftBlockCodec) -> Hash {
        *self.hash.get_or_init(|| codec.block_hash(self))
    }

    /// Digest under [`RlpBlockCodec`].
    pub fn hash(&self) -> Hash {
        self.hash_with(&RlpBlockCodec)
    }
}

impl fmt::Debug for QbftBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QbftBlock")
            .field("number", &self.header.number)
            .field("hash", &self.hash.get())
            .field("transactions", &self.transactions.len())
            .finish()
    }
}

impl PartialEq for QbftBlock {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.transactions == other.transactions
    }
}

impl Eq for QbftBlock {}

impl Encodable for QbftBlock {
    fn encode(&self, out: &mut dyn BufMut) {
        let payload_length = self.header.length() + self.transactions.length();
        RlpHeader { list: true, payload_length }.encode(out);
        self.header.encode(out);
        self.transactions.encode(out);
    }
}

impl Decodable for QbftBlock {
    /// Rejects a body that does not match the header's transactions root.
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let BlockFields { header, transactions } = BlockFields::decode(buf)?;
        if header.transactions_root != transactions_root(&transactions) {
            return Err(alloy_rlp::Error::Custom("transactions do not match the header's transactions root"));
        }
        Ok(Self { header, transactions, hash: OnceLock::new() })
    }
}

/// Encode, decode and hash capability for blocks embedded in consensus messages.
pub trait QbftBlockCodec: Send + Sync + fmt::Debug {
    fn encode_block(&self, block: &QbftBlock, out: &mut dyn BufMut);

    /// Decodes exactly one block, leaving `buf` positioned after it.
    fn decode_block(&self, buf: &mut &[u8]) -> alloy_rlp::Result<QbftBlock>;

    /// Computes the digest validators sign for `block`. Callers go through
    /// [`QbftBlock::hash_with`], which caches it, so this must not call [`QbftBlock::hash`].
    fn block_hash(&self, block: &QbftBlock) -> Hash {
        block.header().hash_slow()
    }
}

/// Plain RLP codec for [`QbftBlock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RlpBlockCodec;

impl QbftBlockCodec for RlpBlockCodec {
    fn encode_block(&self, block: &QbftBlock, out: &mut dyn BufMut) {
        block.encode(out);
    }

    fn decode_block(&self, buf: &mut &[u8]) -> alloy_rlp::Result<QbftBlock> {
        QbftBlock::decode(buf)
    }
}
