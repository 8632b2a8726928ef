//! Bridging between [`Chain`] and [`bytes::Bytes`].
//!
//! `Bytes` plays the role of a flat rope fragment: converting between the two
//! copies small or fragmented contents and transfers shared ownership of
//! large compact blocks.

use ::bytes::{Bytes, BytesMut};

use crate::{
    block::{Block, MAX_BYTES_TO_COPY},
    chain::Chain,
};

// Keeps a block alive while a `Bytes` created by `Bytes::from_owner` views
// its contents. The window is stable: the block is shared, hence frozen.
struct BlockOwner(Block);

impl AsRef<[u8]> for BlockOwner {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

// A view of `block[offset..offset + length]` sharing ownership: reuses a
// `Bytes` payload when the block wraps one, copies when short, and wraps the
// block handle otherwise.
pub(crate) fn block_to_bytes(block: &Block, offset: usize, length: usize) -> Bytes {
    debug_assert!(offset + length <= block.size());
    if length <= MAX_BYTES_TO_COPY {
        return Bytes::copy_from_slice(&block.as_slice()[offset..offset + length]);
    }
    if let Some(bytes) = block.payload::<Bytes>() {
        let base = block.as_slice().as_ptr() as usize - bytes.as_ptr() as usize;
        return bytes.slice(base + offset..base + offset + length);
    }
    Bytes::from_owner(BlockOwner(block.clone())).slice(offset..offset + length)
}

fn block_into_bytes(block: Block) -> Bytes {
    if block.size() <= MAX_BYTES_TO_COPY {
        return Bytes::copy_from_slice(block.as_slice());
    }
    if let Some(bytes) = block.payload::<Bytes>() {
        let base = block.as_slice().as_ptr() as usize - bytes.as_ptr() as usize;
        return bytes.slice(base..base + block.size());
    }
    Bytes::from_owner(BlockOwner(block))
}

impl Chain {
    /// Converts to a contiguous [`Bytes`]. A single large block is shared,
    /// not copied; fragmented contents are copied, since `Bytes` is flat.
    pub fn to_bytes(&self) -> Bytes {
        if self.is_empty() {
            return Bytes::new();
        }
        if self.num_blocks() == 1 {
            if let Some(block) = self.fragment_block(0) {
                return block_to_bytes(block, 0, block.size());
            }
        }
        let mut bytes = BytesMut::with_capacity(self.len());
        for fragment in self.blocks() {
            bytes.extend_from_slice(fragment);
        }
        bytes.freeze()
    }

    /// Like [`to_bytes`](Self::to_bytes), consuming the chain and its block
    /// reference instead of adding one.
    pub fn into_bytes(mut self) -> Bytes {
        if let Some(block) = self.take_single_block() {
            return block_into_bytes(block);
        }
        self.to_bytes()
    }
}

impl From<Chain> for Bytes {
    fn from(chain: Chain) -> Self {
        chain.into_bytes()
    }
}

impl From<&Chain> for Bytes {
    fn from(chain: &Chain) -> Self {
        chain.to_bytes()
    }
}
