//! In-memory [`ChainRpc`] double for tests, grounded on `cory-core`'s
//! `MockRpc::builder()` pattern: register canned blocks up front, then hand
//! the mock to an `Indexer` instance.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::IndexerError;
use crate::key_codec::BlockId;
use crate::rpc::ChainRpc;
use crate::types::BlockBody;

pub struct MockChainRpc {
    blocks_by_id: HashMap<BlockId, BlockBody>,
    ids_by_height: HashMap<u32, BlockId>,
}

impl MockChainRpc {
    pub fn builder() -> MockChainRpcBuilder {
        MockChainRpcBuilder { blocks_by_id: HashMap::new(), ids_by_height: HashMap::new() }
    }
}

pub struct MockChainRpcBuilder {
    blocks_by_id: HashMap<BlockId, BlockBody>,
    ids_by_height: HashMap<u32, BlockId>,
}

impl MockChainRpcBuilder {
    /// Register a block, keyed by its `block_id` and `height`.
    pub fn with_block(mut self, block: BlockBody) -> Self {
        self.ids_by_height.insert(block.height, block.block_id);
        self.blocks_by_id.insert(block.block_id, block);
        self
    }

    pub fn build(self) -> MockChainRpc {
        MockChainRpc { blocks_by_id: self.blocks_by_id, ids_by_height: self.ids_by_height }
    }
}

#[async_trait]
impl ChainRpc for MockChainRpc {
    async fn block(&self, block_id: &BlockId) -> Result<BlockBody, IndexerError> {
        self.blocks_by_id
            .get(block_id)
            .cloned()
            .ok_or_else(|| IndexerError::rpc("block", format!("no such block: {}", hex::encode(block_id))))
    }

    async fn block_id_at_height(&self, height: u32) -> Result<BlockId, IndexerError> {
        self.ids_by_height
            .get(&height)
            .copied()
            .ok_or_else(|| IndexerError::rpc("block_id_at_height", format!("no block at height {}", height)))
    }
}
