//! Block fetcher: one `eth_getBlockBy*` call per block.

use std::sync::Arc;

use chainstream_core::{Block, BlockId, RpcClient, StreamError};

/// Fetches single blocks and resolves symbolic identifiers to heights.
#[derive(Clone)]
pub struct BlockFetcher {
    client: Arc<RpcClient>,
}

impl BlockFetcher {
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<RpcClient> {
        &self.client
    }

    /// Fetch the block for `id`.
    ///
    /// For a concrete height the node's answer must carry that height; a
    /// different one is treated as a malformed response.
    pub async fn fetch(&self, id: BlockId, full: bool) -> Result<Block, StreamError> {
        let block = self.client.get_block(id, full).await?;
        if let BlockId::Number(expected) = id {
            if block.number != expected {
                return Err(StreamError::decode(
                    "eth_getBlockByNumber",
                    format!("asked for block {expected}, node returned {}", block.number),
                ));
            }
        }
        tracing::trace!(height = block.number, full, "fetched block");
        Ok(block)
    }

    /// Fetch a block by hash; `None` if the node no longer knows it.
    pub async fn fetch_by_hash(
        &self,
        hash: &str,
        full: bool,
    ) -> Result<Option<Block>, StreamError> {
        self.client.get_block_by_hash(hash, full).await
    }

    /// Resolve `id` to a concrete height. Tags cost one fetch.
    pub async fn resolve(&self, id: BlockId) -> Result<u64, StreamError> {
        match id {
            BlockId::Number(n) => Ok(n),
            tag => {
                let height = self.fetch(tag, false).await?.number;
                tracing::debug!(%tag, height, "resolved block tag");
                Ok(height)
            }
        }
    }

    /// Current chain head height (one fetch of `latest`).
    pub async fn head(&self) -> Result<u64, StreamError> {
        self.resolve(BlockId::Latest).await
    }
}
