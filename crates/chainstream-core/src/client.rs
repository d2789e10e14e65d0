//! Typed JSON-RPC client: builds requests for the methods the streaming
//! layer needs and decodes their responses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::{StreamError, TransportError};
use crate::request::JsonRpcRequest;
use crate::transport::RpcTransport;
use crate::types::{quantity, Block, BlockId, FilterId, Log, LogFilter, Transaction};

/// JSON-RPC client over any [`RpcTransport`].
///
/// Cheap to share behind an `Arc`; request ids are allocated atomically.
pub struct RpcClient {
    transport: Arc<dyn RpcTransport>,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    /// The underlying transport's identifier.
    pub fn url(&self) -> &str {
        self.transport.url()
    }

    /// Call `method` and decode its result as `T`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, StreamError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(id, method, url = self.transport.url(), "rpc request");
        let resp = self
            .transport
            .send(JsonRpcRequest::new(id, method, params))
            .await?;
        let result = resp.into_result().map_err(TransportError::Rpc)?;
        serde_json::from_value(result).map_err(|e| StreamError::decode(method, e))
    }

    /// `eth_blockNumber`.
    pub async fn block_number(&self) -> Result<u64, StreamError> {
        let raw: String = self.request("eth_blockNumber", vec![]).await?;
        quantity::parse(&raw).map_err(|e| StreamError::decode("eth_blockNumber", e))
    }

    /// `eth_getBlockByNumber`; a `null` result is [`StreamError::BlockNotFound`].
    pub async fn get_block(&self, id: BlockId, full: bool) -> Result<Block, StreamError> {
        let block: Option<Block> = self
            .request("eth_getBlockByNumber", vec![id.to_param(), json!(full)])
            .await?;
        block.ok_or(StreamError::BlockNotFound(id))
    }

    /// `eth_getBlockByHash`; `None` when the node no longer knows the hash.
    pub async fn get_block_by_hash(
        &self,
        hash: &str,
        full: bool,
    ) -> Result<Option<Block>, StreamError> {
        self.request("eth_getBlockByHash", vec![json!(hash), json!(full)])
            .await
    }

    /// `eth_getTransactionByHash`; `None` when the transaction is unknown.
    pub async fn get_transaction_by_hash(
        &self,
        hash: &str,
    ) -> Result<Option<Transaction>, StreamError> {
        self.request("eth_getTransactionByHash", vec![json!(hash)])
            .await
    }

    /// `eth_getTransactionCount`: the account nonce at `block`.
    pub async fn get_transaction_count(
        &self,
        address: &str,
        block: BlockId,
    ) -> Result<u64, StreamError> {
        let raw: String = self
            .request(
                "eth_getTransactionCount",
                vec![json!(address), block.to_param()],
            )
            .await?;
        quantity::parse(&raw).map_err(|e| StreamError::decode("eth_getTransactionCount", e))
    }

    /// `eth_newBlockFilter`.
    pub async fn new_block_filter(&self) -> Result<FilterId, StreamError> {
        self.request("eth_newBlockFilter", vec![]).await
    }

    /// `eth_newPendingTransactionFilter`.
    pub async fn new_pending_transaction_filter(&self) -> Result<FilterId, StreamError> {
        self.request("eth_newPendingTransactionFilter", vec![])
            .await
    }

    /// `eth_newFilter`.
    pub async fn new_filter(&self, filter: &LogFilter) -> Result<FilterId, StreamError> {
        let params =
            serde_json::to_value(filter).map_err(|e| StreamError::decode("eth_newFilter", e))?;
        self.request("eth_newFilter", vec![params]).await
    }

    /// `eth_getFilterChanges`. A `null` result reads as "nothing new".
    pub async fn get_filter_changes<T: DeserializeOwned>(
        &self,
        id: &FilterId,
    ) -> Result<Vec<T>, StreamError> {
        let changes: Option<Vec<T>> = self
            .request("eth_getFilterChanges", vec![json!(id)])
            .await?;
        Ok(changes.unwrap_or_default())
    }

    /// `eth_getFilterLogs`: every log the filter currently matches.
    pub async fn get_filter_logs(&self, id: &FilterId) -> Result<Vec<Log>, StreamError> {
        let logs: Option<Vec<Log>> = self
            .request("eth_getFilterLogs", vec![json!(id)])
            .await?;
        Ok(logs.unwrap_or_default())
    }

    /// `eth_uninstallFilter`. Returns the node's acknowledgement.
    pub async fn uninstall_filter(&self, id: &FilterId) -> Result<bool, StreamError> {
        self.request("eth_uninstallFilter", vec![json!(id)]).await
    }
}
