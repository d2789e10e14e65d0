//! Filter session: owns one server-side filter from install to uninstall.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use chainstream_core::{FilterId, Log, LogFilter, RpcClient, StreamError};

/// Hash reported by a new-heads filter.
pub type BlockHash = String;

/// Hash reported by a pending-transactions filter.
pub type TxHash = String;

/// What a filter watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSpec {
    NewHeads,
    PendingTransactions,
    Logs(LogFilter),
}

impl FilterSpec {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NewHeads => "new heads",
            Self::PendingTransactions => "pending transactions",
            Self::Logs(_) => "logs",
        }
    }
}

/// An installed filter whose changes decode as `T`.
///
/// `close` consumes the session, so a handle is uninstalled at most once.
/// A session dropped without `close` is left for the node to expire.
pub struct FilterSession<T> {
    client: Arc<RpcClient>,
    id: FilterId,
    kind: &'static str,
    _entries: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> FilterSession<T> {
    /// Install a filter for `watch` (one RPC call).
    pub async fn open(client: Arc<RpcClient>, watch: FilterSpec) -> Result<Self, StreamError> {
        let kind = watch.label();
        let installed = match &watch {
            FilterSpec::NewHeads => client.new_block_filter().await,
            FilterSpec::PendingTransactions => client.new_pending_transaction_filter().await,
            FilterSpec::Logs(filter) => client.new_filter(filter).await,
        };
        let id = installed.map_err(|e| StreamError::FilterCreation {
            kind,
            source: Box::new(e),
        })?;

        tracing::info!(filter_id = %id, kind, "filter installed");
        Ok(Self {
            client,
            id,
            kind,
            _entries: PhantomData,
        })
    }

    pub fn id(&self) -> &FilterId {
        &self.id
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Entries that arrived since the previous poll, in server order.
    /// Empty when nothing is new.
    pub async fn poll(&self) -> Result<Vec<T>, StreamError> {
        let changes = self.client.get_filter_changes(&self.id).await?;
        tracing::debug!(filter_id = %self.id, count = changes.len(), "polled filter");
        Ok(changes)
    }

    /// Uninstall the filter. Failures are logged, never returned: the node
    /// expires abandoned filters on its own.
    pub async fn close(self) {
        match self.client.uninstall_filter(&self.id).await {
            Ok(true) => {
                tracing::debug!(filter_id = %self.id, kind = self.kind, "filter uninstalled")
            }
            Ok(false) => tracing::warn!(
                filter_id = %self.id,
                kind = self.kind,
                "node did not know the filter at uninstall"
            ),
            Err(e) => tracing::warn!(
                filter_id = %self.id,
                kind = self.kind,
                error = %e,
                "failed to uninstall filter"
            ),
        }
    }
}

impl FilterSession<BlockHash> {
    /// `eth_newBlockFilter`.
    pub async fn new_heads(client: Arc<RpcClient>) -> Result<Self, StreamError> {
        Self::open(client, FilterSpec::NewHeads).await
    }

    /// `eth_newPendingTransactionFilter`.
    pub async fn pending_transactions(client: Arc<RpcClient>) -> Result<Self, StreamError> {
        Self::open(client, FilterSpec::PendingTransactions).await
    }
}

impl FilterSession<Log> {
    /// `eth_newFilter`.
    pub async fn logs(client: Arc<RpcClient>, filter: LogFilter) -> Result<Self, StreamError> {
        Self::open(client, FilterSpec::Logs(filter)).await
    }

    /// Every log the filter currently matches (`eth_getFilterLogs`).
    pub async fn existing_logs(&self) -> Result<Vec<Log>, StreamError> {
        self.client.get_filter_logs(&self.id).await
    }
}
