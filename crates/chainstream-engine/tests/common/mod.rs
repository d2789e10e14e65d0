//! Scripted in-memory node used by the integration tests.
//!
//! Routes each JSON-RPC method to a small chain model: blocks by height and
//! hash, installed filters with pending change queues, pending transactions
//! and logs. Tests mutate the chain (mine, announce, inject failures) while a
//! sequence is running and observe what it emits.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};

use chainstream_core::types::quantity;
use chainstream_core::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcTransport, StreamError, TransportError,
};
use chainstream_engine::{ChainStreams, EventStream, StreamConfig};

pub const POLL: Duration = Duration::from_millis(20);
pub const WAIT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterKind {
    Blocks,
    Pending,
    Logs,
}

struct Filter {
    kind: FilterKind,
    queue: Vec<Value>,
}

#[derive(Default)]
struct ChainState {
    height_count: u64,
    filters: HashMap<String, Filter>,
    next_filter: u64,
    uninstalled: Vec<String>,
    pending_txs: HashMap<String, Value>,
    logs: Vec<Value>,
    calls: Vec<String>,
    fail_block_at: Option<u64>,
    fail_filter_install: bool,
    fail_polls: bool,
    mine_on_fetch: Option<(u64, u64)>,
}

/// The mock node. Cloning shares state.
#[derive(Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<ChainState>>,
}

pub fn block_hash(height: u64) -> String {
    format!("0x{:064x}", 0xb10c_0000u64 + height)
}

fn height_of(hash: &str) -> Option<u64> {
    let raw = u64::from_str_radix(hash.trim_start_matches("0x"), 16).ok()?;
    raw.checked_sub(0xb10c_0000)
}

fn transaction_json(height: u64, index: u64) -> Value {
    json!({
        "hash": format!("0xt{height}-{index}"),
        "nonce": quantity::encode(index),
        "blockHash": block_hash(height),
        "blockNumber": quantity::encode(height),
        "transactionIndex": quantity::encode(index),
        "from": "0x00000000000000000000000000000000000000f0",
        "to": "0x00000000000000000000000000000000000000f1",
        "value": "0x1",
        "gas": "0x5208",
        "input": "0x"
    })
}

fn block_json(height: u64, full: bool) -> Value {
    let transactions: Vec<Value> = (0..2)
        .map(|i| {
            if full {
                transaction_json(height, i)
            } else {
                json!(format!("0xt{height}-{i}"))
            }
        })
        .collect();
    let parent_hash = match height {
        0 => format!("0x{:064x}", 0),
        h => block_hash(h - 1),
    };
    json!({
        "number": quantity::encode(height),
        "hash": block_hash(height),
        "parentHash": parent_hash,
        "timestamp": quantity::encode(1_700_000_000 + height * 12),
        "transactions": transactions
    })
}

impl MockChain {
    /// A chain with blocks `0..count`.
    pub fn with_blocks(count: u64) -> Self {
        let chain = Self::default();
        chain.state.lock().unwrap().height_count = count;
        chain
    }

    pub fn transport(&self) -> Arc<dyn RpcTransport> {
        Arc::new(self.clone())
    }

    pub fn streams(&self) -> ChainStreams {
        ChainStreams::new(
            self.transport(),
            StreamConfig::default().with_poll_interval(POLL).with_channel_capacity(64),
        )
    }

    pub fn head(&self) -> u64 {
        self.state.lock().unwrap().height_count - 1
    }

    /// Append one block and announce it to every block filter.
    pub fn mine(&self) -> u64 {
        let mut s = self.state.lock().unwrap();
        Self::mine_locked(&mut s, true)
    }

    /// Append one block that no filter reports.
    pub fn mine_silently(&self) -> u64 {
        let mut s = self.state.lock().unwrap();
        Self::mine_locked(&mut s, false)
    }

    fn mine_locked(s: &mut ChainState, announce: bool) -> u64 {
        let height = s.height_count;
        s.height_count += 1;
        if announce {
            Self::announce_locked(s, height);
        }
        height
    }

    /// Report an existing height to block filters again.
    pub fn announce(&self, height: u64) {
        let mut s = self.state.lock().unwrap();
        Self::announce_locked(&mut s, height);
    }

    /// Report a hash the node does not know.
    pub fn announce_unknown(&self) {
        let mut s = self.state.lock().unwrap();
        for f in s.filters.values_mut().filter(|f| f.kind == FilterKind::Blocks) {
            f.queue.push(json!(block_hash(9_999_999)));
        }
    }

    fn announce_locked(s: &mut ChainState, height: u64) {
        for f in s.filters.values_mut().filter(|f| f.kind == FilterKind::Blocks) {
            f.queue.push(json!(block_hash(height)));
        }
    }

    /// When block `height` is fetched by number, mine `count` blocks. Only the
    /// last one is announced to block filters.
    pub fn mine_when_fetched(&self, height: u64, count: u64) {
        self.state.lock().unwrap().mine_on_fetch = Some((height, count));
    }

    pub fn fail_block_at(&self, height: u64) {
        self.state.lock().unwrap().fail_block_at = Some(height);
    }

    pub fn fail_filter_install(&self) {
        self.state.lock().unwrap().fail_filter_install = true;
    }

    pub fn fail_polls(&self) {
        self.state.lock().unwrap().fail_polls = true;
    }

    pub fn add_pending_transaction(&self, hash: &str, known: bool) {
        let mut s = self.state.lock().unwrap();
        if known {
            let mut tx = transaction_json(0, 0);
            tx["hash"] = json!(hash);
            tx["blockHash"] = Value::Null;
            tx["blockNumber"] = Value::Null;
            tx["transactionIndex"] = Value::Null;
            s.pending_txs.insert(hash.to_string(), tx);
        }
        for f in s.filters.values_mut().filter(|f| f.kind == FilterKind::Pending) {
            f.queue.push(json!(hash));
        }
    }

    /// Record a log; `announce` also queues it on log filters.
    pub fn add_log(&self, block: u64, index: u64, announce: bool) -> Value {
        let log = json!({
            "address": "0x00000000000000000000000000000000000000aa",
            "topics": ["0xddf252ad"],
            "data": "0x",
            "blockNumber": quantity::encode(block),
            "blockHash": block_hash(block),
            "transactionHash": format!("0xt{block}-0"),
            "logIndex": quantity::encode(index),
            "removed": false
        });
        let mut s = self.state.lock().unwrap();
        s.logs.push(log.clone());
        if announce {
            for f in s.filters.values_mut().filter(|f| f.kind == FilterKind::Logs) {
                f.queue.push(log.clone());
            }
        }
        log
    }

    pub fn installed_filters(&self) -> usize {
        self.state.lock().unwrap().filters.len()
    }

    pub fn filters_created(&self) -> u64 {
        self.state.lock().unwrap().next_filter
    }

    pub fn uninstalled(&self) -> Vec<String> {
        self.state.lock().unwrap().uninstalled.clone()
    }

    pub fn calls(&self, method: &str) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|m| *m == method).count()
    }

    /// Wait until `n` filters are installed.
    pub async fn wait_for_filters(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while self.installed_filters() < n {
            assert!(tokio::time::Instant::now() < deadline, "filters were not installed");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Wait until `n` filters have been uninstalled.
    pub async fn wait_for_uninstalls(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while self.uninstalled().len() < n {
            assert!(tokio::time::Instant::now() < deadline, "filters were not uninstalled");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn handle(&self, method: &str, params: &[Value]) -> Result<Value, TransportError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(method.to_string());

        match method {
            "eth_blockNumber" => Ok(json!(quantity::encode(s.height_count - 1))),
            "eth_getBlockByNumber" => {
                let full = params[1].as_bool().unwrap_or(false);
                let height = match params[0].as_str().unwrap_or_default() {
                    "latest" | "pending" => s.height_count - 1,
                    "earliest" => 0,
                    hex => quantity::parse(hex).map_err(TransportError::Other)?,
                };
                if s.fail_block_at == Some(height) {
                    return Err(TransportError::Http(format!("connection reset fetching {height}")));
                }
                if height >= s.height_count {
                    return Ok(Value::Null);
                }
                if let Some((trigger, count)) = s.mine_on_fetch {
                    if trigger == height && params[0] != json!("latest") {
                        s.mine_on_fetch = None;
                        for i in 0..count {
                            Self::mine_locked(&mut s, i + 1 == count);
                        }
                    }
                }
                Ok(block_json(height, full))
            }
            "eth_getBlockByHash" => {
                let full = params[1].as_bool().unwrap_or(false);
                match params[0].as_str().and_then(height_of) {
                    Some(h) if h < s.height_count => Ok(block_json(h, full)),
                    _ => Ok(Value::Null),
                }
            }
            "eth_newBlockFilter" | "eth_newPendingTransactionFilter" | "eth_newFilter" => {
                if s.fail_filter_install {
                    return Err(TransportError::Http("filter install refused".into()));
                }
                let kind = match method {
                    "eth_newBlockFilter" => FilterKind::Blocks,
                    "eth_newPendingTransactionFilter" => FilterKind::Pending,
                    _ => FilterKind::Logs,
                };
                s.next_filter += 1;
                let id = quantity::encode(s.next_filter);
                s.filters.insert(id.clone(), Filter { kind, queue: vec![] });
                Ok(json!(id))
            }
            "eth_getFilterChanges" => {
                if s.fail_polls {
                    return Err(TransportError::Timeout { ms: 1 });
                }
                let id = params[0].as_str().unwrap_or_default();
                match s.filters.get_mut(id) {
                    Some(f) => Ok(Value::Array(std::mem::take(&mut f.queue))),
                    None => Err(filter_not_found()),
                }
            }
            "eth_getFilterLogs" => {
                let id = params[0].as_str().unwrap_or_default();
                if !s.filters.contains_key(id) {
                    return Err(filter_not_found());
                }
                Ok(Value::Array(s.logs.clone()))
            }
            "eth_uninstallFilter" => {
                let id = params[0].as_str().unwrap_or_default().to_string();
                let existed = s.filters.remove(&id).is_some();
                s.uninstalled.push(id);
                Ok(json!(existed))
            }
            "eth_getTransactionByHash" => {
                let hash = params[0].as_str().unwrap_or_default();
                Ok(s.pending_txs.get(hash).cloned().unwrap_or(Value::Null))
            }
            other => Err(TransportError::Rpc(JsonRpcError {
                code: -32601,
                message: format!("method {other} not found"),
                data: None,
            })),
        }
    }
}

fn filter_not_found() -> TransportError {
    TransportError::Rpc(JsonRpcError {
        code: -32000,
        message: "filter not found".into(),
        data: None,
    })
}

#[async_trait]
impl RpcTransport for MockChain {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let result = self.handle(&req.method, &req.params)?;
        Ok(JsonRpcResponse::success(req.id, result))
    }

    fn url(&self) -> &str {
        "mock://chain"
    }
}

/// Next item, failing the test if none arrives in time.
pub async fn next_ok<T>(stream: &mut EventStream<T>) -> T {
    match tokio::time::timeout(WAIT, stream.next()).await {
        Ok(Some(Ok(item))) => item,
        Ok(Some(Err(e))) => panic!("sequence failed: {e}"),
        Ok(None) => panic!("sequence ended early"),
        Err(_) => panic!("timed out waiting for an item"),
    }
}

/// Next item, which must be an error.
pub async fn next_err<T: std::fmt::Debug>(stream: &mut EventStream<T>) -> StreamError {
    match tokio::time::timeout(WAIT, stream.next()).await {
        Ok(Some(Err(e))) => e,
        Ok(other) => panic!("expected an error, got {other:?}"),
        Err(_) => panic!("timed out waiting for an error"),
    }
}

/// The sequence must end without another item.
pub async fn expect_end<T: std::fmt::Debug>(stream: &mut EventStream<T>) {
    match tokio::time::timeout(WAIT, stream.next()).await {
        Ok(None) => {}
        Ok(Some(item)) => panic!("expected end of sequence, got {item:?}"),
        Err(_) => panic!("timed out waiting for end of sequence"),
    }
}

/// No item may arrive within `window`.
pub async fn expect_quiet<T: std::fmt::Debug>(stream: &mut EventStream<T>, window: Duration) {
    if let Ok(item) = tokio::time::timeout(window, stream.next()).await {
        panic!("expected no item, got {item:?}");
    }
}
