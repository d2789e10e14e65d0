//! `ChainStreams`: entry points for every block, transaction and log
//! sequence.

use std::collections::HashSet;
use std::sync::Arc;

use chainstream_core::{
    Block, BlockId, Log, LogFilter, RpcClient, RpcTransport, StreamError, Transaction,
};

use crate::catchup::CatchUpMerger;
use crate::config::StreamConfig;
use crate::fetcher::BlockFetcher;
use crate::filter::{FilterSession, TxHash};
use crate::poller::LivePoller;
use crate::replay::RangeReplayer;
use crate::subscription::{spawn_producer, EventStream};

/// Factory for cancellable sequences over one node.
///
/// Every call returns an independent [`EventStream`] with its own producer
/// task, cursor and filter; nothing is shared between sequences except the
/// client. All methods must be called from within a Tokio runtime.
///
/// # Example
/// ```no_run
/// # async fn example(transport: std::sync::Arc<dyn chainstream_core::RpcTransport>) {
/// use chainstream_core::BlockId;
/// use chainstream_engine::{ChainStreams, StreamConfig};
/// use futures::StreamExt;
///
/// let streams = ChainStreams::new(transport, StreamConfig::default());
/// let mut blocks = streams.catch_up_and_follow(BlockId::Number(19_000_000), false);
/// while let Some(block) = blocks.next().await {
///     let block = block.expect("subscription failed");
///     println!("block {}", block.number);
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct ChainStreams {
    client: Arc<RpcClient>,
    config: StreamConfig,
}

impl ChainStreams {
    pub fn new(transport: Arc<dyn RpcTransport>, config: StreamConfig) -> Self {
        Self::with_client(Arc::new(RpcClient::new(transport)), config)
    }

    pub fn with_client(client: Arc<RpcClient>, config: StreamConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &Arc<RpcClient> {
        &self.client
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    // ─── Blocks ───────────────────────────────────────────────────────────────

    /// Blocks `start..=end`, ascending or descending, then completion.
    ///
    /// Tags are resolved once when the sequence starts. The first failed
    /// fetch ends the sequence with that error.
    pub fn replay_blocks(
        &self,
        start: BlockId,
        end: BlockId,
        ascending: bool,
        full: bool,
    ) -> EventStream<Block> {
        let replayer = RangeReplayer::new(BlockFetcher::new(self.client.clone()));
        spawn_producer(self.config.channel_capacity, "replay", move |emitter| async move {
            let mut replay = replayer.replay(start, end, ascending, full).await?;
            let (from, to) = replay.bounds();
            tracing::info!(from, to, ascending, "replaying blocks");
            while let Some(block) = replay.next().await {
                if emitter.emit(block?).await.is_break() {
                    return Ok(());
                }
            }
            tracing::info!(from, to, "replay complete");
            Ok(())
        })
    }

    /// Every block from `from` onward: history first, then live heads, with
    /// no gaps and no duplicates, until unsubscribed.
    pub fn catch_up_and_follow(&self, from: BlockId, full: bool) -> EventStream<Block> {
        self.merger(full).start(Some(from), self.config.channel_capacity)
    }

    /// New blocks from the first head reported after subscribing.
    pub fn block_stream(&self, full: bool) -> EventStream<Block> {
        self.merger(full).start(None, self.config.channel_capacity)
    }

    fn merger(&self, full: bool) -> CatchUpMerger {
        CatchUpMerger::new(self.client.clone(), full, self.config.poll_interval())
    }

    // ─── Transactions ─────────────────────────────────────────────────────────

    /// Transactions of `start..=end`, block by block in the requested order.
    pub fn replay_transactions(
        &self,
        start: BlockId,
        end: BlockId,
        ascending: bool,
    ) -> EventStream<Transaction> {
        self.replay_blocks(start, end, ascending, true)
            .flat_map_items(self.config.channel_capacity, Block::into_transactions)
    }

    /// Transactions of every block from `from` onward.
    pub fn catch_up_and_follow_transactions(&self, from: BlockId) -> EventStream<Transaction> {
        self.catch_up_and_follow(from, true)
            .flat_map_items(self.config.channel_capacity, Block::into_transactions)
    }

    /// Transactions of each new block.
    pub fn transaction_stream(&self) -> EventStream<Transaction> {
        self.block_stream(true)
            .flat_map_items(self.config.channel_capacity, Block::into_transactions)
    }

    /// Transactions entering the node's pending pool. Hashes the node no
    /// longer knows by the time they are fetched are skipped.
    pub fn pending_transaction_stream(&self) -> EventStream<Transaction> {
        let client = self.client.clone();
        let interval = self.config.poll_interval();
        let capacity = self.config.channel_capacity;
        spawn_producer(capacity, "pending-transactions", move |emitter| async move {
            let session = FilterSession::<TxHash>::pending_transactions(client.clone()).await?;
            let mut poller = LivePoller::new(session, interval);

            let result: Result<(), StreamError> = async {
                while let Some(hashes) = poller.next_batch(&emitter).await? {
                    for hash in hashes {
                        let Some(tx) = client.get_transaction_by_hash(&hash).await? else {
                            tracing::debug!(%hash, "pending transaction vanished before fetch");
                            continue;
                        };
                        if emitter.emit(tx).await.is_break() {
                            return Ok(());
                        }
                    }
                }
                Ok(())
            }
            .await;

            poller.into_session().close().await;
            result
        })
    }

    // ─── Logs ─────────────────────────────────────────────────────────────────

    /// Logs matching `filter` as they are reported after subscribing.
    pub fn log_stream(&self, filter: LogFilter) -> EventStream<Log> {
        let client = self.client.clone();
        let interval = self.config.poll_interval();
        spawn_producer(self.config.channel_capacity, "logs", move |emitter| async move {
            let session = FilterSession::<Log>::logs(client, filter).await?;
            LivePoller::new(session, interval).run(emitter).await
        })
    }

    /// Logs the filter already matches (`eth_getFilterLogs`), then new ones.
    ///
    /// A log reported both in the backlog and in a later poll is emitted once.
    pub fn past_and_future_logs(&self, filter: LogFilter) -> EventStream<Log> {
        let client = self.client.clone();
        let interval = self.config.poll_interval();
        let capacity = self.config.channel_capacity;
        spawn_producer(capacity, "past-and-future-logs", move |emitter| async move {
            let session = FilterSession::<Log>::logs(client, filter).await?;
            let mut poller = LivePoller::new(session, interval);

            let result: Result<(), StreamError> = async {
                let backlog = poller.session().existing_logs().await?;
                tracing::info!(count = backlog.len(), "replaying existing logs");
                let mut seen: HashSet<LogKey> = backlog.iter().map(LogKey::of).collect();
                for log in backlog {
                    if emitter.emit(log).await.is_break() {
                        return Ok(());
                    }
                }

                while let Some(logs) = poller.next_batch(&emitter).await? {
                    for log in logs {
                        if seen.remove(&LogKey::of(&log)) {
                            continue;
                        }
                        if emitter.emit(log).await.is_break() {
                            return Ok(());
                        }
                    }
                    // Overlap with the backlog only shows up in the first poll.
                    seen.clear();
                }
                Ok(())
            }
            .await;

            poller.into_session().close().await;
            result
        })
    }
}

/// Position of a log in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LogKey {
    block_hash: Option<String>,
    transaction_hash: Option<String>,
    log_index: Option<u64>,
}

impl LogKey {
    fn of(log: &Log) -> Self {
        Self {
            block_hash: log.block_hash.clone(),
            transaction_hash: log.transaction_hash.clone(),
            log_index: log.log_index,
        }
    }
}
