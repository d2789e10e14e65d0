//! Catch-up merger: replays history from a start height, then follows new
//! heads, as one gap-free, duplicate-free, strictly ascending sequence.
//!
//! ```text
//! RESOLVING_START ─► REPLAYING_HISTORY ─► DRAINING_FILTER_BACKLOG ─► LIVE
//!        │                  │                        │                 │
//!        └──────────────────┴────────────────────────┴─────────────────┴─► CANCELLED | FAILED
//! ```
//!
//! The new-heads filter is installed right after the start height is
//! resolved and before the chain head is read, so a block mined while history
//! replays is reported by the filter backlog. The cursor (next expected
//! height) is the only ordering authority: every block, whatever its source,
//! is reconciled against it. Heights below the cursor are duplicates, heights
//! above it open a gap that is backfilled by number before the reported block
//! is emitted.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use chainstream_core::{Block, BlockId, RpcClient, StreamError};

use crate::fetcher::BlockFetcher;
use crate::filter::{BlockHash, FilterSession};
use crate::poller::LivePoller;
use crate::replay::Replay;
use crate::subscription::{spawn_producer, Emitter, EventStream};

/// Where the merger is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergerState {
    ResolvingStart,
    ReplayingHistory,
    DrainingFilterBacklog,
    Live,
    Cancelled,
    Failed,
}

impl std::fmt::Display for MergerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResolvingStart => write!(f, "resolving-start"),
            Self::ReplayingHistory => write!(f, "replaying-history"),
            Self::DrainingFilterBacklog => write!(f, "draining-filter-backlog"),
            Self::Live => write!(f, "live"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One catch-up-and-follow run. Not shared: each subscription owns its
/// merger, cursor and filter session.
pub struct CatchUpMerger {
    fetcher: BlockFetcher,
    full: bool,
    interval: Duration,
    cursor: Option<u64>,
    state: MergerState,
}

impl CatchUpMerger {
    pub fn new(client: Arc<RpcClient>, full: bool, interval: Duration) -> Self {
        Self {
            fetcher: BlockFetcher::new(client),
            full,
            interval,
            cursor: None,
            state: MergerState::ResolvingStart,
        }
    }

    /// Spawn the merger as a sequence. See [`run`](Self::run) for `from`.
    pub fn start(mut self, from: Option<BlockId>, capacity: usize) -> EventStream<Block> {
        spawn_producer(capacity, "catch-up", move |emitter| async move {
            self.run(from, &emitter).await
        })
    }

    fn transition(&mut self, next: MergerState) {
        if self.state != next {
            tracing::debug!(
                from = %self.state,
                to = %next,
                cursor = ?self.cursor,
                "merger state change"
            );
            self.state = next;
        }
    }

    /// Run to cancellation or failure.
    ///
    /// With `from = None` there is no history: the first head the filter
    /// reports fixes the cursor.
    pub(crate) async fn run(
        &mut self,
        from: Option<BlockId>,
        emitter: &Emitter<Block>,
    ) -> Result<(), StreamError> {
        self.transition(MergerState::ResolvingStart);
        let start = match from {
            Some(id) => match self.fetcher.resolve(id).await {
                Ok(height) => Some(height),
                Err(e) => return Err(self.fail(e)),
            },
            None => None,
        };

        let client = self.fetcher.client().clone();
        let session = match FilterSession::<BlockHash>::new_heads(client).await {
            Ok(session) => session,
            Err(e) => return Err(self.fail(e)),
        };
        let mut poller = LivePoller::new(session, self.interval);

        let result = self.drive(start, &mut poller, emitter).await;
        poller.into_session().close().await;

        match result {
            Ok(()) => {
                self.transition(MergerState::Cancelled);
                tracing::info!(cursor = ?self.cursor, "catch-up subscription cancelled");
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn fail(&mut self, e: StreamError) -> StreamError {
        let failed_in = self.state;
        self.transition(MergerState::Failed);
        tracing::debug!(
            state = %failed_in,
            cursor = ?self.cursor,
            error = %e,
            "catch-up merger failed"
        );
        e
    }

    async fn drive(
        &mut self,
        start: Option<u64>,
        poller: &mut LivePoller<BlockHash>,
        emitter: &Emitter<Block>,
    ) -> Result<(), StreamError> {
        if let Some(start) = start {
            if self.replay_history(start, emitter).await?.is_break() {
                return Ok(());
            }
        }
        if emitter.is_cancelled() {
            return Ok(());
        }

        self.transition(MergerState::DrainingFilterBacklog);
        let backlog = poller.session().poll().await?;
        tracing::debug!(heads = backlog.len(), cursor = ?self.cursor, "draining filter backlog");
        if self.reconcile_heads(backlog, emitter).await?.is_break() {
            return Ok(());
        }

        self.transition(MergerState::Live);
        tracing::info!(cursor = ?self.cursor, "following new heads");
        while let Some(heads) = poller.next_batch(emitter).await? {
            if self.reconcile_heads(heads, emitter).await?.is_break() {
                return Ok(());
            }
        }
        Ok(())
    }

    async fn replay_history(
        &mut self,
        start: u64,
        emitter: &Emitter<Block>,
    ) -> Result<ControlFlow<()>, StreamError> {
        self.transition(MergerState::ReplayingHistory);
        self.cursor = Some(start);

        let head = self.fetcher.head().await?;
        if start > head {
            tracing::debug!(start, head, "start is past the chain head, nothing to replay");
            return Ok(ControlFlow::Continue(()));
        }

        tracing::info!(from = start, to = head, "replaying history");
        let mut replay = Replay::new(self.fetcher.clone(), start, head, true, self.full)?;
        while let Some(block) = replay.next().await {
            if self.deliver(block?, emitter).await.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        tracing::info!(at = head, "history replay complete");
        Ok(ControlFlow::Continue(()))
    }

    async fn reconcile_heads(
        &mut self,
        hashes: Vec<BlockHash>,
        emitter: &Emitter<Block>,
    ) -> Result<ControlFlow<()>, StreamError> {
        for hash in hashes {
            if emitter.is_cancelled() {
                return Ok(ControlFlow::Break(()));
            }
            let Some(block) = self.fetcher.fetch_by_hash(&hash, self.full).await? else {
                // Reorged away before we asked; gap fill recovers the height.
                tracing::warn!(%hash, "reported head is no longer known, skipping");
                continue;
            };
            if self.reconcile(block, emitter).await?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Reconcile one reported block against the cursor.
    async fn reconcile(
        &mut self,
        block: Block,
        emitter: &Emitter<Block>,
    ) -> Result<ControlFlow<()>, StreamError> {
        let cursor = *self.cursor.get_or_insert(block.number);

        if block.number < cursor {
            tracing::debug!(height = block.number, cursor, "discarding duplicate head");
            return Ok(ControlFlow::Continue(()));
        }

        if block.number > cursor {
            tracing::info!(
                from = cursor,
                to = block.number - 1,
                "backfilling gap before reported head"
            );
            for height in cursor..block.number {
                let filler = self.fetcher.fetch(BlockId::Number(height), self.full).await?;
                if self.deliver(filler, emitter).await.is_break() {
                    return Ok(ControlFlow::Break(()));
                }
            }
        }

        Ok(self.deliver(block, emitter).await)
    }

    /// Emit `block` (which sits exactly at the cursor) and advance past it.
    async fn deliver(&mut self, block: Block, emitter: &Emitter<Block>) -> ControlFlow<()> {
        debug_assert_eq!(Some(block.number), self.cursor);
        let height = block.number;
        let flow = emitter.emit(block).await;
        if flow.is_continue() {
            self.cursor = Some(height + 1);
            tracing::trace!(height, "emitted block");
        }
        flow
    }
}
