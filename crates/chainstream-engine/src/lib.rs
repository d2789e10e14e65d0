//! chainstream-engine: ordered block, transaction and log sequences over a
//! polling JSON-RPC node.
//!
//! # Architecture
//!
//! ```text
//! ChainStreams
//!   ├── replay_blocks        RangeReplayer ── BlockFetcher
//!   ├── catch_up_and_follow  CatchUpMerger
//!   │                          ├── RangeReplayer (history)
//!   │                          ├── FilterSession (new heads, installed first)
//!   │                          └── LivePoller    (backlog drain + live polls)
//!   ├── block / transaction / pending-transaction streams
//!   └── log streams          FilterSession<Log> ── LivePoller
//! ```
//!
//! Every sequence is an [`EventStream`] carrying a [`Subscription`] for
//! cooperative, idempotent cancellation.

pub mod catchup;
pub mod config;
pub mod fetcher;
pub mod filter;
pub mod poller;
pub mod replay;
pub mod streams;
pub mod subscription;

pub use catchup::{CatchUpMerger, MergerState};
pub use config::StreamConfig;
pub use fetcher::BlockFetcher;
pub use filter::{BlockHash, FilterSession, FilterSpec, TxHash};
pub use poller::LivePoller;
pub use replay::{RangeReplayer, Replay};
pub use streams::ChainStreams;
pub use subscription::{EventStream, Subscription};
