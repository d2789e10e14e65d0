//! chainstream-core: transport trait, typed JSON-RPC client and chain types
//! for ChainStream.
//!
//! # Overview
//!
//! - [`RpcTransport`]: the single round-trip primitive every transport implements
//! - [`RpcClient`]: typed calls (`eth_getBlockByNumber`, filter lifecycle, …)
//! - [`JsonRpcRequest`] / [`JsonRpcResponse`]: wire types
//! - [`StreamError`] / [`TransportError`]: error taxonomy
//! - [`types`]: [`BlockId`], [`Block`], [`Transaction`], [`Log`], [`LogFilter`]
//! - [`units`]: wei unit conversion

pub mod client;
pub mod error;
pub mod request;
pub mod transport;
pub mod types;
pub mod units;

pub use client::RpcClient;
pub use error::{StreamError, TransportError};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use transport::RpcTransport;
pub use types::{Block, BlockId, BlockTransactions, FilterId, Log, LogFilter, Transaction};
pub use units::{from_wei, to_wei, Unit, UnitError};
