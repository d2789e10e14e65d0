//! The `RpcTransport` trait: a single JSON-RPC round trip.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// The async round-trip primitive every transport implements.
///
/// Implementations perform exactly one exchange per `send`: no polling and no
/// retry. Retry policy belongs to callers of the streaming layer.
///
/// The trait is object-safe and is stored as `Arc<dyn RpcTransport>`.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Send a single JSON-RPC request and return the response.
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// Return the transport's identifier (URL or name).
    fn url(&self) -> &str;
}
