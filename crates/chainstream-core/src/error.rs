//! Error taxonomy shared by the transport, client and streaming layers.

use thiserror::Error;

use crate::request::JsonRpcError;
use crate::types::BlockId;

/// Errors raised by a single transport round trip.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, bad status, unreadable body).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Response body is not a JSON-RPC envelope.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` if this error is transient and a fresh subscription
    /// could reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Timeout { .. })
    }
}

/// Errors that terminate a block, transaction or log sequence.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The underlying round trip failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A response could not be interpreted as the expected shape.
    #[error("cannot decode `{method}` response: {reason}")]
    Decode { method: String, reason: String },

    /// Installing a server-side filter failed.
    #[error("failed to create {kind} filter: {source}")]
    FilterCreation {
        kind: &'static str,
        #[source]
        source: Box<StreamError>,
    },

    /// The node has no block for the identifier.
    #[error("block not found: {0}")]
    BlockNotFound(BlockId),

    /// A bounded replay was asked for `start > end`.
    #[error("invalid block range: start {start} is after end {end}")]
    InvalidRange { start: u64, end: u64 },
}

impl StreamError {
    /// Construct a decode error for `method`.
    pub fn decode(method: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            method: method.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` if resubscribing may succeed (transient transport failure).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            Self::FilterCreation { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_creation_inherits_retryability() {
        let err = StreamError::FilterCreation {
            kind: "new heads",
            source: Box::new(StreamError::Transport(TransportError::Timeout { ms: 10 })),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("new heads"));
    }

    #[test]
    fn node_errors_are_not_retryable() {
        let err = StreamError::Transport(TransportError::Rpc(JsonRpcError {
            code: -32602,
            message: "invalid params".into(),
            data: None,
        }));
        assert!(!err.is_retryable());
        assert!(!StreamError::decode("eth_getBlockByNumber", "bad hex").is_retryable());
    }

    #[test]
    fn malformed_envelope_is_not_retryable() {
        let err: TransportError = serde_json::from_str::<serde_json::Value>("<html>")
            .unwrap_err()
            .into();
        assert!(matches!(err, TransportError::Deserialization(_)));
        assert!(!err.is_retryable());
        assert!(!StreamError::from(err).is_retryable());
    }
}
