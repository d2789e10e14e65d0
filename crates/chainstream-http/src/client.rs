//! HTTP JSON-RPC transport.
//!
//! One `send` is one HTTP POST. Retry and backoff are deliberately absent:
//! the streaming layer surfaces transport failures to its caller, who decides
//! whether to resubscribe.

use std::time::Duration;

use async_trait::async_trait;

use chainstream_core::error::TransportError;
use chainstream_core::request::{JsonRpcRequest, JsonRpcResponse};
use chainstream_core::transport::RpcTransport;

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-request timeout enforced by the HTTP client.
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// JSON-RPC over HTTP.
pub struct HttpTransport {
    url: String,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for the given JSON-RPC endpoint URL.
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Other(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            http,
            request_timeout: config.request_timeout,
        })
    }

    /// Create with default configuration.
    pub fn default_for(url: impl Into<String>) -> Result<Self, TransportError> {
        Self::new(url, HttpClientConfig::default())
    }

    fn map_reqwest_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                ms: u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            TransportError::Http(e.to_string())
        }
    }
}

/// Parse a 2xx body. A body that is not a JSON-RPC envelope (an HTML error
/// page from a proxy, say) is a deserialization failure, not a network one.
fn decode_envelope(body: &[u8]) -> Result<JsonRpcResponse, TransportError> {
    Ok(serde_json::from_slice(body)?)
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        tracing::trace!(method = %req.method, id = %req.id, url = %self.url, "sending request");

        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        let body = resp.bytes().await.map_err(|e| self.map_reqwest_error(e))?;
        decode_envelope(&body)
    }

    fn url(&self) -> &str {
        &self.url
    }
}
