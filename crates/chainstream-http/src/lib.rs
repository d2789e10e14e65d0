//! chainstream-http: HTTP JSON-RPC transport backed by `reqwest`.

pub mod client;

pub use client::{HttpClientConfig, HttpTransport};
