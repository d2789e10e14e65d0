//! Stream configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings shared by every sequence a [`ChainStreams`](crate::ChainStreams) produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Delay between two `eth_getFilterChanges` polls (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Items buffered between a producer task and its consumer.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_poll_interval_ms() -> u64 { 2_000 }
fn default_channel_capacity() -> usize { 1_024 }

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl StreamConfig {
    /// The poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}
