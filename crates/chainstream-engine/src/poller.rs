//! Live poller: polls a filter session on a fixed interval.

use std::ops::ControlFlow;
use std::time::Duration;

use serde::de::DeserializeOwned;

use chainstream_core::StreamError;

use crate::filter::FilterSession;
use crate::subscription::{spawn_producer, Emitter, EventStream};

/// Drives one [`FilterSession`]: sleep, poll, repeat.
///
/// A failed poll is returned as is; the poller never retries.
pub struct LivePoller<T> {
    session: FilterSession<T>,
    interval: Duration,
    polls: u64,
}

impl<T> LivePoller<T>
where
    T: DeserializeOwned + Send + 'static,
{
    pub fn new(session: FilterSession<T>, interval: Duration) -> Self {
        Self {
            session,
            interval,
            polls: 0,
        }
    }

    /// Spawn a sequence that emits every entry the filter reports, in the
    /// order received, until cancelled or a poll fails. The filter is
    /// uninstalled when the sequence ends.
    pub fn start(session: FilterSession<T>, interval: Duration, capacity: usize) -> EventStream<T> {
        spawn_producer(capacity, "live-poller", move |emitter| {
            LivePoller::new(session, interval).run(emitter)
        })
    }

    pub fn session(&self) -> &FilterSession<T> {
        &self.session
    }

    pub fn into_session(self) -> FilterSession<T> {
        self.session
    }

    /// Wait one interval, then poll once. `Ok(None)` when the subscription
    /// was cancelled before the poll was issued.
    pub(crate) async fn next_batch<E>(
        &mut self,
        emitter: &Emitter<E>,
    ) -> Result<Option<Vec<T>>, StreamError> {
        if emitter.sleep(self.interval).await.is_break() {
            return Ok(None);
        }
        let batch = self.session.poll().await?;
        self.polls += 1;
        Ok(Some(batch))
    }

    /// Forward entries to `emitter`, then uninstall the filter.
    pub(crate) async fn run(mut self, emitter: Emitter<T>) -> Result<(), StreamError> {
        let result = self.forward(&emitter).await;
        tracing::debug!(
            filter_id = %self.session.id(),
            polls = self.polls,
            "live poller stopping"
        );
        self.session.close().await;
        result
    }

    async fn forward(&mut self, emitter: &Emitter<T>) -> Result<(), StreamError> {
        while let Some(batch) = self.next_batch(emitter).await? {
            for entry in batch {
                if let ControlFlow::Break(()) = emitter.emit(entry).await {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}
