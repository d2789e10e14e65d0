//! Cancellable sequences.
//!
//! Every sequence is one Tokio task (the producer) feeding a bounded channel
//! that the consumer reads through an [`EventStream`]. The two sides share a
//! [`Subscription`]: a cooperative cancellation flag the producer checks at
//! each suspension point (before an emission, during a poll-interval sleep,
//! while blocked on a full channel). In-flight RPC calls are never aborted.

use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use chainstream_core::StreamError;

/// Handle to one active sequence.
///
/// Clones refer to the same sequence. [`unsubscribe`](Self::unsubscribe) is
/// idempotent.
#[derive(Clone)]
pub struct Subscription {
    token: CancellationToken,
}

impl Subscription {
    pub(crate) fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Request cancellation. The producer stops at its next suspension point
    /// and tears down any server-side filter it owns.
    pub fn unsubscribe(&self) {
        self.token.cancel();
    }

    /// Returns `true` once [`unsubscribe`](Self::unsubscribe) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the subscription is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ─── Emitter ──────────────────────────────────────────────────────────────────

/// Producer side of a sequence.
pub(crate) struct Emitter<T> {
    tx: mpsc::Sender<Result<T, StreamError>>,
    subscription: Subscription,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            subscription: self.subscription.clone(),
        }
    }
}

impl<T> Emitter<T> {
    pub(crate) fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// The consumer unsubscribed or went away.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.subscription.is_cancelled() || self.tx.is_closed()
    }

    /// Deliver one item. `Break` means the sequence must stop.
    pub(crate) async fn emit(&self, item: T) -> ControlFlow<()> {
        if self.is_cancelled() {
            return ControlFlow::Break(());
        }
        tokio::select! {
            biased;
            _ = self.subscription.cancelled() => ControlFlow::Break(()),
            sent = self.tx.send(Ok(item)) => match sent {
                Ok(()) => ControlFlow::Continue(()),
                Err(_) => ControlFlow::Break(()),
            },
        }
    }

    /// Deliver the terminal error.
    pub(crate) async fn fail(&self, err: StreamError) {
        tokio::select! {
            biased;
            _ = self.subscription.cancelled() => {}
            _ = self.tx.send(Err(err)) => {}
        }
    }

    /// Sleep for `duration`; `Break` if cancelled meanwhile.
    pub(crate) async fn sleep(&self, duration: Duration) -> ControlFlow<()> {
        if self.is_cancelled() {
            return ControlFlow::Break(());
        }
        tokio::select! {
            biased;
            _ = self.subscription.cancelled() => ControlFlow::Break(()),
            _ = tokio::time::sleep(duration) => ControlFlow::Continue(()),
        }
    }
}

/// Spawn the producer task for a new sequence.
///
/// `body` runs to completion; an `Err` it returns is delivered to the
/// consumer exactly once, unless the sequence was already cancelled.
/// Must be called from within a Tokio runtime.
pub(crate) fn spawn_producer<T, F, Fut>(
    capacity: usize,
    label: &'static str,
    body: F,
) -> EventStream<T>
where
    T: Send + 'static,
    F: FnOnce(Emitter<T>) -> Fut,
    Fut: Future<Output = Result<(), StreamError>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let subscription = Subscription::new();
    let emitter = Emitter {
        tx,
        subscription: subscription.clone(),
    };
    let task = body(emitter.clone());

    tokio::spawn(async move {
        match task.await {
            Ok(()) if emitter.is_cancelled() => {
                tracing::info!(stream = label, "sequence cancelled");
            }
            Ok(()) => tracing::debug!(stream = label, "sequence complete"),
            Err(e) if emitter.is_cancelled() => {
                tracing::debug!(stream = label, error = %e, "error after cancellation dropped");
            }
            Err(e) => {
                tracing::error!(stream = label, error = %e, "sequence failed");
                emitter.fail(e).await;
            }
        }
    });

    EventStream {
        rx,
        subscription,
        finished: false,
    }
}

// ─── EventStream ──────────────────────────────────────────────────────────────

/// Consumer side of a sequence: a [`Stream`] of `Result<T, StreamError>`.
///
/// - A failed sequence yields one `Err` and then ends.
/// - A cancelled sequence ends cleanly, without an error, and yields nothing
///   after [`unsubscribe`](Self::unsubscribe) even if items were buffered.
/// - Dropping the stream unsubscribes.
pub struct EventStream<T> {
    rx: mpsc::Receiver<Result<T, StreamError>>,
    subscription: Subscription,
    finished: bool,
}

impl<T> EventStream<T> {
    /// A handle that can cancel this sequence from elsewhere.
    pub fn subscription(&self) -> Subscription {
        self.subscription.clone()
    }

    pub fn unsubscribe(&self) {
        self.subscription.unsubscribe();
    }

    pub fn is_cancelled(&self) -> bool {
        self.subscription.is_cancelled()
    }
}

impl<T: Send + 'static> EventStream<T> {
    /// Re-emit every item of this sequence as zero or more items of another.
    ///
    /// The returned sequence owns this one: cancelling it drops the inner
    /// stream, which cancels the inner producer and its filter.
    pub fn flat_map_items<U, F>(self, capacity: usize, mut f: F) -> EventStream<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> Vec<U> + Send + 'static,
    {
        let mut inner = self;
        spawn_producer(capacity, "flat-map", move |emitter| async move {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = emitter.subscription().cancelled() => return Ok(()),
                    next = inner.next() => next,
                };
                match next {
                    None => return Ok(()),
                    Some(Err(e)) => return Err(e),
                    Some(Ok(item)) => {
                        for out in f(item) {
                            if emitter.emit(out).await.is_break() {
                                return Ok(());
                            }
                        }
                    }
                }
            }
        })
    }
}

impl<T> Stream for EventStream<T> {
    type Item = Result<T, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished || this.subscription.is_cancelled() {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(Err(e))) => {
                this.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl<T> Drop for EventStream<T> {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}
