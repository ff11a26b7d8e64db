//! Push channel: single-producer, single-consumer async FIFO with explicit
//! close semantics
//!
//! Backs both per-session streams: user turns flowing into the engine and
//! normalized events flowing out to the SSE subscriber. Unlike a bare
//! `mpsc` channel, a push channel can be closed from the sending side while
//! sender handles are still alive; pushes after close are silently dropped
//! rather than treated as errors, so shutdown paths never have to care
//! whether the consumer already went away.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

/// Create a connected sender/receiver pair.
pub fn push_channel<T>() -> (PushSender<T>, PushReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        PushSender {
            inner: Arc::new(Mutex::new(Some(tx))),
        },
        PushReceiver { rx },
    )
}

/// Sending half of a push channel.
///
/// Cloneable: a session's driver task and its permission gate both write the
/// same output channel. `close` is shared across clones: after any clone
/// closes, every clone's `push` becomes a no-op.
pub struct PushSender<T> {
    inner: Arc<Mutex<Option<mpsc::UnboundedSender<T>>>>,
}

impl<T> Clone for PushSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PushSender<T> {
    /// Push a value onto the channel.
    ///
    /// Silently discards the value when the channel is closed or the
    /// receiver has been dropped.
    pub fn push(&self, value: T) {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(value);
        }
    }

    /// Close the channel. Idempotent.
    ///
    /// A consumer suspended in `recv` observes end-of-stream once queued
    /// values are drained.
    pub fn close(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.take();
    }

    /// Whether `close` has been called on this channel.
    pub fn is_closed(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }
}

/// Receiving half of a push channel.
pub struct PushReceiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> PushReceiver<T> {
    /// Receive the next value, suspending while the channel is open and
    /// empty. Returns `None` once the channel is closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

impl<T> Stream for PushReceiver<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}
