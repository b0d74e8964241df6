use std::{
    convert::Infallible,
    fmt,
    future::Future,
    pin::Pin,
    rc::{Rc, Weak},
    task::{Context, Poll},
};

use futures::Stream;

use super::handle::Registry;
use crate::buffer::{IterationBuffer, Pull};

type ValueBuffer<V> = IterationBuffer<Rc<V>, Infallible>;

/// The store-side end of a subscription's buffer.
///
/// Lives inside the store's listener, so it is dropped when the listener is
/// removed or the store itself goes away; either way the sequence ends.
pub(super) struct Sink<V>(ValueBuffer<V>);

impl<V> Sink<V> {
    pub(super) fn new(buffer: ValueBuffer<V>) -> Self {
        Self(buffer)
    }

    pub(super) fn push(&self, value: &Rc<V>) {
        self.0.push(Rc::clone(value));
    }
}

impl<V> Drop for Sink<V> {
    fn drop(&mut self) {
        self.0.complete();
    }
}

/// A stream of a store's values.
///
/// Yields the value current at subscription time, then every later change.
/// Values the consumer has not pulled yet are buffered without limit.
/// Polling the stream also runs the store's deferred work, so awaiting the
/// next value is enough to drive initial and coalesced deliveries.
///
/// Dropping the subscription, or calling [`cancel`](Subscription::cancel),
/// removes its listener from the store.
pub struct Subscription<V> {
    buffer: ValueBuffer<V>,
    in_flight: Option<Pull<Rc<V>, Infallible>>,
    registry: Weak<dyn Registry>,
}

impl<V> Subscription<V> {
    pub(super) fn new(buffer: ValueBuffer<V>, registry: Weak<dyn Registry>) -> Self {
        Self {
            buffer,
            in_flight: None,
            registry,
        }
    }

    /// Request the next value after running the store's deferred work.
    ///
    /// Several pulls may be outstanding at once; they resolve in the order
    /// they were made. `None` means the subscription was cancelled or the
    /// store is gone.
    pub async fn pull(&self) -> Option<Rc<V>> {
        self.turn();
        let step = self.buffer.pull().await;
        step.map(unwrap_infallible)
    }

    /// Stop the subscription and detach it from the store.
    ///
    /// Pending pulls resolve to `None`. Calling this again does nothing.
    pub fn cancel(&self) {
        self.buffer.cancel();
    }

    /// Whether the subscription was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.buffer.is_cancelled()
    }

    /// Number of delivered values not yet pulled.
    pub fn backlog(&self) -> usize {
        self.buffer.queued()
    }

    fn turn(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.flush();
        }
    }
}

impl<V> Stream for Subscription<V> {
    type Item = Rc<V>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.turn();

        let buffer = &this.buffer;
        let pull = this.in_flight.get_or_insert_with(|| buffer.pull());

        let polled = Pin::new(pull).poll(cx);
        match polled {
            Poll::Ready(step) => {
                this.in_flight = None;
                Poll::Ready(step.map(unwrap_infallible))
            }
            Poll::Pending => {
                // Deferred work queued later may be what produces our value.
                if let Some(registry) = this.registry.upgrade() {
                    registry.wake_on_defer(cx.waker());
                }
                Poll::Pending
            }
        }
    }
}

impl<V> Drop for Subscription<V> {
    fn drop(&mut self) {
        self.buffer.cancel();
    }
}

impl<V> fmt::Debug for Subscription<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("buffer", &self.buffer)
            .field("store_alive", &(self.registry.strong_count() > 0))
            .finish()
    }
}

fn unwrap_infallible<T>(result: Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}
