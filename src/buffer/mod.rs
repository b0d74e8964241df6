//! Push-to-pull adapter.
//!
//! An [`IterationBuffer`] accepts values from a producer through
//! [`push`](IterationBuffer::push) and hands them to a consumer one
//! [`pull`](IterationBuffer::pull) at a time. When the producer is ahead the
//! values wait in a queue; when the consumer is ahead its pull requests wait
//! instead. Both sides are matched first-in first-out.

mod pull;


use std::{cell::RefCell, collections::VecDeque, fmt, rc::Rc};

use tokio::sync::oneshot;
use tracing::trace;

pub use pull::Pull;

/// What a pull resolves to: `Some(Ok(_))` for a value, `Some(Err(_))` for a
/// producer failure, `None` once the sequence has ended.
pub type Step<T, E> = Option<Result<T, E>>;

type Upstream = Box<dyn FnOnce()>;

struct BufferState<T, E> {
    queue: VecDeque<Step<T, E>>,
    pending_pulls: VecDeque<oneshot::Sender<Step<T, E>>>,
    closed: bool,
    cancelled: bool,
    upstream: Option<Upstream>,
}

/// A cancelable queue bridging push-style delivery to pull-style iteration.
///
/// Cloning yields another handle to the same buffer; the producer typically
/// keeps one and the consumer another.
pub struct IterationBuffer<T, E> {
    state: Rc<RefCell<BufferState<T, E>>>,
}

impl<T, E> Clone for IterationBuffer<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T, E> Default for IterationBuffer<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> IterationBuffer<T, E> {
    /// Create an empty, open buffer with no upstream.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(BufferState {
                queue: VecDeque::new(),
                pending_pulls: VecDeque::new(),
                closed: false,
                cancelled: false,
                upstream: None,
            })),
        }
    }

    /// Install the callback run when the consumer cancels.
    ///
    /// If the buffer has already been cancelled the callback runs immediately.
    /// Installing a second callback replaces one that has not run yet.
    pub fn on_cancel(&self, upstream: impl FnOnce() + 'static) {
        {
            let mut state = self.state.borrow_mut();
            if !state.cancelled {
                state.upstream = Some(Box::new(upstream));
                return;
            }
        }
        upstream();
    }

    /// Deliver a value to the oldest waiting pull, or queue it.
    ///
    /// Dropped once the buffer is closed.
    pub fn push(&self, value: T) {
        self.deliver(Some(Ok(value)), false);
    }

    /// Deliver an error. The sequence ends after it.
    pub fn fail(&self, error: E) {
        self.deliver(Some(Err(error)), true);
    }

    /// End the sequence from the producer side.
    ///
    /// Values already queued are still pulled before the end is observed.
    pub fn complete(&self) {
        self.deliver(None, true);
    }

    /// Request the next step.
    ///
    /// Resolves immediately if something is queued or the buffer is closed;
    /// otherwise waits for the next `push`, `fail`, `complete` or `cancel`.
    pub fn pull(&self) -> Pull<T, E> {
        let mut state = self.state.borrow_mut();

        if let Some(step) = state.queue.pop_front() {
            return Pull::ready(step);
        }
        if state.closed {
            return Pull::ready(None);
        }

        let (tx, rx) = oneshot::channel();
        state.pending_pulls.push_back(tx);
        Pull::waiting(rx)
    }

    /// Stop iterating.
    ///
    /// Runs the upstream callback (at most once over the buffer's lifetime),
    /// resolves every waiting pull with `None` and discards queued entries.
    /// Later pushes are dropped and later pulls resolve to `None`.
    pub fn cancel(&self) {
        let (upstream, pending) = {
            let mut state = self.state.borrow_mut();
            state.cancelled = true;
            state.closed = true;
            state.queue.clear();
            (
                state.upstream.take(),
                std::mem::take(&mut state.pending_pulls),
            )
        };

        if let Some(upstream) = upstream {
            trace!("iteration buffer cancelled, detaching upstream");
            upstream();
        }
        for tx in pending {
            let _ = tx.send(None);
        }
    }

    /// Whether the consumer has cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.state.borrow().cancelled
    }

    /// Whether new entries are still accepted.
    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    /// Number of entries waiting for a pull.
    pub fn queued(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Number of pulls waiting for an entry.
    pub fn waiting_pulls(&self) -> usize {
        self.state
            .borrow()
            .pending_pulls
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    fn deliver(&self, mut step: Step<T, E>, terminal: bool) {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return;
        }
        if terminal {
            state.closed = true;
        }

        while let Some(tx) = state.pending_pulls.pop_front() {
            match tx.send(step) {
                Ok(()) => {
                    if terminal {
                        // Pulls still parked behind a terminal entry see the end.
                        for tx in state.pending_pulls.drain(..) {
                            let _ = tx.send(None);
                        }
                    }
                    return;
                }
                // The pull was dropped before resolving; try the next one.
                Err(returned) => step = returned,
            }
        }

        state.queue.push_back(step);
    }
}

impl<T, E> fmt::Debug for IterationBuffer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("IterationBuffer")
            .field("queued", &state.queue.len())
            .field("pending_pulls", &state.pending_pulls.len())
            .field("closed", &state.closed)
            .field("cancelled", &state.cancelled)
            .finish()
    }
}
