use std::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::sync::oneshot;

use super::Step;

enum PullState<T, E> {
    Ready(Option<Step<T, E>>),
    Waiting(oneshot::Receiver<Step<T, E>>),
}

/// A single outstanding request for the next step of an
/// [`IterationBuffer`](super::IterationBuffer).
///
/// Dropping a waiting pull gives up its place in line; the value it would have
/// received goes to the next waiting pull or back into the queue.
#[must_use = "a pull does nothing unless awaited"]
pub struct Pull<T, E> {
    state: PullState<T, E>,
}

impl<T, E> Pull<T, E> {
    pub(super) fn ready(step: Step<T, E>) -> Self {
        Self {
            state: PullState::Ready(Some(step)),
        }
    }

    pub(super) fn waiting(rx: oneshot::Receiver<Step<T, E>>) -> Self {
        Self {
            state: PullState::Waiting(rx),
        }
    }

    /// Whether this pull resolved without waiting.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, PullState::Ready(_))
    }
}

// The receiver is the only field polled, and it is `Unpin` itself.
impl<T, E> Unpin for Pull<T, E> {}

impl<T, E> Future for Pull<T, E> {
    type Output = Step<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            PullState::Ready(step) => Poll::Ready(step.take().flatten()),
            // A dropped sender means the buffer itself is gone.
            PullState::Waiting(rx) => Pin::new(rx).poll(cx).map(|result| result.ok().flatten()),
        }
    }
}

impl<T, E> fmt::Debug for Pull<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            PullState::Ready(_) => "ready",
            PullState::Waiting(_) => "waiting",
        };
        f.debug_struct("Pull").field("state", &state).finish()
    }
}
