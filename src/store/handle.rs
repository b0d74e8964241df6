use std::{cell::Cell, fmt, rc::Weak, task::Waker};

use super::ListenerId;

/// The parts of a store that handles and subscriptions need, independent of
/// the value type.
pub(crate) trait Registry {
    /// Remove a listener, firing `sleep` if it was the last one.
    fn release(&self, id: ListenerId);

    /// Run deferred work; see `Store::flush`.
    fn flush(&self) -> usize;

    fn wake_on_defer(&self, waker: &Waker);
}

/// Handle to one listener registration.
///
/// Dropping the handle cancels the registration, the same as calling
/// [`cancel`](Listening::cancel). Use [`detach`](Listening::detach) to keep the
/// listener for as long as the store lives.
#[must_use = "dropping a Listening handle cancels the listener"]
pub struct Listening {
    id: ListenerId,
    registry: Weak<dyn Registry>,
    released: Cell<bool>,
}

impl Listening {
    pub(crate) fn new(id: ListenerId, registry: Weak<dyn Registry>) -> Self {
        Self {
            id,
            registry,
            released: Cell::new(false),
        }
    }

    /// The registration this handle controls.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        !self.released.get() && self.registry.strong_count() > 0
    }

    /// Remove the listener. Calls after the first do nothing.
    pub fn cancel(&self) {
        if self.released.replace(true) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.release(self.id);
        }
    }

    /// Give up the handle without cancelling.
    pub fn detach(self) {
        self.released.set(true);
    }
}

impl Drop for Listening {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Listening {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listening")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
