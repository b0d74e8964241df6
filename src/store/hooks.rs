use tracing::error;

use crate::StoreError;

/// Lifecycle callbacks for a [`Store`](super::Store).
///
/// `wake` runs when the first listener registers and `sleep` when the last one
/// leaves, which is where an upstream source (a socket, a file watcher) should
/// be started and stopped. Hooks that need to reach the store should hold a
/// [`WeakStore`](super::WeakStore) so the store can still be dropped.
pub trait Lifecycle {
    /// The store went from zero listeners to one.
    fn wake(&self) {}

    /// The store went from one or more listeners to zero.
    fn sleep(&self) {}

    /// A listener failed during a previous dispatch.
    ///
    /// Called on the turn after the failure, never from inside the dispatch.
    fn listener_failed(&self, error: &StoreError) {
        error!(%error, "store listener failed");
    }
}

/// The default hooks: nothing on wake or sleep, failures logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl Lifecycle for NoHooks {}
