//! Single-value reactive store.
//!
//! A [`Store`] holds one current value. Writers change it with
//! [`update`](Store::update); readers either register a callback with
//! [`listen`](Store::listen) or iterate a [`Subscription`] stream. Every
//! listener gets the current value once when it registers and then every value
//! produced by an update that changed something.
//!
//! Delivery happens in two ways. An update made outside any dispatch fans out
//! synchronously before `update` returns. Everything else (initial deliveries,
//! the follow-up dispatch for updates made from inside a listener, failure
//! reports) is deferred to the store's own task queue and runs on the next
//! turn: an explicit [`flush`](Store::flush), [`settle`](Store::settle), or a
//! poll of any of its subscriptions.
//!
//! ```rust
//! use std::{cell::RefCell, rc::Rc};
//! use tidepool::Store;
//!
//! let store = Store::new(1);
//! let seen = Rc::new(RefCell::new(Vec::new()));
//!
//! let log = Rc::clone(&seen);
//! let _listening = store.listen(move |value| log.borrow_mut().push(*value));
//! store.flush();
//!
//! store.update(2).unwrap();
//! assert_eq!(*seen.borrow(), vec![1, 2]);
//! ```

mod handle;
mod hooks;
mod listeners;
mod merge;
mod subscription;

#[cfg(test)]
mod tests;

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
    task::Waker,
};

use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::{
    Result, StoreError,
    buffer::IterationBuffer,
    schedule::TaskQueue,
};

pub use handle::Listening;
pub use hooks::{Lifecycle, NoHooks};
pub use listeners::ListenerId;
pub use merge::{FieldMerge, Merge, Replace};
pub use subscription::Subscription;

use handle::Registry;
use listeners::{Callback, ListenerSet, Slot, Transition};

/// A store of JSON objects whose updates merge fields.
pub type JsonStore = Store<Map<String, Value>, FieldMerge>;

/// Work that runs on the store's next turn.
enum Deferred<V> {
    /// First delivery to a newly registered listener.
    Deliver(Rc<Slot<V>>),
    /// Follow-up fan-out for updates made during a dispatch.
    Notify,
    /// A listener failure caught during an earlier dispatch.
    Report(StoreError),
}

struct Core<V, M> {
    value: RefCell<Rc<V>>,
    merge: M,
    listeners: RefCell<ListenerSet<V>>,
    notifying: Cell<bool>,
    notify_queued: Cell<bool>,
    tasks: TaskQueue<Deferred<V>>,
    hooks: RefCell<Rc<dyn Lifecycle>>,
    next_id: Cell<u64>,
}

/// A single-value reactive container.
///
/// `V` is the stored value and `M` the [`Merge`] strategy that folds patches
/// into it. Cloning a store yields another handle to the same value.
///
/// Stores are single-threaded: values, listeners and deferred work live behind
/// `Rc` and are never shared across threads.
pub struct Store<V, M = Replace> {
    core: Rc<Core<V, M>>,
}

/// A non-owning reference to a [`Store`], for hooks and listeners that must
/// not keep the store alive.
pub struct WeakStore<V, M = Replace> {
    core: Weak<Core<V, M>>,
}

impl<V, M> Clone for Store<V, M> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<V, M> Clone for WeakStore<V, M> {
    fn clone(&self) -> Self {
        Self {
            core: Weak::clone(&self.core),
        }
    }
}

impl<V, M> WeakStore<V, M> {
    /// The store, if it is still alive.
    pub fn upgrade(&self) -> Option<Store<V, M>> {
        self.core.upgrade().map(|core| Store { core })
    }
}

impl<V: Clone + PartialEq + 'static> Store<V, Replace> {
    /// Create a store whose updates replace the value.
    pub fn new(initial: V) -> Self {
        Self::with_merge(initial, Replace)
    }
}

impl<V: Clone + PartialEq + Default + 'static> Default for Store<V, Replace> {
    fn default() -> Self {
        Self::new(V::default())
    }
}

impl Store<Map<String, Value>, FieldMerge> {
    /// Create a field-merging store from a JSON object.
    ///
    /// The object's fields are copied into the store. `null` starts the store
    /// with an empty object.
    ///
    /// # Errors
    /// Returns `StoreError::InvalidArgument` if `initial` is neither an object
    /// nor `null`.
    pub fn from_json(initial: Value) -> Result<Self> {
        let fields = merge::object_from_json(initial)?;
        Ok(Self::with_merge(fields, FieldMerge))
    }
}

impl<V: Clone + 'static, M: Merge<V> + 'static> Store<V, M> {
    /// Create a store with an explicit merge strategy.
    pub fn with_merge(initial: V, merge: M) -> Self {
        Self {
            core: Rc::new(Core {
                value: RefCell::new(Rc::new(initial)),
                merge,
                listeners: RefCell::new(ListenerSet::Empty),
                notifying: Cell::new(false),
                notify_queued: Cell::new(false),
                tasks: TaskQueue::new(),
                hooks: RefCell::new(Rc::new(NoHooks)),
                next_id: Cell::new(1),
            }),
        }
    }

    /// Replace the lifecycle hooks.
    pub fn set_hooks(&self, hooks: impl Lifecycle + 'static) {
        *self.core.hooks.borrow_mut() = Rc::new(hooks);
    }

    /// A reference that does not keep the store alive.
    pub fn downgrade(&self) -> WeakStore<V, M> {
        WeakStore {
            core: Rc::downgrade(&self.core),
        }
    }

    /// The current value.
    ///
    /// The returned `Rc` is the same allocation listeners receive. Later
    /// updates never change it; they publish a new one.
    pub fn value(&self) -> Rc<V> {
        Rc::clone(&self.core.value.borrow())
    }

    /// A copy of the current value.
    pub fn get(&self) -> V {
        V::clone(&self.core.value.borrow())
    }

    /// Project the current value.
    pub fn read<R>(&self, f: impl FnOnce(&V) -> R) -> R {
        let value = self.value();
        f(&value)
    }

    /// Fold `patch` into the value and notify listeners if it changed.
    ///
    /// Outside a dispatch, listeners run before this returns. From inside a
    /// listener the value changes immediately but the fan-out is deferred;
    /// any number of such updates share one follow-up dispatch.
    ///
    /// Returns whether the value changed.
    ///
    /// # Errors
    /// Returns `StoreError::InvalidArgument` if the merge strategy rejects the
    /// patch. The value is unchanged in that case.
    pub fn update(&self, patch: M::Patch) -> Result<bool> {
        let next = {
            let current = self.value();
            self.core.merge.merge(&current, patch)?
        };
        let Some(next) = next else {
            return Ok(false);
        };

        *self.core.value.borrow_mut() = Rc::new(next);
        self.core.publish();
        Ok(true)
    }

    /// Compute a patch from the current value and apply it.
    ///
    /// Returning `None` leaves the store untouched.
    ///
    /// # Errors
    /// Same as [`update`](Store::update).
    pub fn update_with(&self, f: impl FnOnce(&V) -> Option<M::Patch>) -> Result<bool> {
        let patch = {
            let current = self.value();
            f(&current)
        };

        match patch {
            Some(patch) => self.update(patch),
            None => Ok(false),
        }
    }

    /// Edit a copy of the value in place and publish it.
    ///
    /// There is no change detection here; listeners are always notified.
    pub fn modify(&self, f: impl FnOnce(&mut V)) {
        let mut next = self.get();
        f(&mut next);
        *self.core.value.borrow_mut() = Rc::new(next);
        self.core.publish();
    }

    /// Register a callback for the current value and every change.
    ///
    /// Wakes the store if this is its first listener. The current value is
    /// delivered on the next turn, not from inside this call, so a listener
    /// registered during a dispatch is not handed the same value twice.
    pub fn listen(&self, mut listener: impl FnMut(&V) + 'static) -> Listening {
        self.register(Box::new(move |value: &Rc<V>| listener(&**value)))
    }

    /// Iterate the current value and every change as a stream.
    ///
    /// The subscription is a listener like any other: it counts toward
    /// wake/sleep and is removed when cancelled or dropped.
    pub fn subscribe(&self) -> Subscription<V> {
        let buffer = IterationBuffer::new();
        let sink = subscription::Sink::new(buffer.clone());
        let listening = self.register(Box::new(move |value: &Rc<V>| sink.push(value)));
        buffer.on_cancel(move || listening.cancel());

        Subscription::new(buffer, self.registry())
    }

    /// Number of registered listeners, including ones awaiting their first value.
    pub fn listener_count(&self) -> usize {
        self.core.listeners.borrow().len()
    }

    /// Whether anyone is listening.
    pub fn is_observed(&self) -> bool {
        !self.core.listeners.borrow().is_empty()
    }

    /// Number of tasks waiting for the next turn.
    pub fn pending_tasks(&self) -> usize {
        self.core.tasks.len()
    }

    /// Run deferred work now.
    ///
    /// Runs until the queue is empty, including work queued along the way, and
    /// returns how many tasks ran. Does nothing when called from inside a
    /// dispatch or another flush.
    pub fn flush(&self) -> usize {
        self.core.drain_deferred()
    }

    /// Flush repeatedly, yielding to the runtime in between, until no deferred
    /// work remains.
    pub async fn settle(&self) {
        loop {
            self.flush();
            tokio::task::yield_now().await;
            if self.core.tasks.is_empty() {
                break;
            }
        }
    }

    fn register(&self, callback: Callback<V>) -> Listening {
        let id = ListenerId::new(self.core.next_id.get());
        self.core.next_id.set(self.core.next_id.get() + 1);

        let slot = Rc::new(Slot::new(id, callback));
        let transition = self.core.listeners.borrow_mut().add(Rc::clone(&slot));
        debug!(listener = %id, "listener registered");

        if transition == Transition::Woke {
            debug!("store woke");
            self.core.hooks().wake();
        }
        self.core.tasks.defer(Deferred::Deliver(slot));

        Listening::new(id, self.registry())
    }

    fn registry(&self) -> Weak<dyn Registry> {
        let core: Weak<Core<V, M>> = Rc::downgrade(&self.core);
        core
    }
}

impl<V, M> Core<V, M> {
    fn hooks(&self) -> Rc<dyn Lifecycle> {
        Rc::clone(&self.hooks.borrow())
    }

    /// Notify listeners of a new value, now or on the next turn.
    fn publish(&self) {
        if self.notifying.get() {
            if !self.notify_queued.replace(true) {
                trace!("update during dispatch, deferring fan-out");
                self.tasks.defer(Deferred::Notify);
            }
            return;
        }
        self.fan_out();
    }

    fn fan_out(&self) {
        let value = Rc::clone(&self.value.borrow());
        let targets = self.listeners.borrow().snapshot();
        let _dispatch = Dispatch::begin(&self.notifying);

        for slot in targets {
            // Cancelled since the snapshot was taken, or still awaiting its first value.
            if slot.is_active() {
                self.deliver(&slot, &value);
            }
        }
    }

    fn deliver_initial(&self, slot: &Slot<V>) {
        if !slot.activate() {
            return;
        }
        let value = Rc::clone(&self.value.borrow());
        let _dispatch = Dispatch::begin(&self.notifying);
        self.deliver(slot, &value);
    }

    fn deliver(&self, slot: &Slot<V>, value: &Rc<V>) {
        // An initial delivery and a deferred fan-out can both carry the current value.
        if !slot.mark_delivered(value) {
            trace!(listener = %slot.id(), "value already delivered, skipping");
            return;
        }
        if let Err(error) = slot.invoke(value) {
            debug!(listener = %slot.id(), %error, "delivery failed, reporting on next turn");
            self.tasks.defer(Deferred::Report(error));
        }
    }

    fn run(&self, task: Deferred<V>) {
        match task {
            Deferred::Deliver(slot) => self.deliver_initial(&slot),
            Deferred::Notify => {
                self.notify_queued.set(false);
                self.fan_out();
            }
            Deferred::Report(error) => self.hooks().listener_failed(&error),
        }
    }

    fn drain_deferred(&self) -> usize {
        if self.notifying.get() {
            return 0;
        }
        self.tasks.drain(|task| self.run(task))
    }
}

impl<V: 'static, M: 'static> Registry for Core<V, M> {
    fn release(&self, id: ListenerId) {
        let (removed, transition) = self.listeners.borrow_mut().remove(id);
        let Some(slot) = removed else {
            return;
        };
        slot.close();
        debug!(listener = %id, "listener removed");

        if transition == Transition::Slept {
            debug!("store sleeping");
            self.hooks().sleep();
        }
    }

    fn flush(&self) -> usize {
        self.drain_deferred()
    }

    fn wake_on_defer(&self, waker: &Waker) {
        self.tasks.wake_on_defer(waker);
    }
}

/// Marks the store as dispatching for as long as it is held.
struct Dispatch<'a> {
    flag: &'a Cell<bool>,
    previous: bool,
}

impl<'a> Dispatch<'a> {
    fn begin(flag: &'a Cell<bool>) -> Self {
        let previous = flag.replace(true);
        Self { flag, previous }
    }
}

impl Drop for Dispatch<'_> {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}

impl<V: fmt::Debug, M> fmt::Debug for Store<V, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("value", &self.core.value.borrow())
            .field("listeners", &self.core.listeners.borrow().len())
            .field("pending_tasks", &self.core.tasks.len())
            .field("draining", &self.core.tasks.is_draining())
            .finish()
    }
}
