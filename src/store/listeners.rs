use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    fmt,
    panic::{self, AssertUnwindSafe},
    rc::{Rc, Weak},
};

use crate::StoreError;

/// Identifies one listener registration within a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) type Callback<V> = Box<dyn FnMut(&Rc<V>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotState {
    /// Registered, initial delivery not yet run.
    Pending,
    Active,
    Closed,
}

/// One registered listener.
pub(crate) struct Slot<V> {
    id: ListenerId,
    state: Cell<SlotState>,
    callback: RefCell<Callback<V>>,
    // Holding the allocation keeps its address from being reused.
    last: RefCell<Weak<V>>,
}

impl<V> Slot<V> {
    pub(crate) fn new(id: ListenerId, callback: Callback<V>) -> Self {
        Self {
            id,
            state: Cell::new(SlotState::Pending),
            callback: RefCell::new(callback),
            last: RefCell::new(Weak::new()),
        }
    }

    pub(crate) fn id(&self) -> ListenerId {
        self.id
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state.get() == SlotState::Active
    }

    /// Promote a pending slot to active. False if it was closed meanwhile.
    pub(crate) fn activate(&self) -> bool {
        match self.state.get() {
            SlotState::Pending => {
                self.state.set(SlotState::Active);
                true
            }
            SlotState::Active => true,
            SlotState::Closed => false,
        }
    }

    pub(crate) fn close(&self) {
        self.state.set(SlotState::Closed);
    }

    /// Record `value` as delivered. False if this slot already received it.
    pub(crate) fn mark_delivered(&self, value: &Rc<V>) -> bool {
        let mut last = self.last.borrow_mut();
        if std::ptr::eq(last.as_ptr(), Rc::as_ptr(value)) {
            return false;
        }
        *last = Rc::downgrade(value);
        true
    }

    /// Run the callback, converting a panic or a reentrant call into an error.
    pub(crate) fn invoke(&self, value: &Rc<V>) -> Result<(), StoreError> {
        let Ok(mut callback) = self.callback.try_borrow_mut() else {
            return Err(StoreError::ReentrantDelivery { listener: self.id });
        };

        panic::catch_unwind(AssertUnwindSafe(|| (*callback)(value))).map_err(|payload| {
            StoreError::ListenerFailure {
                listener: self.id,
                message: panic_message(payload.as_ref()),
            }
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "listener panicked".to_string()
    }
}

/// Effect of a registration change on the store's observed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// First registration; the store woke up.
    Woke,
    /// Last registration removed; the store went to sleep.
    Slept,
    Steady,
}

/// The registered listeners, specialised for the common single-listener case.
pub(crate) enum ListenerSet<V> {
    Empty,
    One(Rc<Slot<V>>),
    Many(BTreeMap<ListenerId, Rc<Slot<V>>>),
}

impl<V> ListenerSet<V> {
    pub(crate) fn add(&mut self, slot: Rc<Slot<V>>) -> Transition {
        match std::mem::replace(self, ListenerSet::Empty) {
            ListenerSet::Empty => {
                *self = ListenerSet::One(slot);
                Transition::Woke
            }
            ListenerSet::One(existing) => {
                let mut many = BTreeMap::new();
                many.insert(existing.id(), existing);
                many.insert(slot.id(), slot);
                *self = ListenerSet::Many(many);
                Transition::Steady
            }
            ListenerSet::Many(mut many) => {
                many.insert(slot.id(), slot);
                *self = ListenerSet::Many(many);
                Transition::Steady
            }
        }
    }

    /// Remove a listener, returning it so the caller can drop it outside any borrow.
    pub(crate) fn remove(&mut self, id: ListenerId) -> (Option<Rc<Slot<V>>>, Transition) {
        match std::mem::replace(self, ListenerSet::Empty) {
            ListenerSet::Empty => (None, Transition::Steady),
            ListenerSet::One(slot) if slot.id() == id => (Some(slot), Transition::Slept),
            ListenerSet::One(slot) => {
                *self = ListenerSet::One(slot);
                (None, Transition::Steady)
            }
            ListenerSet::Many(mut many) => {
                let removed = many.remove(&id);
                *self = match many.len() {
                    0 => ListenerSet::Empty,
                    1 => match many.pop_first() {
                        Some((_, last)) => ListenerSet::One(last),
                        None => ListenerSet::Empty,
                    },
                    _ => ListenerSet::Many(many),
                };
                let transition = if removed.is_some() && self.is_empty() {
                    Transition::Slept
                } else {
                    Transition::Steady
                };
                (removed, transition)
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            ListenerSet::Empty => 0,
            ListenerSet::One(_) => 1,
            ListenerSet::Many(many) => many.len(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        matches!(self, ListenerSet::Empty)
    }

    /// Stable copy of the current registrations, in registration order.
    pub(crate) fn snapshot(&self) -> Vec<Rc<Slot<V>>> {
        match self {
            ListenerSet::Empty => Vec::new(),
            ListenerSet::One(slot) => vec![Rc::clone(slot)],
            ListenerSet::Many(many) => many.values().cloned().collect(),
        }
    }
}
