use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    task::Waker,
};

/// FIFO queue of work deferred to the next turn.
///
/// Each store owns one, so deferred work from independent stores never
/// interleaves. Tasks pushed while the queue is being drained run in the same
/// drain, after everything queued before them.
pub(crate) struct TaskQueue<T> {
    tasks: RefCell<VecDeque<T>>,
    draining: Cell<bool>,
    waiters: RefCell<Vec<Waker>>,
}

impl<T> TaskQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            tasks: RefCell::new(VecDeque::new()),
            draining: Cell::new(false),
            waiters: RefCell::new(Vec::new()),
        }
    }

    /// Queue a task and wake every task parked on this queue.
    pub(crate) fn defer(&self, task: T) {
        self.tasks.borrow_mut().push_back(task);

        let waiters = std::mem::take(&mut *self.waiters.borrow_mut());
        for waker in waiters {
            waker.wake();
        }
    }

    /// Wake `waker` the next time a task is deferred.
    pub(crate) fn wake_on_defer(&self, waker: &Waker) {
        let mut waiters = self.waiters.borrow_mut();
        if !waiters.iter().any(|w| w.will_wake(waker)) {
            waiters.push(waker.clone());
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    pub(crate) fn is_draining(&self) -> bool {
        self.draining.get()
    }

    /// Run queued tasks in order until the queue is empty.
    ///
    /// Returns the number of tasks run. A nested call made from inside `run`
    /// returns 0 without running anything.
    pub(crate) fn drain(&self, mut run: impl FnMut(T)) -> usize {
        if self.draining.replace(true) {
            return 0;
        }
        let _guard = DrainGuard(&self.draining);

        let mut ran = 0;
        loop {
            let next = self.tasks.borrow_mut().pop_front();
            let Some(task) = next else {
                break;
            };
            run(task);
            ran += 1;
        }
        ran
    }
}

struct DrainGuard<'a>(&'a Cell<bool>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}
