use crate::fiber::Fiber;
use crate::runtime::task::{Runnable, TaskId};
use crate::utils::lock;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::Duration;

/// The run queue of an event loop.
///
/// Tasks are pushed at the back when spawned or woken and popped from the
/// front by the loop, so wake-ups are served in the order they arrive.
/// Wakers fire from fiber threads too, hence the lock; the loop parks on
/// the condition variable while the queue is empty.
pub(crate) struct RunQueue {
    /// Tasks ready to be polled.
    queue: Mutex<VecDeque<Arc<dyn Runnable>>>,

    /// Signalled whenever a task is pushed.
    condvar: Condvar,

    /// Set once the owning loop is dropped.
    closed: AtomicBool,

    /// Every task spawned on the loop that is not done yet, queued or not.
    live: Mutex<HashMap<TaskId, Weak<dyn Runnable>>>,

    /// Suspended fibers of cancelled bridge tasks, parked until the loop
    /// is dropped.
    retired: Mutex<Vec<Fiber>>,
}

impl RunQueue {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            closed: AtomicBool::new(false),
            live: Mutex::new(HashMap::new()),
            retired: Mutex::new(Vec::new()),
        }
    }

    /// Pushes a task and wakes the loop if it is parked.
    ///
    /// Returns `false`, leaving the task untouched, once the queue is closed.
    pub(crate) fn push(&self, task: Arc<dyn Runnable>) -> bool {
        let mut queue = lock(&self.queue);

        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        queue.push_back(task);
        drop(queue);

        self.condvar.notify_one();
        true
    }

    /// Takes the next task to poll.
    pub(crate) fn pop(&self) -> Option<Arc<dyn Runnable>> {
        lock(&self.queue).pop_front()
    }

    /// Blocks until a task is pushed or `timeout` elapses.
    ///
    /// Returns immediately if work is already available or the queue is
    /// closed.
    pub(crate) fn park(&self, timeout: Duration) {
        let queue = lock(&self.queue);

        if !queue.is_empty() || self.closed.load(Ordering::Acquire) {
            return;
        }

        let _ = self.condvar.wait_timeout(queue, timeout);
    }

    /// Closes the queue and hands back the tasks still in it.
    ///
    /// The tasks are returned rather than dropped here: dropping a task
    /// body may push to this queue again.
    pub(crate) fn close(&self) -> Vec<Arc<dyn Runnable>> {
        let mut queue = lock(&self.queue);
        self.closed.store(true, Ordering::Release);

        let pending = queue.drain(..).collect();
        drop(queue);

        self.condvar.notify_all();
        pending
    }

    /// Records a task so it can be shut down with the loop.
    pub(crate) fn track(&self, id: TaskId, task: Weak<dyn Runnable>) {
        lock(&self.live).insert(id, task);
    }

    /// Forgets a task once it is done.
    pub(crate) fn forget(&self, id: TaskId) {
        lock(&self.live).remove(&id);
    }

    /// Takes every task that is not done yet.
    pub(crate) fn drain_live(&self) -> Vec<Arc<dyn Runnable>> {
        let live = std::mem::take(&mut *lock(&self.live));

        live.into_values().filter_map(|task| task.upgrade()).collect()
    }

    /// Parks a fiber that must never be resumed again.
    ///
    /// The fiber stays blocked at its suspension point while the loop
    /// lives. Once the queue is closed it is dropped right away instead.
    pub(crate) fn retire(&self, fiber: Fiber) {
        let mut retired = lock(&self.retired);

        if self.is_closed() {
            drop(retired);
            drop(fiber);
            return;
        }

        retired.push(fiber);
    }

    /// Takes every parked fiber.
    pub(crate) fn take_retired(&self) -> Vec<Fiber> {
        std::mem::take(&mut *lock(&self.retired))
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.queue).len()
    }
}
