use super::JoinHandle;
use super::id::TaskId;
use super::state::{CANCELLED, COMPLETED, IDLE, NOTIFIED, QUEUED, RUNNING};
use crate::error::JoinError;
use crate::runtime::context;
use crate::runtime::queue::RunQueue;
use crate::utils::lock;

use std::future::Future;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::task::{Context, Poll, Waker};

/// The body of a task: a boxed future producing the task result.
pub(crate) type TaskFuture<T> = Pin<Box<dyn Future<Output = Result<T, JoinError>> + Send>>;

type Callback<T> = Box<dyn FnOnce(&Result<T, JoinError>) + Send>;

/// A runnable unit of work that can be executed by the event loop.
///
/// The `Runnable` trait abstracts the specific return type of a task,
/// allowing the run queue to hold a heterogeneous collection of tasks
/// through `Arc<dyn Runnable>`.
pub(crate) trait Runnable: Send + Sync {
    /// Polls the task once. Called by the event loop only.
    fn run(self: Arc<Self>);

    /// Cancels the task because its event loop is going away.
    fn shutdown(&self);
}

/// A task managed by the event loop.
///
/// A `Task` owns its body until the body finishes or the task is cancelled,
/// and keeps the terminal result in a write-once cell afterwards. Whichever
/// of completion and cancellation fills the cell first decides the result.
pub(crate) struct Task<T> {
    id: TaskId,

    /// The body, `None` once it finished or was dropped by cancellation.
    future: Mutex<Option<TaskFuture<T>>>,

    /// Terminal result, written exactly once.
    outcome: OnceLock<Result<T, JoinError>>,

    /// Scheduling state (IDLE, QUEUED, RUNNING, ...).
    state: AtomicUsize,

    /// Run queue the task is pushed to when woken.
    queue: Arc<RunQueue>,

    /// Wakers of `JoinHandle`s awaiting this task.
    waiters: Mutex<Vec<Waker>>,

    /// Done callbacks registered through `JoinHandle::add_done_callback`.
    callbacks: Mutex<Vec<Callback<T>>>,
}

impl<T> Task<T> {
    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn outcome(&self) -> Option<&Result<T, JoinError>> {
        self.outcome.get()
    }

    /// Registers `waker` unless an equivalent one is already waiting.
    pub(crate) fn add_waiter(&self, waker: &Waker) {
        let mut waiters = lock(&self.waiters);

        if !waiters.iter().any(|current| current.will_wake(waker)) {
            waiters.push(waker.clone());
        }
    }
}

impl<T: Send + Sync + 'static> Task<T> {
    /// Creates a task in the `QUEUED` state. The caller pushes it.
    pub(crate) fn new(id: TaskId, future: TaskFuture<T>, queue: Arc<RunQueue>) -> Self {
        Self {
            id,
            future: Mutex::new(Some(future)),
            outcome: OnceLock::new(),
            state: AtomicUsize::new(QUEUED),
            queue,
            waiters: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Polls the body once.
    ///
    /// A panic escaping the body is caught and becomes the task result, so
    /// one failing task never takes the event loop down.
    pub(crate) fn run(self: Arc<Self>) {
        let current = self.state.load(Ordering::Acquire);

        if current != QUEUED && current != NOTIFIED {
            return;
        }

        if self
            .state
            .compare_exchange(current, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let waker = Waker::from(self.clone());
        let mut cx = Context::from_waker(&waker);

        let polled = {
            let mut slot = lock(&self.future);
            let Some(future) = slot.as_mut() else {
                return;
            };

            let polled = panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)));

            if !matches!(polled, Ok(Poll::Pending)) {
                slot.take();
            }

            polled
        };

        match polled {
            Ok(Poll::Pending) => self.park(),
            Ok(Poll::Ready(result)) => self.complete(result),
            Err(payload) => {
                log::debug!("{} panicked", self.id);
                self.complete(Err(JoinError::panicked(payload)));
            }
        }
    }

    /// Leaves the `RUNNING` state after a pending poll.
    fn park(self: Arc<Self>) {
        match self
            .state
            .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(NOTIFIED) => {
                // Woken while running: back to the queue right away.
                if self
                    .state
                    .compare_exchange(NOTIFIED, QUEUED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    self.queue.push(self.clone());
                } else {
                    self.drop_body();
                }
            }
            // Cancelled while running; the body could not be dropped then.
            Err(_) => self.drop_body(),
        }
    }

    /// Signals the task to be rescheduled.
    ///
    /// If the task is `IDLE`, it moves to `QUEUED` and is pushed to the run
    /// queue. If the task is `RUNNING`, it moves to `NOTIFIED` so it is
    /// re-polled right after its current poll.
    pub(crate) fn schedule(self: Arc<Self>) {
        loop {
            match self.state.load(Ordering::Acquire) {
                IDLE => {
                    if self
                        .state
                        .compare_exchange(IDLE, QUEUED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.queue.push(self.clone());
                        return;
                    }
                }
                RUNNING => {
                    if self
                        .state
                        .compare_exchange(RUNNING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                // Already queued, notified or finished.
                _ => return,
            }
        }
    }

    /// Cancels the task. Returns `false` if it already had a result.
    pub(crate) fn cancel(&self) -> bool {
        if self.outcome.set(Err(JoinError::Cancelled)).is_err() {
            return false;
        }

        let previous = self.state.swap(CANCELLED, Ordering::AcqRel);
        log::debug!("{} cancelled", self.id);

        // The loop holds the body while polling it; `park` drops it after.
        if previous != RUNNING && previous != NOTIFIED {
            self.drop_body();
        }

        self.finish();
        true
    }

    /// Drops the body outside of its lock, as dropping it may spawn.
    fn drop_body(&self) {
        let body = lock(&self.future).take();
        drop(body);
    }

    pub(crate) fn add_done_callback(&self, callback: Callback<T>) {
        let mut callbacks = lock(&self.callbacks);

        match self.outcome.get() {
            Some(result) => {
                drop(callbacks);
                callback(result);
            }
            None => callbacks.push(callback),
        }
    }

    fn complete(&self, result: Result<T, JoinError>) {
        if self.outcome.set(result).is_err() {
            // Cancelled while running; the cancellation stands.
            return;
        }

        self.state.store(COMPLETED, Ordering::Release);
        self.finish();
    }

    /// Wakes every waiter and runs the done callbacks.
    fn finish(&self) {
        self.queue.forget(self.id);

        let waiters = mem::take(&mut *lock(&self.waiters));
        for waker in waiters {
            waker.wake();
        }

        let callbacks = mem::take(&mut *lock(&self.callbacks));
        let Some(result) = self.outcome.get() else {
            return;
        };

        for callback in callbacks {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(result))) {
                log::error!(
                    "done callback of {} panicked: {}",
                    self.id,
                    crate::error::panic_message(payload.as_ref())
                );
            }
        }
    }
}

impl<T: Send + Sync + 'static> Runnable for Task<T> {
    fn run(self: Arc<Self>) {
        Task::run(self)
    }

    fn shutdown(&self) {
        self.cancel();
    }
}

/// Spawns a future as a task onto the current event loop.
///
/// Works on the loop thread while the loop runs, and inside bridge tasks.
///
/// # Panics
///
/// Panics if called outside the context of an event loop.
///
/// # Examples
///
/// ```rust,ignore
/// let handle = fibril::task::spawn(async { 40 + 2 });
/// assert_eq!(handle.await, Ok(42));
/// ```
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + Sync + 'static,
{
    context::current_handle()
        .expect("spawn must be called within the context of an event loop")
        .spawn(future)
}
