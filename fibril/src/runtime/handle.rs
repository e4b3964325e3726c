use crate::error::JoinError;
use crate::fiber::Fiber;
use crate::runtime::queue::RunQueue;
use crate::runtime::task::{JoinHandle, Task, TaskFuture, TaskId};

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

/// A cloneable reference to an event loop.
///
/// A `Handle` spawns tasks onto its loop from any thread. Tasks spawned
/// once the loop is dropped are cancelled right away.
#[derive(Clone)]
pub struct Handle {
    name: Arc<str>,
    queue: Arc<RunQueue>,
}

impl Handle {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            queue: Arc::new(RunQueue::new()),
        }
    }

    /// Name of the event loop.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` once the event loop has been dropped.
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Spawns a future onto the event loop.
    ///
    /// The task starts on the next loop step. A panic inside the future
    /// is reported as [`JoinError::Panicked`].
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + Sync + 'static,
    {
        let body = Box::pin(async move { Ok::<_, JoinError>(future.await) });
        self.spawn_with_id(TaskId::next(), body)
    }

    /// Schedules a task body under a preallocated identifier.
    pub(crate) fn spawn_with_id<T>(&self, id: TaskId, future: TaskFuture<T>) -> JoinHandle<T>
    where
        T: Send + Sync + 'static,
    {
        let task = Arc::new(Task::new(id, future, self.queue.clone()));

        let weak: Weak<Task<T>> = Arc::downgrade(&task);
        self.queue.track(id, weak);

        if !self.queue.push(task.clone()) {
            log::debug!("event loop `{}` is closed, cancelling {id}", self.name);
            task.cancel();
        }

        JoinHandle { task }
    }

    /// Keeps an abandoned fiber parked until the loop is dropped.
    pub(crate) fn retire(&self, fiber: Fiber) {
        self.queue.retire(fiber);
    }

    pub(crate) fn queue(&self) -> &RunQueue {
        &self.queue
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("name", &self.name)
            .field("queued", &self.queue.len())
            .finish()
    }
}
