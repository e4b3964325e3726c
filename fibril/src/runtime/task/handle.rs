use super::core::Task;
use super::id::TaskId;
use crate::error::JoinError;

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A handle to a spawned task.
///
/// `JoinHandle` is the same for native tasks and bridge tasks. It can be
/// cloned freely; every clone observes the same task.
///
/// Once the task is done its result never changes: [`result`](Self::result)
/// and awaiting the handle return the same value every time.
///
/// Dropping a `JoinHandle` does **not** cancel the task.
pub struct JoinHandle<T> {
    /// Shared reference to the underlying task.
    pub(crate) task: Arc<Task<T>>,
}

impl<T> JoinHandle<T> {
    /// Identifier of the task.
    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    /// Returns `true` once the task has a result, including cancellation.
    pub fn is_done(&self) -> bool {
        self.task.outcome().is_some()
    }
}

impl<T: Send + Sync + 'static> JoinHandle<T> {
    /// Cancels the task.
    ///
    /// Observers see [`JoinError::Cancelled`]. The body is dropped without
    /// being polled again, right after the current poll if the task is
    /// running. A bridge fiber is never interrupted: a suspended one stays
    /// parked until the event loop is dropped.
    ///
    /// Returns `false` if the task was already done.
    pub fn cancel(&self) -> bool {
        self.task.cancel()
    }

    /// Registers `callback` to run once the task is done.
    ///
    /// If the task is already done, the callback runs immediately on the
    /// calling thread.
    pub fn add_done_callback<F>(&self, callback: F)
    where
        F: FnOnce(&Result<T, JoinError>) + Send + 'static,
    {
        self.task.add_done_callback(Box::new(callback));
    }
}

impl<T: Clone> JoinHandle<T> {
    /// Returns the result of the task, or `None` while it is still running.
    pub fn result(&self) -> Option<Result<T, JoinError>> {
        self.task.outcome().cloned()
    }
}

impl<T> Clone for JoinHandle<T> {
    fn clone(&self) -> Self {
        Self {
            task: self.task.clone(),
        }
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle")
            .field("id", &self.id())
            .field("done", &self.is_done())
            .finish()
    }
}

impl<T: Clone> Future for JoinHandle<T> {
    type Output = Result<T, JoinError>;

    /// The waker is registered **before** re-checking the outcome to avoid
    /// missed wake-ups.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(result) = self.task.outcome() {
            return Poll::Ready(result.clone());
        }

        self.task.add_waiter(cx.waker());

        match self.task.outcome() {
            Some(result) => Poll::Ready(result.clone()),
            None => Poll::Pending,
        }
    }
}
