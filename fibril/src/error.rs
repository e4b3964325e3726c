//! Error types shared by fibers, the bridge and the event loop.
//!
//! The three layers report failures with separate enums so callers can tell
//! a misuse of the bridge apart from a panic raised by application code:
//!
//! - [`FiberError`]: the context switch primitive was driven incorrectly,
//! - [`BridgeError`]: a bridge task broke the suspend-on-future protocol,
//! - [`JoinError`]: what an observer of a finished task sees.

use crate::task::TaskId;

use std::any::Any;
use thiserror::Error;

/// Errors reported by [`Fiber`](crate::fiber::Fiber) and
/// [`suspend_current`](crate::fiber::suspend_current).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FiberError {
    /// `suspend_current` was called on a thread that is not running a fiber.
    #[error("suspend_current must be called from inside a running fiber")]
    NotInFiber,

    /// The fiber already returned or panicked.
    #[error("fiber has already finished and cannot be resumed")]
    Finished,

    /// The backing thread of the fiber could not be started.
    #[error("failed to start fiber thread: {0}")]
    Spawn(String),

    /// The backing thread went away without reporting an outcome.
    #[error("fiber thread terminated without reporting an outcome")]
    Lost,
}

/// Errors raised by the green task bridge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// `await_future` was called outside of a fiber driven by a bridge task.
    #[error(
        "`green::await_future` must be called from a bridge task or a coroutine it drives"
    )]
    OutsideTask,

    /// The fiber suspended with something that is not an await request.
    ///
    /// The fiber is abandoned and never resumed again.
    #[error("bridge tasks may only suspend on futures, got `{payload}` in {task}")]
    ProtocolViolation {
        /// Task whose fiber misbehaved.
        task: TaskId,
        /// Type name of the offending payload.
        payload: &'static str,
    },

    /// A resumed value did not have the type the suspension point expected.
    #[error("fiber resumed with `{found}` where `{expected}` was expected")]
    Mismatch {
        /// Type name the suspension point asked for.
        expected: &'static str,
        /// Type name of the value actually delivered.
        found: &'static str,
    },

    /// The fiber behind the task could not be driven.
    #[error(transparent)]
    Fiber(#[from] FiberError),
}

/// The failure side of a task result.
///
/// Native tasks and bridge tasks report failures through the same type, so
/// an observer cannot tell which kind of task produced a panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    /// The task was cancelled before it produced a result.
    #[error("task was cancelled")]
    Cancelled,

    /// The task body panicked; carries the panic message.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The bridge task was misused or its fiber failed.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl JoinError {
    /// Builds a [`JoinError::Panicked`] from a caught panic payload.
    pub(crate) fn panicked(payload: Box<dyn Any + Send>) -> Self {
        Self::Panicked(panic_message(payload.as_ref()))
    }

    /// Returns `true` if the task was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if the task body panicked.
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }

    /// Returns the panic message, if the task panicked.
    pub fn panic_message(&self) -> Option<&str> {
        match self {
            Self::Panicked(message) => Some(message),
            _ => None,
        }
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_owned()
    }
}
