//! Tasks scheduled on the event loop.
//!
//! Every unit of work the loop polls is a task: plain futures spawned with
//! [`spawn`], and bridge tasks created by [`green`](crate::green). Both are
//! observed through the same [`JoinHandle`].

pub(crate) mod core;
mod handle;
mod id;
mod state;
mod waker;

pub(crate) use self::core::{Runnable, Task, TaskFuture};
pub(crate) use waker::WakerSlot;

pub use self::core::spawn;
pub use handle::JoinHandle;
pub use id::TaskId;
