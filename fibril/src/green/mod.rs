//! The green task bridge.
//!
//! This module lets blocking-style code run as a task of the event loop.
//! A bridge task owns a [`Fiber`](crate::fiber::Fiber); the loop drives it
//! through a driver future, and code inside the fiber waits on futures with
//! [`await_future`]:
//!
//! 1. the fiber suspends, handing the future to its driver,
//! 2. the driver polls the future on the loop thread while other tasks run,
//! 3. once the future resolves, the loop resumes the fiber with its output
//!    (or re-raises its panic) at the exact suspension point.
//!
//! Misuse is reported rather than tolerated: [`await_future`] outside a
//! bridge task returns [`BridgeError::OutsideTask`](crate::BridgeError),
//! and a fiber suspending with anything but a future fails its task with
//! [`BridgeError::ProtocolViolation`](crate::BridgeError).

mod bridge;
mod config;
mod driver;
mod request;
mod token;

pub use bridge::Bridge;
pub use config::{BridgeConfig, CancelPolicy};
pub use token::await_future;

use crate::runtime::context;
use crate::runtime::task::JoinHandle;

use std::future::Future;

/// Spawns `f` as a bridge task on the current event loop.
///
/// See [`Bridge::spawn_task`].
///
/// # Panics
///
/// Panics if called outside the context of an event loop.
pub fn spawn_task<F, T>(f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + Sync + 'static,
{
    context::current_bridge()
        .expect("spawn_task must be called within the context of an event loop")
        .spawn_task(f)
}

/// Spawns `future` as a fiber-backed coroutine on the current event loop.
///
/// See [`Bridge::spawn_coroutine`].
///
/// # Panics
///
/// Panics if called outside the context of an event loop.
pub fn spawn_coroutine<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + Sync + 'static,
{
    context::current_bridge()
        .expect("spawn_coroutine must be called within the context of an event loop")
        .spawn_coroutine(future)
}
