use super::config::BridgeConfig;
use super::driver::Driver;
use super::token::{self, Token};
use crate::error::BridgeError;
use crate::fiber;
use crate::runtime::context;
use crate::runtime::handle::Handle;
use crate::runtime::task::{JoinHandle, TaskId, WakerSlot};

use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Runs stackful code as tasks of an event loop.
///
/// A `Bridge` is bound to the loop it was created for. Every task it spawns
/// owns a fresh [`Fiber`](crate::fiber::Fiber) and is scheduled exactly
/// like a native task: it shows up as a plain [`JoinHandle`], supports
/// cancellation and done callbacks, and reports panics as
/// [`JoinError::Panicked`](crate::JoinError::Panicked).
///
/// Every [`EventLoop`](crate::EventLoop) installs one; see
/// [`EventLoop::bridge`](crate::EventLoop::bridge).
#[derive(Clone)]
pub struct Bridge {
    handle: Handle,
    config: Arc<BridgeConfig>,
}

impl Bridge {
    /// Creates a bridge spawning onto the loop behind `handle`.
    pub fn new(handle: Handle, config: BridgeConfig) -> Self {
        Self {
            handle,
            config: Arc::new(config),
        }
    }

    /// Handle of the loop this bridge spawns onto.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Configuration of this bridge.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Spawns `f` as a bridge task.
    ///
    /// `f` runs on its own fiber, in ordinary blocking style, and may call
    /// [`await_future`](super::await_future) anywhere down its call stack.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let handle = event_loop.bridge().spawn_task(|| {
    ///     green::await_future(fetch()).unwrap() + 12
    /// });
    /// ```
    pub fn spawn_task<F, T>(&self, f: F) -> JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + Sync + 'static,
    {
        self.spawn_body(move || Ok(f()))
    }

    /// Spawns `future` as a bridge task whose body is a coroutine.
    ///
    /// The coroutine is polled inside the fiber, so any plain `async fn`
    /// it awaits may itself call [`await_future`](super::await_future) in
    /// blocking style.
    pub fn spawn_coroutine<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + Sync + 'static,
    {
        self.spawn_body(move || token::drive(future))
    }

    fn spawn_body<B, T>(&self, body: B) -> JoinHandle<T>
    where
        B: FnOnce() -> Result<T, BridgeError> + Send + 'static,
        T: Send + Sync + 'static,
    {
        let id = TaskId::next();
        let wake = Arc::new(WakerSlot::new());

        let token = Token {
            task: id,
            wake: wake.clone(),
        };
        let bridge = self.clone();

        let mut builder =
            fiber::Builder::new().name(format!("{}-{}", self.config.name_prefix, id.as_u64()));
        if let Some(size) = self.config.stack_size {
            builder = builder.stack_size(size);
        }

        let fiber = builder.spawn(move || {
            token::install(token);
            context::enter_context(bridge.handle.clone(), bridge, body)
        });

        log::debug!("spawning bridge {id} on fiber `{}`", fiber.name());

        let driver = Driver::new(id, fiber, wake, self.handle.clone(), self.config.cancel_policy);
        self.handle.spawn_with_id(id, Box::pin(driver))
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("handle", &self.handle)
            .field("config", &self.config)
            .finish()
    }
}
