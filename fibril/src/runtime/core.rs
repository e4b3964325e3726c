use super::builder::EventLoopBuilder;
use super::context::enter_context;
use super::handle::Handle;
use crate::error::JoinError;
use crate::green::{Bridge, BridgeConfig};
use crate::runtime::task::JoinHandle;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A single-threaded cooperative event loop with a green task bridge.
///
/// `EventLoop` is responsible for:
/// - spawning native tasks and bridge tasks,
/// - polling them one at a time on the thread that runs the loop,
/// - providing a synchronous entry point via
///   [`run_until_complete`](Self::run_until_complete).
///
/// The loop only runs while one of the `run_*` methods is executing.
/// Dropping it closes the run queue, cancels every unfinished task and
/// unwinds the fibers of cancelled bridge tasks.
pub struct EventLoop {
    /// Shared handle, also held by the bridge and by spawned tasks.
    handle: Handle,

    /// Bridge installed on this loop.
    bridge: Bridge,

    /// How long the loop sleeps at most when no task is ready.
    park_timeout: Duration,

    /// Guards against running the loop from inside one of its own tasks.
    running: AtomicBool,
}

impl EventLoop {
    /// Creates an event loop with the default configuration.
    pub fn new() -> Self {
        EventLoopBuilder::new().build()
    }

    pub(crate) fn from_parts(name: &str, park_timeout: Duration, bridge: BridgeConfig) -> Self {
        let handle = Handle::new(name);
        let bridge = Bridge::new(handle.clone(), bridge);

        Self {
            handle,
            bridge,
            park_timeout,
            running: AtomicBool::new(false),
        }
    }

    /// Returns the handle of this loop.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Returns the bridge installed on this loop.
    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Spawns a future onto the loop. See [`Handle::spawn`].
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + Sync + 'static,
    {
        self.handle.spawn(future)
    }

    /// Spawns a blocking-style closure as a bridge task.
    /// See [`Bridge::spawn_task`].
    pub fn spawn_task<F, T>(&self, f: F) -> JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + Sync + 'static,
    {
        self.bridge.spawn_task(f)
    }

    /// Spawns a coroutine that runs inside a fiber.
    /// See [`Bridge::spawn_coroutine`].
    pub fn spawn_coroutine<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + Sync + 'static,
    {
        self.bridge.spawn_coroutine(future)
    }

    /// Runs the loop until `future` completes and returns its result.
    ///
    /// Other tasks make progress in the meantime; those still pending when
    /// `future` completes stay queued for the next run.
    ///
    /// # Panics
    ///
    /// Panics if the loop is already running.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let event_loop = EventLoop::new();
    /// let result = event_loop.run_until_complete(async { 42 });
    /// assert_eq!(result, Ok(42));
    /// ```
    pub fn run_until_complete<F>(&self, future: F) -> Result<F::Output, JoinError>
    where
        F: Future + Send + 'static,
        F::Output: Clone + Send + Sync + 'static,
    {
        let task = self.spawn(future);
        self.run_until_done(&task)
    }

    /// Runs the loop until `task` is done and returns its result.
    ///
    /// # Panics
    ///
    /// Panics if the loop is already running.
    pub fn run_until_done<T>(&self, task: &JoinHandle<T>) -> Result<T, JoinError>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.run_until(|| task.is_done());

        task.result().unwrap_or(Err(JoinError::Cancelled))
    }

    /// Polls ready tasks until `done` returns `true`.
    fn run_until(&self, done: impl Fn() -> bool) {
        assert!(
            !self.running.swap(true, Ordering::AcqRel),
            "event loop `{}` is already running",
            self.handle.name()
        );

        let _running = Running(&self.running);

        enter_context(self.handle.clone(), self.bridge.clone(), || {
            let queue = self.handle.queue();
            let mut steps = 0usize;

            while !done() {
                match queue.pop() {
                    Some(task) => {
                        task.run();
                        steps += 1;
                    }
                    None => queue.park(self.park_timeout),
                }
            }

            log::debug!(
                "event loop `{}` stopped after {steps} steps",
                self.handle.name()
            );
        });
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventLoop {
    /// Closes the run queue and cancels every task that is not done.
    ///
    /// Fibers of cancelled bridge tasks are unwound here, once no task
    /// can run anymore.
    fn drop(&mut self) {
        let queue = self.handle.queue();
        let pending = queue.close();
        let live = queue.drain_live();

        if !live.is_empty() {
            log::debug!(
                "event loop `{}` dropped with {} unfinished tasks",
                self.handle.name(),
                live.len()
            );
        }

        for task in live {
            task.shutdown();
        }

        drop(pending);

        // Closed by now: fibers abandoned from here on are dropped directly.
        let retired = queue.take_retired();
        if !retired.is_empty() {
            log::debug!(
                "event loop `{}` releasing {} abandoned fibers",
                self.handle.name(),
                retired.len()
            );
        }

        drop(retired);
    }
}

/// Clears the running flag, also when a task unwinds the loop.
struct Running<'a>(&'a AtomicBool);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
