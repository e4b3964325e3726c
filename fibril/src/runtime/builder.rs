use super::core::EventLoop;
use crate::green::{BridgeConfig, CancelPolicy};

use std::time::Duration;

/// Builder for configuring and creating an event loop.
///
/// `EventLoopBuilder` allows customizing the loop and the bridge installed
/// on it before constructing the loop.
///
/// # Examples
///
/// ```rust,ignore
/// let event_loop = EventLoopBuilder::new()
///     .name("main")
///     .cancel_policy(CancelPolicy::Drop)
///     .build();
/// ```
pub struct EventLoopBuilder {
    /// Name of the loop, used in logs.
    name: String,

    /// Upper bound on a single idle wait of the loop.
    park_timeout: Duration,

    /// Configuration of the bridge installed on the loop.
    bridge: BridgeConfig,
}

impl EventLoopBuilder {
    /// Creates a new `EventLoopBuilder` with default configuration.
    ///
    /// By default the loop is named `fibril`, parks for at most 10ms at a
    /// time and installs a bridge with [`BridgeConfig::default`].
    pub fn new() -> Self {
        Self {
            name: String::from("fibril"),
            park_timeout: Duration::from_millis(10),
            bridge: BridgeConfig::default(),
        }
    }

    /// Names the event loop.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets how long the loop waits at most for a wake-up when idle.
    ///
    /// # Panics
    ///
    /// Panics if `timeout` is zero.
    pub fn park_timeout(mut self, timeout: Duration) -> Self {
        assert!(!timeout.is_zero(), "park_timeout must be > 0");

        self.park_timeout = timeout;
        self
    }

    /// Replaces the whole bridge configuration.
    pub fn bridge(mut self, config: BridgeConfig) -> Self {
        self.bridge = config;
        self
    }

    /// Sets what happens to the future a bridge task awaits when the task
    /// is cancelled.
    pub fn cancel_policy(mut self, policy: CancelPolicy) -> Self {
        self.bridge.cancel_policy = policy;
        self
    }

    /// Sets the stack size of bridge fibers, in bytes.
    ///
    /// # Panics
    ///
    /// Panics if `size == 0`.
    pub fn fiber_stack_size(mut self, size: usize) -> Self {
        assert!(size > 0, "fiber_stack_size must be > 0");

        self.bridge.stack_size = Some(size);
        self
    }

    /// Builds the event loop with the configured options.
    pub fn build(self) -> EventLoop {
        EventLoop::from_parts(&self.name, self.park_timeout, self.bridge)
    }
}

impl Default for EventLoopBuilder {
    /// Creates a default `EventLoopBuilder`.
    fn default() -> Self {
        Self::new()
    }
}
