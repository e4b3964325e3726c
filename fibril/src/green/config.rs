/// What happens to the future a bridge task is awaiting when the task is
/// cancelled.
///
/// Cancelling a bridge task never interrupts its fiber; it only decides
/// whether the future it was waiting on keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelPolicy {
    /// The awaited future is spawned as a native task and runs to
    /// completion; its result is discarded.
    #[default]
    Detach,

    /// The awaited future is dropped together with the task.
    Drop,
}

/// Configuration of a [`Bridge`](super::Bridge).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Fate of the awaited future on cancellation.
    pub cancel_policy: CancelPolicy,

    /// Stack size of fiber threads, in bytes. `None` keeps the platform
    /// default.
    pub stack_size: Option<usize>,

    /// Fibers are named `<name_prefix>-<task id>`.
    pub name_prefix: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            cancel_policy: CancelPolicy::default(),
            stack_size: None,
            name_prefix: String::from("fibril-green"),
        }
    }
}
