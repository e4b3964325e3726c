/// Task is waiting for a wake-up and is not in the run queue.
pub(crate) const IDLE: usize = 0;

/// Task is in the run queue, waiting for the loop to poll it.
pub(crate) const QUEUED: usize = 1;

/// Task body is being polled by the event loop.
pub(crate) const RUNNING: usize = 2;

/// Task body produced its result and was dropped.
pub(crate) const COMPLETED: usize = 3;

/// Task was woken while being polled.
///
/// It goes back to the run queue as soon as the current poll returns.
pub(crate) const NOTIFIED: usize = 4;

/// Task was cancelled. Its body is dropped and never polled again.
pub(crate) const CANCELLED: usize = 5;
