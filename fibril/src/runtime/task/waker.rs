use super::core::Task;
use crate::utils::lock;

use std::sync::{Arc, Mutex};
use std::task::{Wake, Waker};

/// Waking a task puts it back on the run queue of its event loop.
///
/// Wakers may be invoked from any thread, fiber threads included.
impl<T: Send + Sync + 'static> Wake for Task<T> {
    fn wake(self: Arc<Self>) {
        self.schedule();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.clone().schedule();
    }
}

/// A waker that forwards to whichever waker was registered last.
///
/// Bridge tasks hand one of these to futures polled inside their fiber, so
/// a wake-up reaches the task even though the fiber never sees the loop's
/// own waker.
#[derive(Default)]
pub(crate) struct WakerSlot {
    waker: Mutex<Option<Waker>>,
}

impl WakerSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stores `waker` unless an equivalent one is already registered.
    pub(crate) fn register(&self, waker: &Waker) {
        let mut slot = lock(&self.waker);

        if !slot.as_ref().is_some_and(|current| current.will_wake(waker)) {
            *slot = Some(waker.clone());
        }
    }
}

impl Wake for WakerSlot {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        // Clone out so the slot is not locked while the task is scheduled.
        let waker = lock(&self.waker).clone();

        if let Some(waker) = waker {
            waker.wake();
        }
    }
}
