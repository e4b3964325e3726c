use crate::green::Bridge;
use crate::runtime::handle::Handle;

use std::cell::RefCell;

thread_local! {
    /// Handle of the event loop running on this thread.
    ///
    /// Set on the loop thread while the loop runs, and on the thread of
    /// every bridge fiber while its body runs.
    static CURRENT_HANDLE: RefCell<Option<Handle>> = const { RefCell::new(None) };

    /// The bridge installed on that event loop.
    static CURRENT_BRIDGE: RefCell<Option<Bridge>> = const { RefCell::new(None) };
}

/// Restores the previous context when dropped, also during unwinding.
struct Restore {
    handle: Option<Handle>,
    bridge: Option<Bridge>,
}

impl Drop for Restore {
    fn drop(&mut self) {
        CURRENT_HANDLE.with(|cell| *cell.borrow_mut() = self.handle.take());
        CURRENT_BRIDGE.with(|cell| *cell.borrow_mut() = self.bridge.take());
    }
}

/// Enters the event loop context for the current thread.
///
/// The loop handle and its bridge are visible to [`current_handle`] and
/// [`current_bridge`] for the duration of `f`. After the closure
/// completes, the previous context is restored.
///
/// This lets `task::spawn` and `green::spawn_task` find the loop without
/// handles being passed through every call.
pub(crate) fn enter_context<R>(handle: Handle, bridge: Bridge, f: impl FnOnce() -> R) -> R {
    let _restore = Restore {
        handle: CURRENT_HANDLE.with(|cell| cell.replace(Some(handle))),
        bridge: CURRENT_BRIDGE.with(|cell| cell.replace(Some(bridge))),
    };

    f()
}

pub(crate) fn current_handle() -> Option<Handle> {
    CURRENT_HANDLE.with(|cell| cell.borrow().clone())
}

pub(crate) fn current_bridge() -> Option<Bridge> {
    CURRENT_BRIDGE.with(|cell| cell.borrow().clone())
}
