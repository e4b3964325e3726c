use super::payload::{Injection, Outcome, Payload};
use crate::error::FiberError;

use std::cell::RefCell;
use std::panic;
use std::sync::mpsc::{Receiver, Sender};

/// Unwound through a suspended fiber whose owner dropped it.
///
/// Raised with [`panic::resume_unwind`], so the panic hook never sees it.
pub(crate) struct Abandoned;

/// Fiber-side end of the hand-off between a fiber and its resumer.
pub(crate) struct Link {
    /// Carries suspensions and the final outcome back to the resumer.
    pub(crate) outcomes: Sender<Outcome>,

    /// Delivers injections from the resumer.
    pub(crate) resumes: Receiver<Injection>,
}

thread_local! {
    /// The link of the fiber running on this thread, if any.
    static CURRENT_LINK: RefCell<Option<Link>> = const { RefCell::new(None) };
}

pub(crate) fn install(link: Link) {
    CURRENT_LINK.with(|cell| *cell.borrow_mut() = Some(link));
}

pub(crate) fn uninstall() -> Option<Link> {
    CURRENT_LINK.with(|cell| cell.borrow_mut().take())
}

/// Returns `true` if the calling code runs inside a fiber.
pub fn in_fiber() -> bool {
    CURRENT_LINK.with(|cell| cell.borrow().is_some())
}

/// Suspends the calling fiber, handing `payload` to whoever resumed it.
///
/// The call returns once the fiber is resumed again: an
/// [`Injection::Value`] becomes the return value, an [`Injection::Panic`]
/// is re-raised here.
///
/// # Errors
///
/// Returns [`FiberError::NotInFiber`] when called outside of a running
/// fiber. Nothing is suspended in that case.
pub fn suspend_current(payload: Payload) -> Result<Payload, FiberError> {
    let resumed = CURRENT_LINK.with(|cell| {
        let cell = cell.borrow();
        let Some(link) = cell.as_ref() else {
            return Err(FiberError::NotInFiber);
        };

        if link.outcomes.send(Outcome::Suspended(payload)).is_err() {
            return Ok(None);
        }

        Ok(link.resumes.recv().ok())
    })?;

    match resumed {
        Some(Injection::Value(value)) => Ok(value),
        Some(Injection::Panic(payload)) => panic::resume_unwind(payload),
        // The owner dropped the fiber while it was suspended.
        None => panic::resume_unwind(Box::new(Abandoned)),
    }
}
