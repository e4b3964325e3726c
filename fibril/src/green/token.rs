use super::request::{Awaitable, Request};
use crate::error::BridgeError;
use crate::fiber::{self, Payload};
use crate::runtime::task::{TaskId, WakerSlot};

use std::any;
use std::cell::RefCell;
use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Binds a fiber to the bridge task driving it.
#[derive(Clone)]
pub(crate) struct Token {
    /// The driving task.
    pub(crate) task: TaskId,

    /// Forwards wake-ups to the driving task.
    pub(crate) wake: Arc<WakerSlot>,
}

thread_local! {
    /// Token of the bridge task driving the fiber on this thread.
    ///
    /// Only ever set on fiber threads. Taken while the fiber is suspended.
    static TOKEN: RefCell<Option<Token>> = const { RefCell::new(None) };
}

/// Installs the token of the fiber starting on this thread.
pub(crate) fn install(token: Token) {
    TOKEN.with(|cell| *cell.borrow_mut() = Some(token));
}

/// Puts the token back once the fiber is resumed, also when the
/// resumption re-raises a panic.
struct Restore(Option<Token>);

impl Drop for Restore {
    fn drop(&mut self) {
        TOKEN.with(|cell| *cell.borrow_mut() = self.0.take());
    }
}

/// Suspends the current bridge fiber with `request`.
fn suspend(request: impl FnOnce() -> Request) -> Result<Payload, BridgeError> {
    let token = TOKEN
        .with(|cell| cell.borrow_mut().take())
        .ok_or(BridgeError::OutsideTask)?;

    let _restore = Restore(Some(token));

    Ok(fiber::suspend_current(Payload::new(request()))?)
}

/// Waits for `future` from blocking-style code running in a bridge task.
///
/// The fiber is suspended and the event loop polls `future` on its behalf;
/// other tasks keep running meanwhile. Once the future resolves, the fiber
/// is resumed and its output returned here. If polling the future panics,
/// the panic is re-raised here instead.
///
/// # Errors
///
/// Returns [`BridgeError::OutsideTask`] when called anywhere else than
/// inside a bridge task (or a coroutine it drives). `future` is dropped
/// without being polled in that case.
///
/// # Examples
///
/// ```rust,ignore
/// let handle = event_loop.spawn_task(|| {
///     let value = green::await_future(async { 30 }).unwrap();
///     value + 12
/// });
/// ```
pub fn await_future<F>(future: F) -> Result<F::Output, BridgeError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let resumed = suspend(move || {
        let awaitable: Awaitable = Box::pin(async move { Payload::new(future.await) });
        Request::Await(awaitable)
    })?;

    resumed
        .downcast::<F::Output>()
        .map_err(|payload| BridgeError::Mismatch {
            expected: any::type_name::<F::Output>(),
            found: payload.type_name(),
        })
}

/// Polls `future` to completion inside the current bridge fiber.
///
/// Whenever the future is pending the fiber yields to the loop; the waker
/// it sees forwards to the driving task.
pub(crate) fn drive<F: Future>(future: F) -> Result<F::Output, BridgeError> {
    let token = TOKEN
        .with(|cell| cell.borrow().clone())
        .ok_or(BridgeError::OutsideTask)?;

    let waker = Waker::from(token.wake);
    let mut cx = Context::from_waker(&waker);
    let mut future = pin!(future);

    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return Ok(output);
        }

        suspend(|| Request::Yield)?;
    }
}
