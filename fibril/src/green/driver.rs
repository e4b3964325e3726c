use super::config::CancelPolicy;
use super::request::{Awaitable, Request};
use crate::error::{BridgeError, FiberError, JoinError};
use crate::fiber::{Fiber, FiberState, Injection, Outcome, Payload};
use crate::runtime::handle::Handle;
use crate::runtime::task::{TaskId, WakerSlot};

use std::any;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Lifecycle of a bridge task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BridgeState {
    Created,
    Running,
    AwaitingFuture,
    Done,
}

/// The body of a bridge task.
///
/// The event loop polls a `Driver` like any other task body. Each poll
/// resumes the fiber at most once, and only from the loop itself: a future
/// the fiber waits on only wakes the task, and the fiber is resumed on the
/// step that wake-up schedules.
pub(crate) struct Driver<T> {
    task: TaskId,

    /// `None` once the task is done or the fiber was abandoned.
    fiber: Option<Fiber>,

    state: BridgeState,

    /// The future the fiber is suspended on.
    awaiting: Option<Awaitable>,

    /// What to deliver on the next resume. Written once per cycle.
    injection: Option<Injection>,

    /// Shared with the fiber; always holds the latest task waker.
    wake: Arc<WakerSlot>,

    /// Used to detach the awaited future on cancellation.
    handle: Handle,

    cancel_policy: CancelPolicy,

    _output: PhantomData<fn() -> T>,
}

impl<T> Driver<T> {
    /// Releases the fiber. A suspended fiber is never resumed again: it is
    /// parked on the loop rather than unwound while tasks still run.
    fn release_fiber(&mut self) {
        let Some(fiber) = self.fiber.take() else {
            return;
        };

        if fiber.state() == FiberState::Suspended {
            log::debug!("{}: parking abandoned fiber `{}`", self.task, fiber.name());
            self.handle.retire(fiber);
        }
    }
}

impl<T: Send + 'static> Driver<T> {
    pub(crate) fn new(
        task: TaskId,
        fiber: Fiber,
        wake: Arc<WakerSlot>,
        handle: Handle,
        cancel_policy: CancelPolicy,
    ) -> Self {
        Self {
            task,
            fiber: Some(fiber),
            state: BridgeState::Created,
            awaiting: None,
            injection: None,
            wake,
            handle,
            cancel_policy,
            _output: PhantomData,
        }
    }

    fn transition(&mut self, next: BridgeState) {
        if self.state != next {
            log::trace!("{}: {:?} -> {:?}", self.task, self.state, next);
            self.state = next;
        }
    }

    /// Finishes the task. The fiber is never resumed again.
    fn done(&mut self, result: Result<T, JoinError>) -> Poll<Result<T, JoinError>> {
        self.transition(BridgeState::Done);
        self.release_fiber();

        Poll::Ready(result)
    }

    /// Polls the awaited future, turning its output or panic into the
    /// next injection.
    fn poll_awaiting(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let Some(awaitable) = self.awaiting.as_mut() else {
            return Poll::Ready(());
        };

        let injection =
            match panic::catch_unwind(AssertUnwindSafe(|| awaitable.as_mut().poll(cx))) {
                Ok(Poll::Pending) => return Poll::Pending,
                Ok(Poll::Ready(value)) => Injection::Value(value),
                Err(payload) => Injection::Panic(payload),
            };

        self.awaiting = None;
        self.injection = Some(injection);

        Poll::Ready(())
    }

    /// Maps the value a fiber body returned to the task result.
    fn completed(&self, payload: Payload) -> Result<T, JoinError> {
        match payload.downcast::<Result<T, BridgeError>>() {
            Ok(result) => result.map_err(JoinError::from),
            Err(payload) => Err(JoinError::Bridge(BridgeError::Mismatch {
                expected: any::type_name::<T>(),
                found: payload.type_name(),
            })),
        }
    }
}

impl<T: Send + 'static> Future for Driver<T> {
    type Output = Result<T, JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.state == BridgeState::Done {
            return Poll::Ready(Err(JoinError::Bridge(FiberError::Finished.into())));
        }

        this.wake.register(cx.waker());

        let mut just_suspended = false;

        loop {
            if this.poll_awaiting(cx).is_pending() {
                return Poll::Pending;
            }

            // A future that was ready right away is delivered on the next step.
            if just_suspended && this.injection.is_some() {
                cx.waker().wake_by_ref();
                return Poll::Pending;
            }

            this.transition(BridgeState::Running);

            let injection = this.injection.take().unwrap_or_else(Injection::empty);
            let resumed = match this.fiber.as_mut() {
                Some(fiber) => fiber.resume(injection),
                None => Err(FiberError::Finished),
            };

            let outcome = match resumed {
                Ok(outcome) => outcome,
                Err(err) => return this.done(Err(JoinError::Bridge(err.into()))),
            };

            match outcome {
                Outcome::Completed(payload) => {
                    let result = this.completed(payload);
                    return this.done(result);
                }
                Outcome::Failed(payload) => {
                    return this.done(Err(JoinError::panicked(payload)));
                }
                Outcome::Suspended(payload) => match payload.downcast::<Request>() {
                    Ok(Request::Await(awaitable)) => {
                        this.awaiting = Some(awaitable);
                        this.transition(BridgeState::AwaitingFuture);
                        just_suspended = true;
                    }
                    Ok(Request::Yield) => {
                        this.transition(BridgeState::AwaitingFuture);
                        return Poll::Pending;
                    }
                    Err(payload) => {
                        log::error!(
                            "{}: fiber suspended with `{}` instead of a future, abandoning it",
                            this.task,
                            payload.type_name()
                        );

                        let err = BridgeError::ProtocolViolation {
                            task: this.task,
                            payload: payload.type_name(),
                        };
                        return this.done(Err(err.into()));
                    }
                },
            }
        }
    }
}

impl<T> Drop for Driver<T> {
    fn drop(&mut self) {
        self.release_fiber();

        let Some(awaitable) = self.awaiting.take() else {
            return;
        };

        match self.cancel_policy {
            CancelPolicy::Detach => {
                log::debug!("{}: detaching the awaited future", self.task);

                let _ = self.handle.spawn(async move {
                    let _ = awaitable.await;
                });
            }
            CancelPolicy::Drop => {
                log::debug!("{}: dropping the awaited future", self.task);
            }
        }
    }
}
