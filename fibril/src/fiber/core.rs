use super::link::{self, Abandoned, Link};
use super::payload::{Injection, Outcome, Payload};
use crate::error::FiberError;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

type Body = Box<dyn FnOnce() -> Payload + Send>;

/// Lifecycle of a [`Fiber`] as seen by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberState {
    /// Created but never resumed.
    NotStarted,

    /// Parked inside `suspend_current`, waiting for the next resume.
    Suspended,

    /// The body returned or panicked. The fiber cannot be resumed again.
    Finished,
}

/// Resumer-side end of the hand-off channels.
struct Channel {
    resumes: Sender<Injection>,
    outcomes: Receiver<Outcome>,
}

/// A stackful execution context.
///
/// A `Fiber` owns a call stack of its own and can be suspended at any depth
/// with [`suspend_current`](super::suspend_current). Its owner drives it
/// with [`resume`](Self::resume), which runs the fiber until it suspends,
/// returns or panics.
///
/// Each fiber is backed by a dedicated OS thread started on the first
/// resume. The fiber thread and its resumer hand control back and forth
/// over channels, so exactly one of the two runs at any time.
///
/// Dropping a suspended fiber abandons it: the pending `suspend_current`
/// unwinds, running the destructors on the fiber stack, and the backing
/// thread exits.
pub struct Fiber {
    name: String,
    stack_size: Option<usize>,
    state: FiberState,
    body: Option<Body>,
    channel: Option<Channel>,
    thread: Option<JoinHandle<()>>,
}

impl Fiber {
    /// Creates a fiber running `f` with default settings.
    ///
    /// The body does not start until the first [`resume`](Self::resume).
    pub fn spawn<F, T>(f: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
        T: Any + Send,
    {
        Builder::new().spawn(f)
    }

    /// Name of the fiber, also used for its backing thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> FiberState {
        self.state
    }

    /// Returns `true` once the body has returned or panicked.
    pub fn is_finished(&self) -> bool {
        self.state == FiberState::Finished
    }

    /// Runs the fiber until it suspends, returns or panics.
    ///
    /// On the first call the body starts and `injection` is discarded. On
    /// later calls `injection` is delivered to the pending
    /// `suspend_current`.
    ///
    /// # Errors
    ///
    /// - [`FiberError::Finished`] if the fiber already finished,
    /// - [`FiberError::Spawn`] if the backing thread could not be started,
    /// - [`FiberError::Lost`] if the backing thread vanished.
    pub fn resume(&mut self, injection: Injection) -> Result<Outcome, FiberError> {
        match self.state {
            FiberState::Finished => return Err(FiberError::Finished),
            FiberState::NotStarted => self.start()?,
            FiberState::Suspended => {
                let sent = match &self.channel {
                    Some(channel) => channel.resumes.send(injection).is_ok(),
                    None => false,
                };

                if !sent {
                    self.finish();
                    return Err(FiberError::Lost);
                }
            }
        }

        let received = match &self.channel {
            Some(channel) => channel.outcomes.recv().ok(),
            None => None,
        };

        match received {
            Some(Outcome::Suspended(payload)) => {
                self.state = FiberState::Suspended;
                log::trace!("fiber `{}` suspended with {:?}", self.name, payload);

                Ok(Outcome::Suspended(payload))
            }
            Some(outcome) => {
                self.finish();
                log::trace!("fiber `{}` finished", self.name);

                Ok(outcome)
            }
            None => {
                self.finish();
                Err(FiberError::Lost)
            }
        }
    }

    /// Starts the backing thread and hands it the body.
    fn start(&mut self) -> Result<(), FiberError> {
        let Some(body) = self.body.take() else {
            self.state = FiberState::Finished;
            return Err(FiberError::Finished);
        };

        let (resumes, resume_rx) = mpsc::channel();
        let (outcome_tx, outcomes) = mpsc::channel();

        let link = Link {
            outcomes: outcome_tx,
            resumes: resume_rx,
        };

        let mut builder = thread::Builder::new().name(self.name.clone());
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }

        match builder.spawn(move || run(body, link)) {
            Ok(thread) => {
                log::trace!("fiber `{}` started", self.name);

                self.thread = Some(thread);
                self.channel = Some(Channel { resumes, outcomes });
                Ok(())
            }
            Err(err) => {
                self.state = FiberState::Finished;
                Err(FiberError::Spawn(err.to_string()))
            }
        }
    }

    /// Marks the fiber finished and reaps its thread.
    fn finish(&mut self) {
        self.state = FiberState::Finished;
        self.channel = None;

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Fiber {
    fn drop(&mut self) {
        if self.state == FiberState::Suspended {
            log::debug!("abandoning suspended fiber `{}`", self.name);
        }

        // Closing the channel unwinds a suspended body; the thread is detached.
        self.channel = None;
        self.thread = None;
    }
}

impl fmt::Debug for Fiber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("name", &self.name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Entry point of a fiber thread.
fn run(body: Body, link: Link) {
    let outcomes = link.outcomes.clone();
    link::install(link);

    let result = panic::catch_unwind(AssertUnwindSafe(body));
    drop(link::uninstall());

    let outcome = match result {
        Ok(value) => Outcome::Completed(value),
        Err(payload) if payload.is::<Abandoned>() => return,
        Err(payload) => Outcome::Failed(payload),
    };

    let _ = outcomes.send(outcome);
}

/// Configures a [`Fiber`] before creating it.
///
/// # Examples
///
/// ```rust,ignore
/// let fiber = fiber::Builder::new()
///     .name("worker")
///     .stack_size(256 * 1024)
///     .spawn(|| 42);
/// ```
#[derive(Debug, Default)]
pub struct Builder {
    name: Option<String>,
    stack_size: Option<usize>,
}

impl Builder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names the fiber. Defaults to `fiber-<n>`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the stack size of the backing thread, in bytes.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Creates the fiber. The body does not run until the first resume.
    pub fn spawn<F, T>(self, f: F) -> Fiber
    where
        F: FnOnce() -> T + Send + 'static,
        T: Any + Send,
    {
        static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

        let name = self
            .name
            .unwrap_or_else(|| format!("fiber-{}", NEXT_ID.fetch_add(1, Ordering::Relaxed)));

        Fiber {
            name,
            stack_size: self.stack_size,
            state: FiberState::NotStarted,
            body: Some(Box::new(move || Payload::new(f()))),
            channel: None,
            thread: None,
        }
    }
}
