//! Stackful execution contexts.
//!
//! A [`Fiber`] is a call stack that can be suspended at any depth and
//! resumed later with a value or a panic injected at the exact point where
//! it suspended. This module only provides the switching mechanics:
//!
//! - [`Fiber::spawn`] creates a fiber without running it,
//! - [`Fiber::resume`] runs it to its next suspension point,
//! - [`suspend_current`] hands control back to the resumer.
//!
//! Scheduling policy lives in [`green`](crate::green), which drives fibers
//! from the event loop.

mod core;
mod link;
mod payload;

pub use self::core::{Builder, Fiber, FiberState};
pub use link::{in_fiber, suspend_current};
pub use payload::{Injection, Outcome, PanicPayload, Payload};
