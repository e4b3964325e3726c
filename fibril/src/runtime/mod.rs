//! The cooperative side of the crate.
//!
//! This module contains the single-threaded event loop the bridge plugs
//! into.
//!
//! It is responsible for:
//! - polling tasks one at a time on the thread running the loop,
//! - queueing tasks again when their wakers fire, from any thread,
//! - providing the loop context used by ambient spawning,
//! - cooperative yielding.

pub(crate) mod builder;
pub(crate) mod context;
pub(crate) mod core;
pub(crate) mod handle;
pub(crate) mod queue;
pub(crate) mod yield_now;

pub mod task;
