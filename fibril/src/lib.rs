//! # Fibril
//!
//! **Fibril** lets blocking-style code and `async` code share one
//! single-threaded event loop.
//!
//! It bridges two execution models:
//!
//! - a **cooperative event loop** that polls futures one at a time,
//! - **stackful fibers** that can suspend anywhere down their call stack.
//!
//! A function running on a fiber can wait for a future with
//! [`green::await_future`] as if it were a blocking call. The fiber is
//! suspended, the loop keeps running other tasks, and once the future
//! resolves the fiber resumes with its output. Seen from the loop, the
//! whole fiber is just another task with a [`JoinHandle`](task::JoinHandle).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fibril::{green, yield_now};
//!
//! async fn bar() -> u32 {
//!     yield_now().await;
//!     30
//! }
//!
//! #[fibril::main]
//! async fn main() {
//!     let handle = green::spawn_task(|| {
//!         // Plain blocking-style code
//!         green::await_future(bar()).unwrap() + 12
//!     });
//!
//!     assert_eq!(handle.await, Ok(42));
//! }
//! ```
//!
//! ## Modules
//!
//! - [`fiber`] — The stackful context switch primitive
//! - [`green`] — The bridge running fibers as event loop tasks
//! - [`task`] — Spawning and observing tasks
//! - [`error`] — Error types

mod runtime;
mod utils;

pub mod error;
pub mod fiber;
pub mod green;

pub use error::{BridgeError, FiberError, JoinError};
pub use runtime::builder::EventLoopBuilder;
pub use runtime::core::EventLoop;
pub use runtime::handle::Handle;
pub use runtime::task;
pub use runtime::yield_now::yield_now;

pub use fibril_macros::*;
