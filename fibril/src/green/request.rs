use crate::fiber::Payload;

use std::future::Future;
use std::pin::Pin;

/// A future handed from a fiber to its driver, with its output erased.
pub(crate) type Awaitable = Pin<Box<dyn Future<Output = Payload> + Send>>;

/// The only payloads a bridge fiber may suspend with.
pub(crate) enum Request {
    /// Resume me with the output of this future.
    Await(Awaitable),

    /// A coroutine polled inside the fiber is pending; resume me once the
    /// task is woken.
    Yield,
}
