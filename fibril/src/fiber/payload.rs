use std::any::{self, Any};
use std::fmt;

/// A raw panic payload, as produced by [`std::panic::catch_unwind`].
pub type PanicPayload = Box<dyn Any + Send>;

/// A type-erased value crossing a fiber boundary.
///
/// Besides the value itself, a `Payload` keeps the name of the type it was
/// built from so that a receiver that does not recognize it can still say
/// what it got.
pub struct Payload {
    value: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl Payload {
    /// Wraps `value` into a payload.
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: any::type_name::<T>(),
        }
    }

    /// The unit payload, used when a resumption carries no value.
    pub fn unit() -> Self {
        Self::new(())
    }

    /// Name of the type stored in this payload.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if the payload holds a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Recovers the stored value, or gives the payload back if it is not a `T`.
    pub fn downcast<T: Any>(self) -> Result<T, Payload> {
        let Self { value, type_name } = self;

        match value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self { value, type_name }),
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Payload").field(&self.type_name).finish()
    }
}

/// What a [`resume`](super::Fiber::resume) delivers to the suspension point.
#[derive(Debug)]
pub enum Injection {
    /// Becomes the return value of the pending `suspend_current` call.
    Value(Payload),

    /// Re-raised at the pending `suspend_current` call.
    Panic(PanicPayload),
}

impl Injection {
    /// An injection carrying `()`.
    pub fn empty() -> Self {
        Self::Value(Payload::unit())
    }
}

/// How a [`resume`](super::Fiber::resume) call ended.
#[derive(Debug)]
pub enum Outcome {
    /// The fiber called `suspend_current` with this payload.
    Suspended(Payload),

    /// The fiber body returned this value.
    Completed(Payload),

    /// The fiber body panicked with this payload.
    Failed(PanicPayload),
}
