//! Error types for objstream.
//!
//! Two error channels exist:
//!
//! - [`Failure`] is what user logic (stage callbacks, sources, sinks) raises.
//!   Any `std::error::Error` converts into it with `?` and is kept as-is;
//!   arbitrary non-error values go through [`Failure::value`].
//! - [`Error`] is what a terminal operation resolves with. It records where
//!   the failure happened and carries the original error as its source.

use std::any::Any;
use std::fmt;

use thiserror::Error;

/// Boxed, thread-safe error object.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias using objstream's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type returned by user callbacks.
pub type Outcome<T> = std::result::Result<T, Failure>;

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// User logic inside a stage failed.
    #[error("stage `{stage}` failed: {source}")]
    Stage {
        /// Name of the failing stage.
        stage: String,
        /// The error raised by the stage, unchanged.
        source: BoxError,
    },

    /// The upstream source failed.
    #[error("source failed: {0}")]
    Source(#[source] BoxError),

    /// The terminal sink failed.
    #[error("sink `{sink}` failed: {source}")]
    Sink {
        /// Name of the failing sink.
        sink: String,
        /// The error raised by the sink, unchanged.
        source: BoxError,
    },

    /// An upstream task stopped without signalling end of stream.
    #[error("upstream of `{stage}` disconnected before end of stream")]
    Disconnected {
        /// The stage that observed the disconnect.
        stage: String,
    },

    /// The pipeline (or an ancestor it shares stages with) was already drained.
    #[error("pipeline already consumed")]
    AlreadyConsumed,

    /// An argument passed to a combinator was rejected.
    #[error("invalid {name}: {reason}")]
    InvalidArgument {
        /// Argument name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl Error {
    /// The original error raised by a stage, source or sink.
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Error::Stage { source, .. } | Error::Source(source) | Error::Sink { source, .. } => {
                Some(source.as_ref())
            }
            _ => None,
        }
    }

    /// Downcast the original error to a concrete type.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.cause()?.downcast_ref::<E>()
    }

    /// The uniform wrapper, if the failure was raised with a non-error value
    /// or a panic.
    pub fn stream_error(&self) -> Option<&StreamError> {
        self.downcast_ref::<StreamError>()
    }
}

// ============================================================================
// Failure (user-facing error channel)
// ============================================================================

/// Error raised by user-supplied logic.
///
/// Proper error objects convert through `?` and are surfaced unchanged.
/// Anything else must be wrapped explicitly with [`Failure::value`], which
/// produces a [`StreamError`] carrying the value as its cause.
pub struct Failure(BoxError);

impl Failure {
    /// Raise an arbitrary, non-error value.
    ///
    /// ```rust
    /// use objstream::error::{Failure, Outcome};
    ///
    /// fn check(x: u32) -> Outcome<u32> {
    ///     if x == 0 {
    ///         return Err(Failure::value("zero is not allowed"));
    ///     }
    ///     Ok(x)
    /// }
    /// ```
    pub fn value<P: Payload>(payload: P) -> Self {
        Self(Box::new(StreamError::new(payload)))
    }

    /// Raise an already boxed error, unchanged.
    pub fn boxed(error: BoxError) -> Self {
        Self(error)
    }

    /// Convert a panic payload caught from user code.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self(Box::new(StreamError::from_panic(payload)))
    }

    /// Get the underlying error.
    pub fn into_inner(self) -> BoxError {
        self.0
    }
}

impl<E> From<E> for Failure
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self(Box::new(error))
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// ============================================================================
// StreamError (uniform wrapper)
// ============================================================================

/// A value that can travel as the cause of a [`StreamError`].
pub trait Payload: Any + fmt::Debug + Send + Sync {
    /// Upcast for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + fmt::Debug + Send + Sync> Payload for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Uniform error wrapping a value that is not an error object.
#[derive(Error)]
#[error("Error during stream. See cause for more information.")]
pub struct StreamError {
    cause: Box<dyn Payload>,
}

impl StreamError {
    /// Wrap a payload.
    pub fn new<P: Payload>(cause: P) -> Self {
        Self {
            cause: Box::new(cause),
        }
    }

    /// Panic payloads are almost always `&'static str` or `String`; both
    /// are normalized to `String`.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(payload) => match payload.downcast::<String>() {
                Ok(message) => *message,
                Err(_) => "panic with a non-string payload".to_string(),
            },
        };
        Self::new(message)
    }

    /// The original value, if it has type `P`.
    pub fn cause<P: Any>(&self) -> Option<&P> {
        (*self.cause).as_any().downcast_ref::<P>()
    }

    /// The original value, untyped.
    pub fn cause_any(&self) -> &dyn Any {
        (*self.cause).as_any()
    }
}

impl fmt::Debug for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamError")
            .field("cause", &self.cause)
            .finish()
    }
}
