//! Core stage and sink traits.

use std::future::Future;

use futures::future::BoxFuture;

use super::context::{Emitter, Inlet, Outlet};
use crate::error::{Outcome, Result};

// ============================================================================
// Stage
// ============================================================================

/// A user-defined transformation step.
///
/// A stage receives elements one at a time and may emit zero, one or many
/// values for each of them. It owns its state exclusively: every pipeline
/// instance builds its own stage value, so accumulators never leak between
/// runs.
///
/// Synchronous stages return an already-completed future:
///
/// ```rust
/// use std::future::{Future, ready};
/// use objstream::element::{Emitter, Stage};
/// use objstream::error::Outcome;
///
/// /// Emits each element twice.
/// struct Duplicate;
///
/// impl Stage for Duplicate {
///     type Input = u32;
///     type Output = u32;
///
///     fn transform_element(
///         &mut self,
///         value: u32,
///         emit: &mut Emitter<u32>,
///     ) -> impl Future<Output = Outcome<()>> + Send {
///         emit.emit(value);
///         emit.emit(value);
///         ready(Ok(()))
///     }
/// }
/// ```
pub trait Stage: Send + 'static {
    /// The type of data this stage accepts.
    type Input: Send + 'static;

    /// The type of data this stage produces.
    type Output: Send + 'static;

    /// Process one element.
    ///
    /// The element counts as processed once the returned future resolves
    /// and everything emitted has been handed downstream. Returning an
    /// error, or panicking, aborts the pipeline.
    fn transform_element(
        &mut self,
        value: Self::Input,
        emit: &mut Emitter<Self::Output>,
    ) -> impl Future<Output = Outcome<()>> + Send;

    /// Called exactly once after the last element has been processed.
    fn on_end(&mut self, _emit: &mut Emitter<Self::Output>) -> Outcome<()> {
        Ok(())
    }

    /// Get the name of this stage.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

// ============================================================================
// Stage runtime
// ============================================================================

/// A processing unit running between two bounded boundaries.
///
/// This is the lower-level seam behind [`Stage`]: it receives the raw
/// boundary ends and drives them itself. Implementations must
///
/// - pull the next input only once the previous one is fully handled,
/// - call [`Outlet::finish`] after receiving [`Message::Eos`](super::Message::Eos),
/// - stop quietly when [`Outlet::push`] returns `false`,
/// - return an error when [`Inlet::recv`] yields `None`.
///
/// Built-in stages are wrapped by
/// [`create_runtime`](crate::pipeline::create_runtime).
pub trait StageRuntime<In, Out>: Send {
    /// Get the name of this runtime.
    fn name(&self) -> &str;

    /// Run until the input is exhausted or the pipeline aborts.
    fn run(self: Box<Self>, input: Inlet<In>, output: Outlet<Out>) -> BoxFuture<'static, Result<()>>;
}

// ============================================================================
// Sink
// ============================================================================

/// The external consumer a pipeline drains into.
///
/// Backpressure is acknowledgement based: the next element is only pulled
/// once the future returned by [`write`](Sink::write) resolves.
pub trait Sink: Send {
    /// The type of data this sink consumes.
    type Input: Send + 'static;

    /// Consume one element.
    fn write(&mut self, item: Self::Input) -> impl Future<Output = Outcome<()>> + Send;

    /// Called once after the last element; resolving signals completion.
    fn close(&mut self) -> impl Future<Output = Outcome<()>> + Send {
        async { Ok(()) }
    }

    /// Get the name of this sink.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
