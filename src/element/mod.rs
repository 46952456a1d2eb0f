//! Stage, runtime and sink contracts.
//!
//! - [`Stage`]: a push-style transformation with per-element and
//!   end-of-sequence callbacks
//! - [`StageRuntime`]: a unit that runs between two bounded boundaries
//! - [`Sink`]: an acknowledging consumer at the end of a pipeline
//! - [`Emitter`], [`Inlet`], [`Outlet`]: the handles they work with

mod context;
mod traits;

pub use context::{Emitter, Inlet, Message, Outlet};
pub(crate) use context::boundary;
pub use traits::{Sink, Stage, StageRuntime};
