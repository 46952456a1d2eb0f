//! Tracing integration for structured logging and spans.

use tracing::{Level, Span, span};

/// Create a span for one pipeline run.
///
/// # Example
///
/// ```rust
/// use objstream::observability::span_pipeline;
///
/// let span = span_pipeline("orders");
/// let _guard = span.enter();
/// ```
#[inline]
pub fn span_pipeline(name: &str) -> Span {
    span!(Level::INFO, "pipeline", name = %name)
}

/// Create a span for one boundary task, nested under `parent`.
#[inline]
pub fn span_stage(parent: &Span, stage: &str) -> Span {
    span!(parent: parent, Level::DEBUG, "stage", stage = %stage)
}

/// Log a task failure.
#[inline]
pub fn trace_error(stage: &str, error: &dyn std::error::Error) {
    tracing::error!(stage = %stage, error = %error, "processing error");
}

/// Log end-of-stream.
#[inline]
pub fn trace_eos(stage: &str, elements: u64) {
    tracing::debug!(stage = %stage, elements = elements, "end of stream");
}

/// Log pipeline state change.
#[inline]
pub fn trace_state_change(pipeline: &str, from: &str, to: &str) {
    tracing::debug!(
        pipeline = %pipeline,
        from = %from,
        to = %to,
        "pipeline state changed"
    );
}
