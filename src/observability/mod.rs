//! Observability: structured logging and spans via `tracing`.
//!
//! Every terminal operation runs inside a `pipeline` span; each boundary
//! task (source pump, stage runtime, sink consumer) gets a child `stage`
//! span. Install any `tracing` subscriber to see them:
//!
//! ```rust,ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("objstream=debug")
//!     .init();
//! ```

mod tracing_support;

pub use tracing_support::{
    span_pipeline, span_stage, trace_eos, trace_error, trace_state_change,
};
