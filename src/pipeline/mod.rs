//! Pipeline construction and execution.
//!
//! This module provides the core pipeline infrastructure:
//!
//! - [`Pipeline`]: The persistent, appendable chain of stages
//! - [`StreamOptions`]: Buffering (high-water-mark) configuration
//! - [`StageDriver`] / [`create_runtime`]: Run a [`Stage`](crate::element::Stage)
//!   under the backpressure discipline
//! - [`PipelineState`]: Lifecycle of a pipeline value
//!
//! # Example
//!
//! ```rust
//! use objstream::pipeline::{Pipeline, StreamOptions};
//!
//! # futures::executor::block_on(async {
//! let options = StreamOptions::try_with_buffer_size(4)?;
//! let mut seen = Vec::new();
//! Pipeline::from_iter(["a", "bb", "ccc"])
//!     .with_options(options)
//!     .map(str::len)
//!     .for_each(|len| {
//!         seen.push(len);
//!         Ok(())
//!     })
//!     .await?;
//! assert_eq!(seen, vec![1, 2, 3]);
//! # Ok::<(), objstream::Error>(())
//! # }).unwrap();
//! ```

mod builder;
mod executor;
mod flow;
mod graph;

pub use builder::Pipeline;
pub use executor::{StageDriver, create_runtime};
pub use flow::{AGGREGATE_BUFFER_SIZE, DEFAULT_BUFFER_SIZE, PipelineState, StreamOptions};
