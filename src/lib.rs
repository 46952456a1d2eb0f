//! # objstream
//!
//! Bounded-memory, order-preserving pipelines over asynchronous sequences
//! of typed elements.
//!
//! A [`Pipeline`] is built from a source (an iterator or a
//! [`futures::Stream`]) and a chain of stages, then drained by exactly one
//! terminal operation.
//!
//! ## Features
//!
//! - **Strict ordering**: a stage asks for element N+1 only after element N
//!   and everything it emitted have been handed downstream
//! - **Bounded memory**: every stage boundary is a bounded channel;
//!   aggregating stages take one element at a time
//! - **Sync and async logic**: closures, futures and custom [`Stage`]s
//! - **Fail-fast errors**: the first failure aborts the whole chain and is
//!   returned unchanged, or wrapped in a [`StreamError`](error::StreamError)
//!   when it is not an error object
//!
//! ## Quick Start
//!
//! ```rust
//! use objstream::prelude::*;
//!
//! # futures::executor::block_on(async {
//! let groups = Pipeline::from_iter([("a", 1), ("a", 2), ("b", 3)])
//!     .group_by_key(|(key, _)| key.to_string())
//!     .map(|group| (group.key, group.grouped_values.len()))
//!     .to_vec()
//!     .await?;
//!
//! assert_eq!(groups, vec![("a".to_string(), 2), ("b".to_string(), 1)]);
//! # Ok::<(), Error>(())
//! # }).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod element;
pub mod elements;
pub mod error;
pub mod observability;
pub mod pipeline;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::element::{Emitter, Sink, Stage};
    pub use crate::elements::GroupingByKey;
    pub use crate::error::{Error, Failure, Outcome, Result, StreamError};
    pub use crate::pipeline::{Pipeline, StreamOptions};
}

pub use error::{Error, Result};
pub use pipeline::Pipeline;
