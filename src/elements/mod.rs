//! Built-in stages and sinks.
//!
//! ## Point-wise stages
//! - [`Map`], [`TryMap`], [`MapAsync`]: one output per input
//! - [`FlatMap`], [`FlatMapAsync`]: any number of outputs per input
//! - [`Filter`], [`FilterMap`]: zero or one output per input
//! - [`from_fn`], [`from_fn_with_end`]: stages from closures
//!
//! ## Aggregating stages
//! - [`GroupByKey`]: runs of consecutive elements sharing a key
//! - [`GroupByChunk`]: fixed-size chunks
//!
//! ## Sinks
//! - [`CollectSink`]: Collects into a `Vec`
//! - [`ForEachSink`], [`ForEachAsyncSink`]: Per-item callbacks
//! - [`WriterSink`]: Writes bytes to any `tokio::io::AsyncWrite`

mod grouping;
mod sink;
mod transform;

pub use grouping::{GroupByChunk, GroupByKey, GroupingByKey};
pub use sink::{CollectSink, ForEachAsyncSink, ForEachSink, WriterSink};
pub use transform::{
    Filter, FilterMap, FlatMap, FlatMapAsync, FnStage, Map, MapAsync, NoEnd, TryMap, from_fn,
    from_fn_with_end,
};
