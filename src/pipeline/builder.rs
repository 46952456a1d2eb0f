//! The persistent `Pipeline<T>` value and its combinators.

use std::future::Future;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tracing::{Instrument, debug};

use super::executor::{create_runtime, drain_into_sink, drive};
use super::flow::{AGGREGATE_BUFFER_SIZE, PipelineState, StreamOptions};
use super::graph::{Node, Plan, SourceNode, StageNode, StateCell};
use crate::element::{Sink, Stage, StageRuntime};
use crate::elements::{
    CollectSink, Filter, FilterMap, FlatMap, FlatMapAsync, ForEachAsyncSink, ForEachSink,
    GroupByChunk, GroupByKey, GroupingByKey, Map, MapAsync, TryMap,
};
use crate::error::{Error, Failure, Outcome, Result};
use crate::observability::{span_pipeline, span_stage, trace_state_change};

/// An immutable, appendable chain of stages anchored to a source.
///
/// Combinators take `&self` and return a new pipeline sharing every stage
/// of the parent; the parent is left untouched. Terminal operations
/// ([`to_vec`](Self::to_vec), [`for_each`](Self::for_each),
/// [`write_to`](Self::write_to)) consume the pipeline and drive it to the
/// end.
///
/// A source can only be drained once. After a pipeline has been drained,
/// every other pipeline sharing its source (its ancestors, siblings and
/// clones) fails with [`Error::AlreadyConsumed`].
///
/// # Example
///
/// ```rust
/// use objstream::Pipeline;
///
/// # futures::executor::block_on(async {
/// let chunks = Pipeline::from_iter(1..=5)
///     .map(|x| x * 10)
///     .filter(|x| *x != 30)
///     .group_by_chunk(2)?
///     .to_vec()
///     .await?;
///
/// assert_eq!(chunks, vec![vec![10, 20], vec![40, 50]]);
/// # Ok::<(), objstream::Error>(())
/// # }).unwrap();
/// ```
pub struct Pipeline<T> {
    tail: Arc<dyn Node<T>>,
    options: StreamOptions,
    state: Arc<StateCell>,
    name: Option<Arc<str>>,
}

impl<T> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            tail: Arc::clone(&self.tail),
            options: self.options,
            state: Arc::clone(&self.state),
            name: self.name.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Sources
// ============================================================================

impl<T: Send + 'static> Pipeline<T> {
    fn from_node(tail: Arc<dyn Node<T>>) -> Self {
        Self {
            tail,
            options: StreamOptions::default(),
            state: Arc::default(),
            name: None,
        }
    }

    /// Create a pipeline over an iterator.
    #[allow(clippy::should_implement_trait)]
    pub fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::from_stream(futures::stream::iter(iter))
    }

    /// Create a pipeline over an asynchronous stream.
    ///
    /// The stream is only polled when the first boundary has room.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        Self::from_node(Arc::new(SourceNode::new(stream.map(Ok).boxed())))
    }

    /// Create a pipeline over a fallible stream.
    ///
    /// The first `Err` aborts the pipeline with [`Error::Source`].
    pub fn from_try_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<T, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let stream = stream.map(|item| item.map_err(Failure::from));
        Self::from_node(Arc::new(SourceNode::new(stream.boxed())))
    }
}

// ============================================================================
// Configuration and state
// ============================================================================

impl<T: Send + 'static> Pipeline<T> {
    /// Override the buffering options for every stage appended after this
    /// point, and for the terminal consumer.
    #[must_use]
    pub fn with_options(&self, options: StreamOptions) -> Self {
        Self {
            tail: Arc::clone(&self.tail),
            options: self.options.merge(options),
            state: Arc::default(),
            name: self.name.clone(),
        }
    }

    /// Name the pipeline; the name is attached to its tracing span.
    #[must_use]
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            tail: Arc::clone(&self.tail),
            options: self.options,
            state: Arc::default(),
            name: Some(Arc::from(name.into())),
        }
    }

    /// The buffering options carried by this pipeline.
    pub fn options(&self) -> StreamOptions {
        self.options
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("pipeline")
    }

    fn append<U: Send + 'static>(
        &self,
        runtime: Box<dyn StageRuntime<T, U>>,
        options: StreamOptions,
        input_capacity: usize,
    ) -> Pipeline<U> {
        Pipeline {
            tail: Arc::new(StageNode::new(Arc::clone(&self.tail), runtime, input_capacity)),
            options,
            state: Arc::default(),
            name: self.name.clone(),
        }
    }
}

// ============================================================================
// Intermediate operations
// ============================================================================

impl<T: Send + 'static> Pipeline<T> {
    /// Append an arbitrary [`Stage`].
    pub fn transform_with<S>(&self, stage: S) -> Pipeline<S::Output>
    where
        S: Stage<Input = T>,
    {
        self.transform_with_options(stage, StreamOptions::new())
    }

    /// Append an arbitrary [`Stage`] with its own buffering override.
    ///
    /// The override applies to this stage's input and is carried forward.
    pub fn transform_with_options<S>(&self, stage: S, overrides: StreamOptions) -> Pipeline<S::Output>
    where
        S: Stage<Input = T>,
    {
        self.apply_transform_with_options(create_runtime(stage), overrides)
    }

    /// Append an already-built [`StageRuntime`].
    pub fn apply_transform<U>(&self, runtime: Box<dyn StageRuntime<T, U>>) -> Pipeline<U>
    where
        U: Send + 'static,
    {
        self.apply_transform_with_options(runtime, StreamOptions::new())
    }

    /// Append an already-built [`StageRuntime`] with its own buffering
    /// override.
    pub fn apply_transform_with_options<U>(
        &self,
        runtime: Box<dyn StageRuntime<T, U>>,
        overrides: StreamOptions,
    ) -> Pipeline<U>
    where
        U: Send + 'static,
    {
        let options = self.options.merge(overrides);
        self.append(runtime, options, options.effective_buffer_size())
    }

    /// Transform each element with a synchronous function.
    pub fn map<U, F>(&self, f: F) -> Pipeline<U>
    where
        F: FnMut(T) -> U + Send + 'static,
        U: Send + 'static,
    {
        self.transform_with(Map::new(f))
    }

    /// Transform each element with a fallible synchronous function.
    pub fn try_map<U, F>(&self, f: F) -> Pipeline<U>
    where
        F: FnMut(T) -> Outcome<U> + Send + 'static,
        U: Send + 'static,
    {
        self.transform_with(TryMap::new(f))
    }

    /// Transform each element with an asynchronous function.
    ///
    /// The next element is requested only once the returned future has
    /// settled.
    pub fn map_async<U, F, Fut>(&self, f: F) -> Pipeline<U>
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = Outcome<U>> + Send,
        U: Send + 'static,
    {
        self.transform_with(MapAsync::new(f))
    }

    /// Replace each element by the items of a collection, in order.
    pub fn flat_map<I, F>(&self, f: F) -> Pipeline<I::Item>
    where
        F: FnMut(T) -> I + Send + 'static,
        I: IntoIterator + Send + 'static,
        I::Item: Send + 'static,
    {
        self.transform_with(FlatMap::new(f))
    }

    /// Replace each element by the items of an awaited collection.
    pub fn flat_map_async<I, F, Fut>(&self, f: F) -> Pipeline<I::Item>
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = Outcome<I>> + Send,
        I: IntoIterator + Send + 'static,
        I::Item: Send + 'static,
    {
        self.transform_with(FlatMapAsync::new(f))
    }

    /// Keep the elements matching `predicate`.
    pub fn filter<F>(&self, predicate: F) -> Pipeline<T>
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        self.transform_with(Filter::new(predicate))
    }

    /// Keep and narrow the elements for which `f` returns `Some`.
    pub fn filter_map<U, F>(&self, f: F) -> Pipeline<U>
    where
        F: FnMut(T) -> Option<U> + Send + 'static,
        U: Send + 'static,
    {
        self.transform_with(FilterMap::new(f))
    }

    /// Group runs of consecutive elements sharing a key.
    ///
    /// The input must already be ordered by key for each key to appear in
    /// a single record. Its input buffer is limited to one element.
    pub fn group_by_key<K, F>(&self, key_fn: F) -> Pipeline<GroupingByKey<K, T>>
    where
        F: FnMut(&T) -> K + Send + 'static,
        K: PartialEq + Send + 'static,
    {
        self.append(
            create_runtime(GroupByKey::new(key_fn)),
            self.options,
            AGGREGATE_BUFFER_SIZE,
        )
    }

    /// Group elements into chunks of `chunk_size`; the last one may be
    /// shorter. Its input buffer is limited to one element.
    ///
    /// Fails with [`Error::InvalidArgument`] if `chunk_size` is zero.
    pub fn group_by_chunk(&self, chunk_size: usize) -> Result<Pipeline<Vec<T>>> {
        let stage = GroupByChunk::new(chunk_size)?;
        Ok(self.append(create_runtime(stage), self.options, AGGREGATE_BUFFER_SIZE))
    }
}

// ============================================================================
// Terminal operations
// ============================================================================

impl<T: Send + 'static> Pipeline<T> {
    /// Drain into a `Vec`, in order.
    pub async fn to_vec(self) -> Result<Vec<T>> {
        self.write_to(CollectSink::new())
            .await
            .map(CollectSink::into_inner)
    }

    /// Call `f` once per element, in order.
    pub async fn for_each<F>(self, f: F) -> Result<()>
    where
        F: FnMut(T) -> Outcome<()> + Send,
    {
        self.write_to(ForEachSink::new(f)).await.map(drop)
    }

    /// Await `f` once per element; the next element is only pulled once
    /// the previous call has completed.
    pub async fn for_each_async<F, Fut>(self, f: F) -> Result<()>
    where
        F: FnMut(T) -> Fut + Send,
        Fut: Future<Output = Outcome<()>> + Send,
    {
        self.write_to(ForEachAsyncSink::new(f)).await.map(drop)
    }

    /// Drain into `sink` and hand it back once it has closed.
    pub async fn write_to<K>(self, sink: K) -> Result<K>
    where
        K: Sink<Input = T>,
    {
        if !self.state.begin() {
            return Err(Error::AlreadyConsumed);
        }
        trace_state_change(self.name(), "Idle", "Running");

        let span = span_pipeline(self.name());
        let result = self.run(sink).instrument(span).await;

        let state = self.state.finish(result.is_ok());
        trace_state_change(self.name(), "Running", state.as_str());
        result
    }

    async fn run<K>(&self, sink: K) -> Result<K>
    where
        K: Sink<Input = T>,
    {
        if !self.tail.available() {
            return Err(Error::AlreadyConsumed);
        }

        let mut plan = Plan::new(tracing::Span::current());
        let input = self
            .tail
            .materialize(&mut plan, self.options.effective_buffer_size())?;
        debug!(
            tasks = plan.len() + 1,
            buffer_size = self.options.effective_buffer_size(),
            "pipeline started"
        );

        let consumer = drain_into_sink(sink, input).instrument(span_stage(plan.span(), "sink"));
        drive(plan.into_tasks(), consumer).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_combinators_do_not_mutate_parent() {
        let base = Pipeline::from_iter(vec![1, 2, 3]);
        let doubled = base.map(|x| x * 2);
        assert_eq!(base.state(), PipelineState::Idle);
        assert_eq!(doubled.to_vec().await.unwrap(), vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let pipeline = Pipeline::from_iter(0..3u32);
        let observer = pipeline.clone();
        assert_eq!(observer.state(), PipelineState::Idle);

        pipeline.to_vec().await.unwrap();
        assert_eq!(observer.state(), PipelineState::Completed);
        assert!(matches!(
            observer.to_vec().await,
            Err(Error::AlreadyConsumed)
        ));
    }

    #[tokio::test]
    async fn test_failed_state() {
        let pipeline = Pipeline::from_iter(0..3u32).try_map(|x| {
            if x == 1 {
                Err(Failure::value("one"))
            } else {
                Ok(x)
            }
        });
        let observer = pipeline.clone();
        assert!(pipeline.to_vec().await.is_err());
        assert_eq!(observer.state(), PipelineState::Failed);
    }

    #[tokio::test]
    async fn test_ancestor_is_consumed_by_descendant() {
        let base = Pipeline::from_iter(0..3u32);
        let child = base.map(|x| x + 1);
        child.to_vec().await.unwrap();

        assert_eq!(base.state(), PipelineState::Idle);
        assert!(matches!(base.to_vec().await, Err(Error::AlreadyConsumed)));
    }

    #[tokio::test]
    async fn test_options_are_carried_forward() {
        let options = StreamOptions::try_with_buffer_size(3).unwrap();
        let pipeline = Pipeline::from_iter(0..3u32)
            .with_options(options)
            .map(|x| x)
            .group_by_chunk(2)
            .unwrap()
            .map(|chunk| chunk.len());
        assert_eq!(pipeline.options().effective_buffer_size(), 3);
        assert_eq!(pipeline.to_vec().await.unwrap(), vec![2, 1]);
    }

    #[test]
    fn test_group_by_chunk_rejects_zero() {
        let err = Pipeline::from_iter(0..3u32).group_by_chunk(0).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_named_pipeline() {
        let pipeline = Pipeline::from_iter(["a", "b"]).with_name("letters");
        assert!(format!("{pipeline:?}").contains("letters"));
        assert_eq!(pipeline.to_vec().await.unwrap(), vec!["a", "b"]);
    }
}
