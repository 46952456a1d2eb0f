//! Point-wise stages: map, filter and one-to-many expansions.
//!
//! Every combinator on [`Pipeline`](crate::pipeline::Pipeline) is backed by
//! one of these; they can also be passed to
//! [`Pipeline::transform_with`](crate::pipeline::Pipeline::transform_with)
//! directly.

use std::future::{Future, ready};
use std::marker::PhantomData;

use crate::element::{Emitter, Stage};
use crate::error::Outcome;

// ============================================================================
// Map Operators
// ============================================================================

/// A stage that applies a function to each element.
pub struct Map<F, In, Out> {
    f: F,
    _in: PhantomData<In>,
    _out: PhantomData<Out>,
}

impl<F, In, Out> Map<F, In, Out> {
    /// Create a new map stage.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _in: PhantomData,
            _out: PhantomData,
        }
    }
}

impl<F, In, Out> Stage for Map<F, In, Out>
where
    F: FnMut(In) -> Out + Send + 'static,
    In: Send + 'static,
    Out: Send + 'static,
{
    type Input = In;
    type Output = Out;

    fn transform_element(
        &mut self,
        value: In,
        emit: &mut Emitter<Out>,
    ) -> impl Future<Output = Outcome<()>> + Send {
        emit.emit((self.f)(value));
        ready(Ok(()))
    }

    fn name(&self) -> &str {
        "map"
    }
}

/// A stage that applies a fallible function to each element.
pub struct TryMap<F, In, Out> {
    f: F,
    _in: PhantomData<In>,
    _out: PhantomData<Out>,
}

impl<F, In, Out> TryMap<F, In, Out> {
    /// Create a new try_map stage.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _in: PhantomData,
            _out: PhantomData,
        }
    }
}

impl<F, In, Out> Stage for TryMap<F, In, Out>
where
    F: FnMut(In) -> Outcome<Out> + Send + 'static,
    In: Send + 'static,
    Out: Send + 'static,
{
    type Input = In;
    type Output = Out;

    fn transform_element(
        &mut self,
        value: In,
        emit: &mut Emitter<Out>,
    ) -> impl Future<Output = Outcome<()>> + Send {
        ready((self.f)(value).map(|mapped| emit.emit(mapped)))
    }

    fn name(&self) -> &str {
        "try_map"
    }
}

/// A stage that awaits a future per element and emits its result.
///
/// The next element is not requested until the future settles.
pub struct MapAsync<F, In, Out> {
    f: F,
    _in: PhantomData<In>,
    _out: PhantomData<Out>,
}

impl<F, In, Out> MapAsync<F, In, Out> {
    /// Create a new map_async stage.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _in: PhantomData,
            _out: PhantomData,
        }
    }
}

impl<F, Fut, In, Out> Stage for MapAsync<F, In, Out>
where
    F: FnMut(In) -> Fut + Send + 'static,
    Fut: Future<Output = Outcome<Out>> + Send,
    In: Send + 'static,
    Out: Send + 'static,
{
    type Input = In;
    type Output = Out;

    fn transform_element(
        &mut self,
        value: In,
        emit: &mut Emitter<Out>,
    ) -> impl Future<Output = Outcome<()>> + Send {
        let pending = (self.f)(value);
        async move { pending.await.map(|mapped| emit.emit(mapped)) }
    }

    fn name(&self) -> &str {
        "map_async"
    }
}

// ============================================================================
// Flat Map Operators
// ============================================================================

/// A stage that replaces each element by every item the function returns.
pub struct FlatMap<F, In, I> {
    f: F,
    _in: PhantomData<In>,
    _out: PhantomData<I>,
}

impl<F, In, I> FlatMap<F, In, I> {
    /// Create a new flat_map stage.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _in: PhantomData,
            _out: PhantomData,
        }
    }
}

impl<F, In, I> Stage for FlatMap<F, In, I>
where
    F: FnMut(In) -> I + Send + 'static,
    In: Send + 'static,
    I: IntoIterator + Send + 'static,
    I::Item: Send + 'static,
{
    type Input = In;
    type Output = I::Item;

    fn transform_element(
        &mut self,
        value: In,
        emit: &mut Emitter<I::Item>,
    ) -> impl Future<Output = Outcome<()>> + Send {
        emit.emit_all((self.f)(value));
        ready(Ok(()))
    }

    fn name(&self) -> &str {
        "flat_map"
    }
}

/// A stage that awaits a collection per element and emits all its items.
pub struct FlatMapAsync<F, In, I> {
    f: F,
    _in: PhantomData<In>,
    _out: PhantomData<I>,
}

impl<F, In, I> FlatMapAsync<F, In, I> {
    /// Create a new flat_map_async stage.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _in: PhantomData,
            _out: PhantomData,
        }
    }
}

impl<F, Fut, In, I> Stage for FlatMapAsync<F, In, I>
where
    F: FnMut(In) -> Fut + Send + 'static,
    Fut: Future<Output = Outcome<I>> + Send,
    In: Send + 'static,
    I: IntoIterator + Send + 'static,
    I::Item: Send + 'static,
{
    type Input = In;
    type Output = I::Item;

    fn transform_element(
        &mut self,
        value: In,
        emit: &mut Emitter<I::Item>,
    ) -> impl Future<Output = Outcome<()>> + Send {
        let pending = (self.f)(value);
        async move { pending.await.map(|items| emit.emit_all(items)) }
    }

    fn name(&self) -> &str {
        "flat_map_async"
    }
}

// ============================================================================
// Filter Operators
// ============================================================================

/// A stage that keeps the elements matching a predicate.
pub struct Filter<F, T> {
    predicate: F,
    _t: PhantomData<T>,
}

impl<F, T> Filter<F, T> {
    /// Create a new filter stage.
    pub fn new(predicate: F) -> Self {
        Self {
            predicate,
            _t: PhantomData,
        }
    }
}

impl<F, T> Stage for Filter<F, T>
where
    F: FnMut(&T) -> bool + Send + 'static,
    T: Send + 'static,
{
    type Input = T;
    type Output = T;

    fn transform_element(
        &mut self,
        value: T,
        emit: &mut Emitter<T>,
    ) -> impl Future<Output = Outcome<()>> + Send {
        if (self.predicate)(&value) {
            emit.emit(value);
        }
        ready(Ok(()))
    }

    fn name(&self) -> &str {
        "filter"
    }
}

/// A stage that filters and narrows in one step.
///
/// Elements for which the function returns `None` are dropped.
pub struct FilterMap<F, In, Out> {
    f: F,
    _in: PhantomData<In>,
    _out: PhantomData<Out>,
}

impl<F, In, Out> FilterMap<F, In, Out> {
    /// Create a new filter_map stage.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _in: PhantomData,
            _out: PhantomData,
        }
    }
}

impl<F, In, Out> Stage for FilterMap<F, In, Out>
where
    F: FnMut(In) -> Option<Out> + Send + 'static,
    In: Send + 'static,
    Out: Send + 'static,
{
    type Input = In;
    type Output = Out;

    fn transform_element(
        &mut self,
        value: In,
        emit: &mut Emitter<Out>,
    ) -> impl Future<Output = Outcome<()>> + Send {
        if let Some(kept) = (self.f)(value) {
            emit.emit(kept);
        }
        ready(Ok(()))
    }

    fn name(&self) -> &str {
        "filter_map"
    }
}

// ============================================================================
// Closure Stages
// ============================================================================

/// End callback used when a closure stage has none.
pub type NoEnd<Out> = fn(&mut Emitter<Out>) -> Outcome<()>;

/// A synchronous stage built from closures.
///
/// See [`from_fn`] and [`from_fn_with_end`].
pub struct FnStage<F, E, In, Out> {
    transform: F,
    on_end: Option<E>,
    _in: PhantomData<In>,
    _out: PhantomData<Out>,
}

impl<F, E, In, Out> Stage for FnStage<F, E, In, Out>
where
    F: FnMut(In, &mut Emitter<Out>) -> Outcome<()> + Send + 'static,
    E: FnOnce(&mut Emitter<Out>) -> Outcome<()> + Send + 'static,
    In: Send + 'static,
    Out: Send + 'static,
{
    type Input = In;
    type Output = Out;

    fn transform_element(
        &mut self,
        value: In,
        emit: &mut Emitter<Out>,
    ) -> impl Future<Output = Outcome<()>> + Send {
        ready((self.transform)(value, emit))
    }

    fn on_end(&mut self, emit: &mut Emitter<Out>) -> Outcome<()> {
        match self.on_end.take() {
            Some(on_end) => on_end(emit),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "fn_stage"
    }
}

/// Create a stage from a per-element closure.
///
/// ```rust
/// use objstream::element::Emitter;
/// use objstream::elements::from_fn;
///
/// let duplicate = from_fn(|value: u32, emit: &mut Emitter<u32>| {
///     emit.emit(value);
///     emit.emit(value);
///     Ok(())
/// });
/// # let _ = duplicate;
/// ```
pub fn from_fn<F, In, Out>(transform: F) -> FnStage<F, NoEnd<Out>, In, Out>
where
    F: FnMut(In, &mut Emitter<Out>) -> Outcome<()> + Send + 'static,
    In: Send + 'static,
    Out: Send + 'static,
{
    FnStage {
        transform,
        on_end: None,
        _in: PhantomData,
        _out: PhantomData,
    }
}

/// Create a stage from a per-element closure and an end-of-sequence closure.
pub fn from_fn_with_end<F, E, In, Out>(transform: F, on_end: E) -> FnStage<F, E, In, Out>
where
    F: FnMut(In, &mut Emitter<Out>) -> Outcome<()> + Send + 'static,
    E: FnOnce(&mut Emitter<Out>) -> Outcome<()> + Send + 'static,
    In: Send + 'static,
    Out: Send + 'static,
{
    FnStage {
        transform,
        on_end: Some(on_end),
        _in: PhantomData,
        _out: PhantomData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn feed<S: Stage>(stage: &mut S, value: S::Input) -> Vec<S::Output> {
        let mut emit = Emitter::new();
        stage.transform_element(value, &mut emit).await.unwrap();
        emit.into_inner()
    }

    #[tokio::test]
    async fn test_map() {
        let mut m = Map::new(|x: u32| x * 2);
        assert_eq!(feed(&mut m, 5).await, vec![10]);
        assert_eq!(feed(&mut m, 0).await, vec![0]);
    }

    #[tokio::test]
    async fn test_try_map_error_emits_nothing() {
        let mut m = TryMap::new(|x: u32| {
            if x > 1 {
                Err(crate::error::Failure::value(x))
            } else {
                Ok(x)
            }
        });
        assert_eq!(feed(&mut m, 1).await, vec![1]);

        let mut emit = Emitter::new();
        assert!(m.transform_element(2, &mut emit).await.is_err());
        assert!(emit.is_empty());
    }

    #[tokio::test]
    async fn test_map_async() {
        let mut m = MapAsync::new(|x: u32| async move { Ok(x + 1) });
        assert_eq!(feed(&mut m, 1).await, vec![2]);
    }

    #[tokio::test]
    async fn test_flat_map_in_order() {
        let mut f = FlatMap::new(|x: u32| vec![x; x as usize]);
        assert_eq!(feed(&mut f, 3).await, vec![3, 3, 3]);
        assert!(feed(&mut f, 0).await.is_empty());
    }

    #[tokio::test]
    async fn test_flat_map_async() {
        let mut f = FlatMapAsync::new(|x: u32| async move { Ok(vec![x, x + 1]) });
        assert_eq!(feed(&mut f, 1).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_filter() {
        let mut f = Filter::new(|x: &u32| *x > 5);
        assert_eq!(feed(&mut f, 10).await, vec![10]);
        assert!(feed(&mut f, 3).await.is_empty());
    }

    #[tokio::test]
    async fn test_filter_map() {
        let mut fm = FilterMap::new(|x: u32| if x > 5 { Some(x * 2) } else { None });
        assert_eq!(feed(&mut fm, 10).await, vec![20]);
        assert!(feed(&mut fm, 3).await.is_empty());
    }

    #[tokio::test]
    async fn test_fn_stage_end_runs_once() {
        let mut stage = from_fn_with_end(
            |x: u32, emit: &mut Emitter<u32>| {
                emit.emit(x);
                Ok(())
            },
            |emit: &mut Emitter<u32>| {
                emit.emit(99);
                Ok(())
            },
        );
        assert_eq!(feed(&mut stage, 1).await, vec![1]);

        let mut emit = Emitter::new();
        stage.on_end(&mut emit).unwrap();
        stage.on_end(&mut emit).unwrap();
        assert_eq!(emit.into_inner(), vec![99]);
    }
}
