//! Persistent chain of pipeline nodes.
//!
//! A pipeline is a singly linked list from its tail back to the source.
//! Combinators allocate one new node pointing at the parent, so every
//! earlier pipeline value stays a valid descriptor of its own prefix.
//!
//! Each node owns a one-shot resource (the source stream or a stage
//! runtime) that is taken out when a terminal operation materializes the
//! chain. Once taken, every pipeline sharing that node reports
//! [`Error::AlreadyConsumed`].

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tracing::{Instrument, Span};

use super::executor::pump_source;
use super::flow::PipelineState;
use crate::element::{Inlet, StageRuntime, boundary};
use crate::error::{Error, Failure, Outcome, Result};
use crate::observability::span_stage;

/// One boundary task of a running pipeline.
pub(crate) type Task = BoxFuture<'static, Result<()>>;

/// Source stream as stored in the graph.
pub(crate) type SourceStream<T> = BoxStream<'static, Outcome<T>>;

// ============================================================================
// Plan
// ============================================================================

/// Boundary tasks collected while materializing a chain.
pub(crate) struct Plan {
    span: Span,
    tasks: Vec<Task>,
}

impl Plan {
    pub(crate) fn new(span: Span) -> Self {
        Self {
            span,
            tasks: Vec::new(),
        }
    }

    /// Add a task running under its own stage span.
    ///
    /// A panic escaping the task fails it as a stage error.
    pub(crate) fn push(&mut self, name: &str, task: Task) {
        let stage = name.to_string();
        let task = AssertUnwindSafe(task).catch_unwind().map(move |caught| {
            caught.unwrap_or_else(|payload| {
                Err(Error::Stage {
                    stage,
                    source: Failure::from_panic(payload).into_inner(),
                })
            })
        });
        self.tasks
            .push(task.instrument(span_stage(&self.span, name)).boxed());
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// A link of the chain producing elements of type `T`.
pub(crate) trait Node<T>: Send + Sync {
    /// Check that this node and all its ancestors can still be drained.
    fn available(&self) -> bool;

    /// Take this node's resource, schedule its task and return the
    /// receiving end of its output boundary.
    ///
    /// `capacity` is the input high-water-mark of the consumer.
    fn materialize(&self, plan: &mut Plan, capacity: usize) -> Result<Inlet<T>>;
}

fn lock<T>(slot: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Head of the chain: the external source.
pub(crate) struct SourceNode<T> {
    stream: Mutex<Option<SourceStream<T>>>,
}

impl<T> SourceNode<T> {
    pub(crate) fn new(stream: SourceStream<T>) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
        }
    }
}

impl<T: Send + 'static> Node<T> for SourceNode<T> {
    fn available(&self) -> bool {
        lock(&self.stream).is_some()
    }

    fn materialize(&self, plan: &mut Plan, capacity: usize) -> Result<Inlet<T>> {
        let stream = lock(&self.stream).take().ok_or(Error::AlreadyConsumed)?;
        let (outlet, inlet) = boundary(capacity);
        plan.push("source", pump_source(stream, outlet).boxed());
        Ok(inlet)
    }
}

/// A stage appended to a parent chain.
pub(crate) struct StageNode<In, Out> {
    parent: Arc<dyn Node<In>>,
    runtime: Mutex<Option<Box<dyn StageRuntime<In, Out>>>>,
    input_capacity: usize,
}

impl<In, Out> StageNode<In, Out> {
    pub(crate) fn new(
        parent: Arc<dyn Node<In>>,
        runtime: Box<dyn StageRuntime<In, Out>>,
        input_capacity: usize,
    ) -> Self {
        Self {
            parent,
            runtime: Mutex::new(Some(runtime)),
            input_capacity,
        }
    }
}

impl<In: Send + 'static, Out: Send + 'static> Node<Out> for StageNode<In, Out> {
    fn available(&self) -> bool {
        lock(&self.runtime).is_some() && self.parent.available()
    }

    fn materialize(&self, plan: &mut Plan, capacity: usize) -> Result<Inlet<Out>> {
        let runtime = lock(&self.runtime).take().ok_or(Error::AlreadyConsumed)?;
        let input = self.parent.materialize(plan, self.input_capacity)?;
        let (outlet, inlet) = boundary(capacity);
        let name = runtime.name().to_string();
        plan.push(&name, runtime.run(input, outlet));
        Ok(inlet)
    }
}

// ============================================================================
// State
// ============================================================================

/// Shared lifecycle state of one pipeline value (and its clones).
#[derive(Debug, Default)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn get(&self) -> PipelineState {
        PipelineState::from(self.0.load(Ordering::Acquire))
    }

    /// Move from `Idle` to `Running`; fails if a terminal operation
    /// already started.
    pub(crate) fn begin(&self) -> bool {
        self.0
            .compare_exchange(
                PipelineState::Idle.into(),
                PipelineState::Running.into(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn finish(&self, succeeded: bool) -> PipelineState {
        let state = if succeeded {
            PipelineState::Completed
        } else {
            PipelineState::Failed
        };
        self.0.store(state.into(), Ordering::Release);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Message;
    use crate::pipeline::create_runtime;
    use crate::elements::Map;
    use futures::StreamExt;

    fn source(values: Vec<u32>) -> Arc<dyn Node<u32>> {
        Arc::new(SourceNode::new(futures::stream::iter(values).map(Ok).boxed()))
    }

    #[test]
    fn test_source_is_one_shot() {
        let node = source(vec![1]);
        let mut plan = Plan::new(Span::none());
        assert!(node.available());
        assert!(node.materialize(&mut plan, 1).is_ok());
        assert!(!node.available());
        assert!(matches!(
            node.materialize(&mut plan, 1),
            Err(Error::AlreadyConsumed)
        ));
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_shared_parent_consumed_through_sibling() {
        let parent = source(vec![1, 2]);
        let left: Arc<dyn Node<u32>> = Arc::new(StageNode::new(
            parent.clone(),
            create_runtime(Map::new(|x: u32| x + 1)),
            4,
        ));
        let right: Arc<dyn Node<u32>> = Arc::new(StageNode::new(
            parent,
            create_runtime(Map::new(|x: u32| x * 2)),
            4,
        ));

        let mut plan = Plan::new(Span::none());
        left.materialize(&mut plan, 4).unwrap();
        assert_eq!(plan.len(), 2);
        assert!(!right.available());
    }

    #[tokio::test]
    async fn test_source_task_pumps_then_eos() {
        let node = source(vec![7, 8]);
        let mut plan = Plan::new(Span::none());
        let mut inlet = node.materialize(&mut plan, 4).unwrap();
        for task in plan.into_tasks() {
            task.await.unwrap();
        }
        assert!(matches!(inlet.recv().await, Some(Message::Item(7))));
        assert!(matches!(inlet.recv().await, Some(Message::Item(8))));
        assert!(matches!(inlet.recv().await, Some(Message::Eos)));
    }

    #[test]
    fn test_state_cell_transitions() {
        let state = StateCell::default();
        assert_eq!(state.get(), PipelineState::Idle);
        assert!(state.begin());
        assert!(!state.begin());
        assert_eq!(state.finish(false), PipelineState::Failed);
        assert_eq!(state.get(), PipelineState::Failed);
    }
}
