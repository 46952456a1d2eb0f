//! Boundary tasks and the loop that drives them.
//!
//! A running pipeline is a set of futures, one per boundary task:
//!
//! ```text
//! pump_source ──> run_stage ──> run_stage ──> drain_into_sink
//! ```
//!
//! They are polled together by [`drive`] inside the caller's task, most
//! downstream first. Nothing is spawned, so no two elements are ever
//! processed in parallel, and dropping the driving future tears down every
//! task and the source.

use std::future::{Future, poll_fn};
use std::panic::{self, AssertUnwindSafe};
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Waker};

use futures::future::BoxFuture;
use futures::task::{self, ArcWake, AtomicWaker};
use futures::{FutureExt, StreamExt};
use tracing::{debug, trace};

use super::graph::{SourceStream, Task};
use crate::element::{Emitter, Inlet, Message, Outlet, Sink, Stage, StageRuntime};
use crate::error::{Error, Failure, Outcome, Result};
use crate::observability::{trace_eos, trace_error};

// ============================================================================
// Stage runtime
// ============================================================================

/// Wrap a [`Stage`] into a boxed [`StageRuntime`].
///
/// The result can be handed to
/// [`Pipeline::apply_transform`](super::Pipeline::apply_transform).
///
/// ```rust
/// use objstream::elements::Map;
/// use objstream::pipeline::{Pipeline, create_runtime};
///
/// # futures::executor::block_on(async {
/// let runtime = create_runtime(Map::new(|x: u32| x + 1));
/// let out = Pipeline::from_iter([1, 2]).apply_transform(runtime).to_vec().await?;
/// assert_eq!(out, vec![2, 3]);
/// # Ok::<(), objstream::Error>(())
/// # }).unwrap();
/// ```
pub fn create_runtime<S: Stage>(stage: S) -> Box<dyn StageRuntime<S::Input, S::Output>> {
    Box::new(StageDriver::new(stage))
}

/// The built-in [`StageRuntime`] for a [`Stage`].
pub struct StageDriver<S> {
    stage: S,
    name: String,
}

impl<S: Stage> StageDriver<S> {
    /// Create a driver for `stage`.
    pub fn new(stage: S) -> Self {
        let name = stage.name().to_string();
        Self { stage, name }
    }
}

impl<S: Stage> StageRuntime<S::Input, S::Output> for StageDriver<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(
        self: Box<Self>,
        input: Inlet<S::Input>,
        output: Outlet<S::Output>,
    ) -> BoxFuture<'static, Result<()>> {
        let StageDriver { stage, name } = *self;
        run_stage(stage, name, input, output).boxed()
    }
}

/// Convert a caught panic into a failure.
fn settle<R>(caught: std::thread::Result<Outcome<R>>) -> Outcome<R> {
    caught.unwrap_or_else(|payload| Err(Failure::from_panic(payload)))
}

fn stage_failed(stage: String, failure: Failure) -> Error {
    let source = failure.into_inner();
    trace_error(&stage, source.as_ref());
    Error::Stage { stage, source }
}

fn sink_failed(sink: String, failure: Failure) -> Error {
    let source = failure.into_inner();
    trace_error(&sink, source.as_ref());
    Error::Sink { sink, source }
}

/// Hand every pending value downstream, in order.
///
/// Returns `false` once the downstream is gone.
async fn forward<T>(emit: &mut Emitter<T>, output: &mut Outlet<T>) -> bool {
    for value in emit.drain() {
        if !output.push(value).await {
            return false;
        }
    }
    true
}

async fn run_stage<S: Stage>(
    mut stage: S,
    name: String,
    mut input: Inlet<S::Input>,
    mut output: Outlet<S::Output>,
) -> Result<()> {
    debug!(stage = %name, capacity = input.capacity(), "stage task started");
    let mut emit = Emitter::new();

    loop {
        match input.recv().await {
            Some(Message::Item(value)) => {
                let caught = AssertUnwindSafe(async {
                    stage.transform_element(value, &mut emit).await
                })
                .catch_unwind()
                .await;
                if let Err(failure) = settle(caught) {
                    return Err(stage_failed(name, failure));
                }
                trace!(stage = %name, emitted = emit.len(), "element processed");
                if !forward(&mut emit, &mut output).await {
                    debug!(stage = %name, "downstream gone, stopping");
                    return Ok(());
                }
            }
            Some(Message::Eos) => {
                let caught = panic::catch_unwind(AssertUnwindSafe(|| stage.on_end(&mut emit)));
                if let Err(failure) = settle(caught) {
                    return Err(stage_failed(name, failure));
                }
                if forward(&mut emit, &mut output).await {
                    trace_eos(&name, output.sent());
                    output.finish().await;
                }
                debug!(
                    stage = %name,
                    received = input.received(),
                    "stage task finished"
                );
                return Ok(());
            }
            None => {
                debug!(stage = %name, "upstream disconnected");
                return Err(Error::Disconnected { stage: name });
            }
        }
    }
}

// ============================================================================
// Source and sink tasks
// ============================================================================

/// Pull the source on demand and push into the first boundary.
pub(crate) async fn pump_source<T: Send + 'static>(
    mut stream: SourceStream<T>,
    mut output: Outlet<T>,
) -> Result<()> {
    debug!("source task started");

    loop {
        let next = AssertUnwindSafe(stream.next()).catch_unwind().await;
        let next = match next {
            Ok(next) => next,
            Err(payload) => Some(Err(Failure::from_panic(payload))),
        };

        match next {
            Some(Ok(value)) => {
                if !output.push(value).await {
                    debug!(pulled = output.sent(), "downstream gone, releasing source");
                    return Ok(());
                }
            }
            Some(Err(failure)) => {
                let source = failure.into_inner();
                trace_error("source", source.as_ref());
                return Err(Error::Source(source));
            }
            None => {
                trace_eos("source", output.sent());
                output.finish().await;
                return Ok(());
            }
        }
    }
}

/// Feed the last boundary into `sink`, one acknowledged write at a time.
pub(crate) async fn drain_into_sink<K: Sink>(mut sink: K, mut input: Inlet<K::Input>) -> Result<K> {
    let name = sink.name().to_string();
    debug!(sink = %name, capacity = input.capacity(), "sink task started");

    loop {
        match input.recv().await {
            Some(Message::Item(item)) => {
                let caught = AssertUnwindSafe(async { sink.write(item).await })
                    .catch_unwind()
                    .await;
                if let Err(failure) = settle(caught) {
                    return Err(sink_failed(name, failure));
                }
            }
            Some(Message::Eos) => {
                let caught = AssertUnwindSafe(async { sink.close().await })
                    .catch_unwind()
                    .await;
                if let Err(failure) = settle(caught) {
                    return Err(sink_failed(name, failure));
                }
                debug!(sink = %name, received = input.received(), "sink task finished");
                return Ok(sink);
            }
            None => {
                debug!(sink = %name, "upstream disconnected");
                return Err(Error::Disconnected { stage: name });
            }
        }
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Upper bound on polls per wakeup of the driving task.
const POLL_BUDGET: usize = 256;

/// Wake flag of one scheduled future. Waking it also wakes the driver.
struct TaskWaker {
    woken: AtomicBool,
    driver: Arc<AtomicWaker>,
}

impl TaskWaker {
    fn take(&self) -> bool {
        self.woken.swap(false, Ordering::AcqRel)
    }
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.woken.store(true, Ordering::Release);
        arc_self.driver.wake();
    }
}

/// A future polled by [`drive`] only after it has been woken.
struct Scheduled<F> {
    future: F,
    flag: Arc<TaskWaker>,
    waker: Waker,
}

impl<F: Future + Unpin> Scheduled<F> {
    fn new(future: F, driver: &Arc<AtomicWaker>) -> Self {
        let flag = Arc::new(TaskWaker {
            woken: AtomicBool::new(true),
            driver: Arc::clone(driver),
        });
        let waker = task::waker(Arc::clone(&flag));
        Self {
            future,
            flag,
            waker,
        }
    }

    fn is_woken(&self) -> bool {
        self.flag.woken.load(Ordering::Acquire)
    }

    /// Poll if woken since the last poll.
    fn poll_woken(&mut self) -> Option<Poll<F::Output>> {
        if !self.flag.take() {
            return None;
        }
        Some(self.future.poll_unpin(&mut Context::from_waker(&self.waker)))
    }
}

/// Poll every boundary task and the consumer until the consumer is done.
///
/// `tasks` are ordered from the source to the last stage. Woken futures
/// are polled downstream first, and the scan restarts at the consumer
/// after every poll, so an element handed to a boundary is taken by its
/// consumer before upstream tasks pull more input.
///
/// The first real failure is returned at once; dropping the remaining
/// tasks aborts them. [`Error::Disconnected`] is only a symptom of another
/// task failing, so it is reported only if nothing else fails.
pub(crate) async fn drive<K>(
    tasks: Vec<Task>,
    consumer: impl Future<Output = Result<K>>,
) -> Result<K> {
    let driver = Arc::new(AtomicWaker::new());
    let mut tasks: Vec<Option<Scheduled<Task>>> = tasks
        .into_iter()
        .map(|future| Some(Scheduled::new(future, &driver)))
        .collect();
    let consumer = pin!(consumer);
    let mut consumer = Some(Scheduled::new(consumer, &driver));
    let mut output: Option<K> = None;
    let mut disconnected: Option<Error> = None;

    poll_fn(|cx| {
        driver.register(cx.waker());

        for _ in 0..POLL_BUDGET {
            let finished = consumer.as_mut().and_then(|slot| match slot.poll_woken() {
                Some(Poll::Ready(result)) => Some(result),
                _ => None,
            });
            if let Some(result) = finished {
                consumer = None;
                match result {
                    Ok(value) => output = Some(value),
                    Err(err @ Error::Disconnected { .. }) => {
                        disconnected.get_or_insert(err);
                    }
                    Err(err) => return Poll::Ready(Err(err)),
                }
            }

            let polled = tasks
                .iter_mut()
                .enumerate()
                .rev()
                .find_map(|(index, slot)| Some((index, slot.as_mut()?.poll_woken()?)));
            match polled {
                Some((index, Poll::Ready(result))) => {
                    tasks[index] = None;
                    match result {
                        Ok(()) => {}
                        Err(err @ Error::Disconnected { .. }) => {
                            disconnected.get_or_insert(err);
                        }
                        Err(err) => return Poll::Ready(Err(err)),
                    }
                }
                Some((_, Poll::Pending)) => {}
                None if consumer.as_ref().is_some_and(Scheduled::is_woken) => {}
                None => {
                    if consumer.is_some() || tasks.iter().any(Option::is_some) {
                        return Poll::Pending;
                    }
                    if let Some(err) = disconnected.take() {
                        return Poll::Ready(Err(err));
                    }
                    return match output.take() {
                        Some(value) => Poll::Ready(Ok(value)),
                        None => Poll::Pending,
                    };
                }
            }
        }

        cx.waker().wake_by_ref();
        Poll::Pending
    })
    .await
}
