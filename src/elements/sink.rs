//! Built-in sinks backing the terminal operations.

use std::future::{Future, ready};
use std::marker::PhantomData;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::element::Sink;
use crate::error::{Failure, Outcome};

// ============================================================================
// Collect
// ============================================================================

/// A sink that collects items into a vector.
///
/// Use `into_inner()` to get the collected items after the pipeline runs.
pub struct CollectSink<T> {
    items: Vec<T>,
}

impl<T> CollectSink<T> {
    /// Create a new collecting sink.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Get the collected items.
    pub fn into_inner(self) -> Vec<T> {
        self.items
    }

    /// Get a reference to the collected items.
    pub fn items(&self) -> &[T] {
        &self.items
    }
}

impl<T> Default for CollectSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Sink for CollectSink<T> {
    type Input = T;

    fn write(&mut self, item: T) -> impl Future<Output = Outcome<()>> + Send {
        self.items.push(item);
        ready(Ok(()))
    }

    fn name(&self) -> &str {
        "collect"
    }
}

// ============================================================================
// For each
// ============================================================================

/// A sink that calls a function for each item.
pub struct ForEachSink<F, T> {
    f: F,
    _t: PhantomData<T>,
}

impl<F, T> ForEachSink<F, T> {
    /// Create a new for_each sink.
    pub fn new(f: F) -> Self {
        Self { f, _t: PhantomData }
    }
}

impl<F, T> Sink for ForEachSink<F, T>
where
    F: FnMut(T) -> Outcome<()> + Send,
    T: Send + 'static,
{
    type Input = T;

    fn write(&mut self, item: T) -> impl Future<Output = Outcome<()>> + Send {
        ready((self.f)(item))
    }

    fn name(&self) -> &str {
        "for_each"
    }
}

/// A sink that awaits a function for each item.
///
/// The next item is only pulled once the previous call has completed.
pub struct ForEachAsyncSink<F, T> {
    f: F,
    _t: PhantomData<T>,
}

impl<F, T> ForEachAsyncSink<F, T> {
    /// Create a new for_each_async sink.
    pub fn new(f: F) -> Self {
        Self { f, _t: PhantomData }
    }
}

impl<F, Fut, T> Sink for ForEachAsyncSink<F, T>
where
    F: FnMut(T) -> Fut + Send,
    Fut: Future<Output = Outcome<()>> + Send,
    T: Send + 'static,
{
    type Input = T;

    fn write(&mut self, item: T) -> impl Future<Output = Outcome<()>> + Send {
        (self.f)(item)
    }

    fn name(&self) -> &str {
        "for_each_async"
    }
}

// ============================================================================
// Writer
// ============================================================================

/// A sink writing byte-like items to an async writer.
///
/// Every write is awaited before the next item is pulled. The writer is
/// flushed and shut down when the stream ends; get it back with
/// [`into_inner`](WriterSink::into_inner).
pub struct WriterSink<W, T> {
    writer: W,
    bytes_written: u64,
    _t: PhantomData<T>,
}

impl<W, T> WriterSink<W, T> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            bytes_written: 0,
            _t: PhantomData,
        }
    }

    /// Total bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Get the writer back.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W, T> Sink for WriterSink<W, T>
where
    W: AsyncWrite + Unpin + Send,
    T: AsRef<[u8]> + Send + 'static,
{
    type Input = T;

    fn write(&mut self, item: T) -> impl Future<Output = Outcome<()>> + Send {
        async move {
            let bytes = item.as_ref();
            self.writer.write_all(bytes).await.map_err(Failure::from)?;
            self.bytes_written += bytes.len() as u64;
            Ok(())
        }
    }

    fn close(&mut self) -> impl Future<Output = Outcome<()>> + Send {
        async move {
            self.writer.flush().await.map_err(Failure::from)?;
            self.writer.shutdown().await.map_err(Failure::from)
        }
    }

    fn name(&self) -> &str {
        "writer"
    }
}
