//! Stateful aggregation stages.
//!
//! Both stages hold partial state across many inputs, so the pipeline
//! limits their input boundary to a single element (see
//! [`AGGREGATE_BUFFER_SIZE`](crate::pipeline::AGGREGATE_BUFFER_SIZE)).

use std::future::{Future, ready};
use std::mem;

use crate::element::{Emitter, Stage};
use crate::error::{Error, Outcome, Result};

/// A run of consecutive elements sharing one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingByKey<K, T> {
    /// The key shared by every value of the run.
    pub key: K,
    /// The values, in arrival order.
    pub grouped_values: Vec<T>,
}

// ============================================================================
// Group by key
// ============================================================================

/// Groups consecutive elements with equal keys.
///
/// A record is emitted when the key changes and once more at end of stream.
/// Input that is not ordered by key yields several records with the same
/// key; nothing is sorted or merged.
pub struct GroupByKey<F, K, T> {
    key_fn: F,
    open: Option<GroupingByKey<K, T>>,
}

impl<F, K, T> GroupByKey<F, K, T> {
    /// Create a new group_by_key stage.
    pub fn new(key_fn: F) -> Self {
        Self { key_fn, open: None }
    }
}

impl<F, K, T> Stage for GroupByKey<F, K, T>
where
    F: FnMut(&T) -> K + Send + 'static,
    K: PartialEq + Send + 'static,
    T: Send + 'static,
{
    type Input = T;
    type Output = GroupingByKey<K, T>;

    fn transform_element(
        &mut self,
        value: T,
        emit: &mut Emitter<GroupingByKey<K, T>>,
    ) -> impl Future<Output = Outcome<()>> + Send {
        let key = (self.key_fn)(&value);
        match self.open.as_mut().filter(|open| open.key == key) {
            Some(open) => open.grouped_values.push(value),
            None => {
                let fresh = GroupingByKey {
                    key,
                    grouped_values: vec![value],
                };
                if let Some(closed) = self.open.replace(fresh) {
                    emit.emit(closed);
                }
            }
        }
        ready(Ok(()))
    }

    fn on_end(&mut self, emit: &mut Emitter<GroupingByKey<K, T>>) -> Outcome<()> {
        if let Some(open) = self.open.take() {
            emit.emit(open);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "group_by_key"
    }
}

// ============================================================================
// Group by chunk
// ============================================================================

/// Groups elements into fixed-size chunks.
///
/// The last chunk may be shorter; it is emitted at end of stream unless
/// empty.
pub struct GroupByChunk<T> {
    chunk_size: usize,
    buffer: Vec<T>,
}

impl<T> GroupByChunk<T> {
    /// Create a new group_by_chunk stage.
    ///
    /// Fails if `chunk_size` is zero.
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidArgument {
                name: "chunk_size",
                reason: "must be a positive integer".into(),
            });
        }
        Ok(Self {
            chunk_size,
            buffer: Vec::with_capacity(chunk_size),
        })
    }

    /// Configured chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl<T: Send + 'static> Stage for GroupByChunk<T> {
    type Input = T;
    type Output = Vec<T>;

    fn transform_element(
        &mut self,
        value: T,
        emit: &mut Emitter<Vec<T>>,
    ) -> impl Future<Output = Outcome<()>> + Send {
        self.buffer.push(value);
        if self.buffer.len() >= self.chunk_size {
            let full = mem::replace(&mut self.buffer, Vec::with_capacity(self.chunk_size));
            emit.emit(full);
        }
        ready(Ok(()))
    }

    fn on_end(&mut self, emit: &mut Emitter<Vec<T>>) -> Outcome<()> {
        if !self.buffer.is_empty() {
            emit.emit(mem::take(&mut self.buffer));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "group_by_chunk"
    }
}
