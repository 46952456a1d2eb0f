//! Handles passed to stages and runtimes.

use std::future::poll_fn;
use std::task::Poll;

use kanal::{AsyncReceiver, AsyncSender, bounded_async};

/// Message passed across a stage boundary.
#[derive(Debug)]
pub enum Message<T> {
    /// A data element.
    Item(T),
    /// End of stream signal.
    Eos,
}

// ============================================================================
// Emitter
// ============================================================================

/// Collects the values a stage emits for the element it is processing.
///
/// Emitted values are handed downstream, in emission order, once the
/// stage callback has settled. The next input is only requested after all
/// of them have been accepted by the downstream boundary.
#[derive(Debug)]
pub struct Emitter<T> {
    pending: Vec<T>,
}

impl<T> Emitter<T> {
    /// Create an empty emitter.
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Emit one value.
    #[inline]
    pub fn emit(&mut self, value: T) {
        self.pending.push(value);
    }

    /// Emit every value of an iterator, in order.
    pub fn emit_all<I: IntoIterator<Item = T>>(&mut self, values: I) {
        self.pending.extend(values);
    }

    /// Number of values waiting to be handed downstream.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if nothing was emitted.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take the pending values, in emission order.
    pub fn drain(&mut self) -> std::vec::Drain<'_, T> {
        self.pending.drain(..)
    }

    /// Consume the emitter, returning the pending values.
    pub fn into_inner(self) -> Vec<T> {
        self.pending
    }
}

impl<T> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Boundary ends
// ============================================================================

/// Create a bounded boundary holding at most `capacity` in-flight elements.
pub(crate) fn boundary<T>(capacity: usize) -> (Outlet<T>, Inlet<T>) {
    let (tx, rx) = bounded_async::<Message<T>>(capacity);
    (
        Outlet { tx, sent: 0 },
        Inlet {
            rx,
            received: 0,
            capacity,
        },
    )
}

/// Receiving end of a stage boundary.
pub struct Inlet<T> {
    rx: AsyncReceiver<Message<T>>,
    received: u64,
    capacity: usize,
}

impl<T> Inlet<T> {
    /// Wait for the next message.
    ///
    /// Returns `None` when the upstream went away without sending
    /// [`Message::Eos`], which only happens when the pipeline is aborting.
    pub async fn recv(&mut self) -> Option<Message<T>> {
        let message = self.rx.recv().await.ok()?;
        if let Message::Item(_) = message {
            self.received += 1;
        }
        Some(message)
    }

    /// Number of elements received so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// High-water-mark of this boundary.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Sending end of a stage boundary.
pub struct Outlet<T> {
    tx: AsyncSender<Message<T>>,
    sent: u64,
}

impl<T> Outlet<T> {
    /// Hand one element downstream, waiting while the boundary is full.
    ///
    /// Once the element is accepted the caller yields, so the driver can
    /// run the consumer of this boundary before any more upstream work.
    ///
    /// Returns `false` if the downstream has gone away; the caller should
    /// stop producing.
    pub async fn push(&mut self, value: T) -> bool {
        if self.tx.send(Message::Item(value)).await.is_err() {
            return false;
        }
        self.sent += 1;
        yield_now().await;
        true
    }

    /// Signal end of stream and close the boundary.
    pub async fn finish(self) -> bool {
        self.tx.send(Message::Eos).await.is_ok()
    }

    /// Number of elements handed downstream so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

/// Return `Pending` once, waking the current task.
async fn yield_now() {
    let mut yielded = false;
    poll_fn(|cx| {
        if yielded {
            return Poll::Ready(());
        }
        yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitter_keeps_order() {
        let mut emitter = Emitter::new();
        emitter.emit(1);
        emitter.emit_all([2, 3]);
        assert_eq!(emitter.len(), 3);
        assert_eq!(emitter.drain().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(emitter.is_empty());
    }

    #[tokio::test]
    async fn test_boundary_delivers_items_then_eos() {
        let (mut outlet, mut inlet) = boundary::<u32>(4);
        assert!(outlet.push(1).await);
        assert!(outlet.push(2).await);
        assert_eq!(outlet.sent(), 2);
        assert!(outlet.finish().await);

        assert!(matches!(inlet.recv().await, Some(Message::Item(1))));
        assert!(matches!(inlet.recv().await, Some(Message::Item(2))));
        assert!(matches!(inlet.recv().await, Some(Message::Eos)));
        assert_eq!(inlet.received(), 2);
        assert_eq!(inlet.capacity(), 4);
    }

    #[tokio::test]
    async fn test_push_yields_once_accepted() {
        let (mut outlet, mut inlet) = boundary::<u32>(4);
        let mut push = std::pin::pin!(outlet.push(7));
        assert!(futures::poll!(push.as_mut()).is_pending());
        assert!(matches!(inlet.recv().await, Some(Message::Item(7))));
        assert!(push.await);
    }

    #[tokio::test]
    async fn test_dropped_outlet_is_not_eos() {
        let (outlet, mut inlet) = boundary::<u32>(1);
        drop(outlet);
        assert!(inlet.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_push_fails_once_inlet_is_gone() {
        let (mut outlet, inlet) = boundary::<u32>(1);
        drop(inlet);
        assert!(!outlet.push(1).await);
        assert_eq!(outlet.sent(), 0);
    }
}
