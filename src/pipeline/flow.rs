//! Buffering configuration and pipeline lifecycle state.
//!
//! Every stage boundary is a bounded channel. Its capacity (the
//! high-water-mark) is the number of elements that may sit between a
//! producer and its consumer before the producer is suspended:
//!
//! ```text
//! source ──[hwm]──> stage₁ ──[hwm]──> group_by_chunk ──[hwm]──> sink
//!                                 ^
//!                                 └── forced to 1 for aggregating stages
//! ```
//!
//! The high-water-mark defaults to [`DEFAULT_BUFFER_SIZE`] and can be
//! overridden through [`StreamOptions`] for a whole pipeline or a single
//! stage. Overrides are carried forward to the stages appended later.

use std::num::NonZeroUsize;

use crate::error::{Error, Result};

/// High-water-mark used when nothing overrides it.
pub const DEFAULT_BUFFER_SIZE: usize = 16;

/// Input high-water-mark of the aggregating stages
/// (`group_by_key`, `group_by_chunk`).
pub const AGGREGATE_BUFFER_SIZE: usize = 1;

/// Buffering options for a pipeline or a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamOptions {
    /// High-water-mark override. `None` inherits.
    pub buffer_size: Option<NonZeroUsize>,
}

impl StreamOptions {
    /// Options that override nothing.
    pub const fn new() -> Self {
        Self { buffer_size: None }
    }

    /// Override the high-water-mark.
    pub const fn with_buffer_size(buffer_size: NonZeroUsize) -> Self {
        Self {
            buffer_size: Some(buffer_size),
        }
    }

    /// Override the high-water-mark, rejecting zero.
    pub fn try_with_buffer_size(buffer_size: usize) -> Result<Self> {
        NonZeroUsize::new(buffer_size)
            .map(Self::with_buffer_size)
            .ok_or_else(|| Error::InvalidArgument {
                name: "buffer_size",
                reason: "must be a positive integer".into(),
            })
    }

    /// Layer `overrides` on top of these options.
    #[must_use]
    pub fn merge(self, overrides: StreamOptions) -> Self {
        Self {
            buffer_size: overrides.buffer_size.or(self.buffer_size),
        }
    }

    /// The high-water-mark these options resolve to.
    pub fn effective_buffer_size(&self) -> usize {
        self.buffer_size
            .map_or(DEFAULT_BUFFER_SIZE, NonZeroUsize::get)
    }
}

/// Lifecycle of a pipeline value.
///
/// `Idle → Running → {Completed | Failed}`; the last two are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PipelineState {
    /// Built but not drained.
    #[default]
    Idle = 0,
    /// A terminal operation is pulling elements.
    Running = 1,
    /// Drained to the end.
    Completed = 2,
    /// Drained with a failure.
    Failed = 3,
}

impl PipelineState {
    /// Check if no further transition can happen.
    #[inline]
    pub fn is_final(&self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }

    /// Short name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::Running => "Running",
            PipelineState::Completed => "Completed",
            PipelineState::Failed => "Failed",
        }
    }
}

impl From<u8> for PipelineState {
    fn from(value: u8) -> Self {
        match value {
            0 => PipelineState::Idle,
            1 => PipelineState::Running,
            2 => PipelineState::Completed,
            _ => PipelineState::Failed,
        }
    }
}

impl From<PipelineState> for u8 {
    fn from(state: PipelineState) -> Self {
        state as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_buffer_size() {
        assert_eq!(StreamOptions::default().effective_buffer_size(), 16);
        assert_eq!(StreamOptions::new(), StreamOptions::default());
    }

    #[test]
    fn test_try_with_buffer_size() {
        let options = StreamOptions::try_with_buffer_size(4).unwrap();
        assert_eq!(options.effective_buffer_size(), 4);

        assert!(matches!(
            StreamOptions::try_with_buffer_size(0),
            Err(Error::InvalidArgument { name: "buffer_size", .. })
        ));
    }

    #[test]
    fn test_merge_prefers_overrides() {
        let base = StreamOptions::try_with_buffer_size(8).unwrap();
        let two = StreamOptions::try_with_buffer_size(2).unwrap();

        assert_eq!(base.merge(StreamOptions::new()).effective_buffer_size(), 8);
        assert_eq!(base.merge(two).effective_buffer_size(), 2);
        assert_eq!(StreamOptions::new().merge(two).effective_buffer_size(), 2);
    }

    #[test]
    fn test_state_conversion() {
        for state in [
            PipelineState::Idle,
            PipelineState::Running,
            PipelineState::Completed,
            PipelineState::Failed,
        ] {
            assert_eq!(PipelineState::from(u8::from(state)), state);
        }
        assert!(PipelineState::Failed.is_final());
        assert!(!PipelineState::Running.is_final());
    }
}
