//! Runner phase and shared status.
//!
//! [`StreamPhase`] drives the [`StreamRunner`](super::StreamRunner) state
//! machine.  [`StreamStatus`] is what other tasks (a UI, a health probe, the
//! binary's summary log) read while the runner works, through the
//! [`SharedStatus`] handle.

use std::sync::{Arc, Mutex, PoisonError};

use super::stream::StreamStats;

// ---------------------------------------------------------------------------
// StreamPhase
// ---------------------------------------------------------------------------

/// Phases of the stream runner.
///
/// ```text
/// Idle ──Chunk──▶ Streaming ──Finish──▶ Finished ──Chunk──▶ Streaming …
///                    │  ▲
///        bad chunk ──▼  │── good chunk
///                   Error
/// any ──sink declined──▶ Cancelled (terminal)
/// any ──Abort──────────▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
    /// No stream in progress.
    #[default]
    Idle,
    /// Chunks are being decoded and played.
    Streaming,
    /// The last chunk was malformed.  Recoverable: the next good chunk
    /// returns to `Streaming`.
    Error,
    /// The last stream was flushed and closed.
    Finished,
    /// The sink stopped accepting audio; the runner has exited.
    Cancelled,
}

impl StreamPhase {
    /// Returns `true` while a stream is open.
    ///
    /// ```
    /// use tts_stream::pipeline::StreamPhase;
    ///
    /// assert!(StreamPhase::Streaming.is_active());
    /// assert!(StreamPhase::Error.is_active());
    /// assert!(!StreamPhase::Finished.is_active());
    /// ```
    pub fn is_active(&self) -> bool {
        matches!(self, StreamPhase::Streaming | StreamPhase::Error)
    }

    /// Short label for logs and status displays.
    pub fn label(&self) -> &'static str {
        match self {
            StreamPhase::Idle => "Idle",
            StreamPhase::Streaming => "Streaming",
            StreamPhase::Error => "Error",
            StreamPhase::Finished => "Done",
            StreamPhase::Cancelled => "Cancelled",
        }
    }
}

// ---------------------------------------------------------------------------
// StreamStatus
// ---------------------------------------------------------------------------

/// Snapshot of the runner, updated after every command.
#[derive(Debug, Clone, Default)]
pub struct StreamStatus {
    /// Current phase.
    pub phase: StreamPhase,

    /// Counters of the current (or just finished) stream.
    pub stats: StreamStats,

    /// Most recent decode or truncation message.  Cleared when a new stream
    /// starts.
    pub last_error: Option<String>,

    /// Streams that reached `Finish`, including ones with a truncated tail.
    pub streams_completed: u64,
}

// ---------------------------------------------------------------------------
// SharedStatus
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`StreamStatus`].  Cheap to clone.
pub type SharedStatus = Arc<Mutex<StreamStatus>>;

/// Construct a new [`SharedStatus`] in the `Idle` phase.
pub fn new_shared_status() -> SharedStatus {
    Arc::new(Mutex::new(StreamStatus::default()))
}

/// Copy the current status out of `status`.
///
/// A poisoned lock still yields the last written snapshot.
pub fn snapshot(status: &SharedStatus) -> StreamStatus {
    status.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
