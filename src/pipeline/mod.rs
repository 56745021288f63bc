//! Stream pipeline — base64 chunks in, PCM batches out.
//!
//! # Architecture
//!
//! ```text
//! fetch task (HTTP body, file, stdin …)
//!        │  StreamCommand (bounded mpsc)
//!        ▼
//! StreamRunner::run()  ← async tokio task
//!        │
//!        ├─ PcmStream::feed    → StreamingDecoder → FrameAssembler
//!        ├─ AsyncSampleSink::dispatch().await      (backpressure point)
//!        └─ SharedStatus (Arc<Mutex<StreamStatus>>) ← read by anyone
//! ```
//!
//! [`PcmStream`] is usable on its own in synchronous code (an embedded
//! playback loop, a blocking thread); [`StreamRunner`] wraps it for tokio.
//!
//! # Quick start
//!
//! ```rust
//! use tts_stream::pipeline::PcmStream;
//!
//! let mut out = Vec::new();
//! let mut stream = PcmStream::new();
//! stream.feed("AQACAAMA", &mut |s: &[i16]| { out.extend_from_slice(s); true }).unwrap();
//! stream.finish(&mut |_: &[i16]| true).unwrap();
//! assert_eq!(out, vec![1, 2, 3]);
//! ```

pub mod runner;
pub mod state;
pub mod stream;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::{StreamCommand, StreamRunner};
pub use state::{new_shared_status, snapshot, SharedStatus, StreamPhase, StreamStatus};
pub use stream::{Flow, PcmStream, StreamError, StreamStats};
