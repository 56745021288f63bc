//! PCM stage — decoded bytes → `i16` samples → playback sink.
//!
//! # Pipeline
//!
//! ```text
//! decoded bytes → FrameAssembler::push → Samples (lazy) → SampleSink::dispatch
//!                                                              │
//!                                          false ◀─────────────┘ stop feeding
//! ```
//!
//! Samples are mono, signed 16-bit little-endian.  The sample rate is not
//! part of the byte stream; callers track it themselves (24 kHz for the
//! common TTS `LINEAR16` output).

pub mod frame;
pub mod sink;

pub use frame::{FrameAssembler, Samples, TruncatedFrameWarning, BYTES_PER_SAMPLE};
pub use sink::{AsyncSampleSink, ChannelSink, PcmWriter, SampleSink};
