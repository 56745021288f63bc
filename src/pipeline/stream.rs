//! Synchronous base64 → PCM stream.
//!
//! [`PcmStream`] glues one [`StreamingDecoder`] to one [`FrameAssembler`]
//! and pushes each chunk's samples to a [`SampleSink`] as a single batch.
//! It owns two scratch buffers sized by the largest chunk seen, so memory
//! stays bounded by the producer's chunk size rather than the stream length.

use thiserror::Error;

use crate::audio::{FrameAssembler, SampleSink, TruncatedFrameWarning, BYTES_PER_SAMPLE};
use crate::decode::{DecodeError, DecoderState, StreamingDecoder};

// ---------------------------------------------------------------------------
// StreamError
// ---------------------------------------------------------------------------

/// Non-fatal problems surfaced by [`PcmStream`].
///
/// Neither variant poisons the stream: after a `Decode` error the samples
/// touched by the dropped groups are skipped and the next chunk is processed
/// normally.  `Truncated` is only reported at finish.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("base64 decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Truncated(#[from] TruncatedFrameWarning),
}

// ---------------------------------------------------------------------------
// Flow
// ---------------------------------------------------------------------------

/// What the producer should do after handing over a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep fetching chunks.
    Continue,
    /// The sink declined further audio; stop fetching.
    Stop,
}

// ---------------------------------------------------------------------------
// StreamStats
// ---------------------------------------------------------------------------

/// Running counters for one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Non-empty base64 chunks accepted.
    pub chunks: u64,
    /// Sample batches handed to the sink.
    pub batches: u64,
    /// Samples handed to the sink.
    pub samples: u64,
    /// Chunks (or final flushes) rejected as malformed base64.
    pub decode_errors: u64,
    /// Streams that ended with a dangling half sample.
    pub truncated_frames: u64,
}

impl StreamStats {
    /// Decoded PCM payload size in bytes.
    pub fn pcm_bytes(&self) -> u64 {
        self.samples * BYTES_PER_SAMPLE as u64
    }

    /// Playback length in seconds at `sample_rate` Hz mono.
    pub fn duration_secs(&self, sample_rate: u32) -> f32 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.samples as f32 / sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// PcmStream
// ---------------------------------------------------------------------------

/// Decoder + frame assembler for a single stream.
///
/// ```rust
/// use tts_stream::pipeline::{Flow, PcmStream};
///
/// let mut played = Vec::new();
/// let mut sink = |s: &[i16]| { played.extend_from_slice(s); true };
///
/// let mut stream = PcmStream::new();
/// // 01 00 02 00 03 00 → "AQACAAMA"
/// for chunk in ["AQA", "CAA", "MA"] {
///     assert_eq!(stream.feed(chunk, &mut sink).unwrap(), Flow::Continue);
/// }
/// let stats = stream.finish(&mut sink).unwrap();
/// assert_eq!(stats.samples, 3);
/// assert_eq!(played, vec![1, 2, 3]);
/// ```
#[derive(Debug, Default)]
pub struct PcmStream {
    decoder: StreamingDecoder,
    frames: FrameAssembler,
    decoded: Vec<u8>,
    batch: Vec<i16>,
    stats: StreamStats,
    stopped: bool,
}

impl PcmStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters accumulated since creation or the last [`abort`](Self::abort).
    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Returns `true` once a sink has declined audio.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn decoder_state(&self) -> DecoderState {
        self.decoder.state()
    }

    /// Decode one base64 chunk and dispatch the complete samples it yields.
    ///
    /// Once a sink has returned `false` every later call is a no-op that
    /// returns [`Flow::Stop`].  After [`finish`](Self::finish) the chunk is
    /// ignored and not counted.
    ///
    /// # Errors
    ///
    /// [`StreamError::Decode`] when the chunk completes a malformed group.
    /// Nothing is dispatched for that chunk, and any sample split by the
    /// dropped bytes is discarded; the stream stays usable.
    pub fn feed<S>(&mut self, chunk: impl AsRef<[u8]>, sink: &mut S) -> Result<Flow, StreamError>
    where
        S: SampleSink + ?Sized,
    {
        if self.stopped {
            return Ok(Flow::Stop);
        }
        let chunk = chunk.as_ref();
        if chunk.is_empty() {
            return Ok(Flow::Continue);
        }
        if self.decoder.is_finished() {
            log::debug!("stream: ignoring chunk fed after finish");
            return Ok(Flow::Continue);
        }
        self.stats.chunks += 1;

        self.decoded.clear();
        if let Err(err) = self.decoder.decode_chunk_into(chunk, &mut self.decoded) {
            self.stats.decode_errors += 1;
            self.frames.skip(self.decoder.dropped_bytes());
            return Err(err.into());
        }
        Ok(self.dispatch_decoded(sink))
    }

    /// Flush the decoder, dispatch the last samples and close the stream.
    ///
    /// Returns the final counters.  After cancellation this only reports the
    /// counters; nothing is flushed.
    ///
    /// # Errors
    ///
    /// [`StreamError::Decode`] when the padded final group is malformed, or
    /// [`StreamError::Truncated`] when an odd byte was left over.  Any good
    /// samples are dispatched before the error is returned.
    pub fn finish<S>(&mut self, sink: &mut S) -> Result<StreamStats, StreamError>
    where
        S: SampleSink + ?Sized,
    {
        if self.stopped {
            return Ok(self.stats);
        }

        self.decoded.clear();
        let flushed = match self.decoder.decode_finish_into(&mut self.decoded) {
            Ok(_) => {
                self.dispatch_decoded(sink);
                Ok(())
            }
            Err(err) => {
                self.stats.decode_errors += 1;
                self.frames.skip(self.decoder.dropped_bytes());
                Err(StreamError::from(err))
            }
        };

        let tail = self.frames.finish().map(|rest| rest.count());
        if tail.is_err() {
            self.stats.truncated_frames += 1;
        }

        flushed?;
        tail?;
        log::debug!(
            "stream finished: {} samples in {} batches",
            self.stats.samples,
            self.stats.batches
        );
        Ok(self.stats)
    }

    /// Drop all buffered state and counters; the stream can be reused.
    pub fn abort(&mut self) {
        self.decoder.reset();
        self.frames.reset();
        self.decoded.clear();
        self.batch.clear();
        self.stats = StreamStats::default();
        self.stopped = false;
    }

    fn dispatch_decoded<S>(&mut self, sink: &mut S) -> Flow
    where
        S: SampleSink + ?Sized,
    {
        self.batch.clear();
        self.batch.extend(self.frames.push(&self.decoded));
        if self.batch.is_empty() {
            return Flow::Continue;
        }

        self.stats.batches += 1;
        self.stats.samples += self.batch.len() as u64;
        if sink.dispatch(&self.batch) {
            Flow::Continue
        } else {
            log::debug!("sink declined audio after {} samples", self.stats.samples);
            self.stopped = true;
            Flow::Stop
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
