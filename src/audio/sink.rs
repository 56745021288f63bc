//! Playback hand-off.
//!
//! The decoder never talks to an audio device.  It hands each batch of
//! samples to a sink and looks at the returned flag: `true` asks for more
//! audio, `false` means the consumer is gone or wants the stream stopped.
//!
//! | Sink | Backpressure | Stops when |
//! |------|--------------|------------|
//! | `FnMut(&[i16]) -> bool` | caller-defined | closure returns `false` |
//! | [`ChannelSink`] | blocks while the bounded channel is full | receiver dropped |
//! | [`PcmWriter`] | blocking writes | an I/O error occurs |
//! | `tokio::sync::mpsc::Sender` ([`AsyncSampleSink`]) | awaits free capacity | receiver dropped |

use std::io::{self, Write};
use std::sync::mpsc::SyncSender;

use async_trait::async_trait;

// ---------------------------------------------------------------------------
// SampleSink
// ---------------------------------------------------------------------------

/// Synchronous consumer of decoded sample batches.
pub trait SampleSink {
    /// Accept one batch.  Return `false` to stop the producer.
    fn dispatch(&mut self, samples: &[i16]) -> bool;
}

impl<F> SampleSink for F
where
    F: FnMut(&[i16]) -> bool,
{
    fn dispatch(&mut self, samples: &[i16]) -> bool {
        self(samples)
    }
}

// ---------------------------------------------------------------------------
// ChannelSink
// ---------------------------------------------------------------------------

/// Forwards batches over a bounded `std::sync::mpsc` channel.
///
/// `dispatch` blocks while the channel is full, which is how a slow playback
/// thread throttles the decoder.
///
/// ```rust
/// use std::sync::mpsc;
/// use tts_stream::audio::{ChannelSink, SampleSink};
///
/// let (tx, rx) = mpsc::sync_channel(2);
/// let mut sink = ChannelSink::new(tx);
/// assert!(sink.dispatch(&[1, 2, 3]));
/// assert_eq!(rx.recv().unwrap(), vec![1, 2, 3]);
/// drop(rx);
/// assert!(!sink.dispatch(&[4]));
/// ```
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: SyncSender<Vec<i16>>,
}

impl ChannelSink {
    pub fn new(tx: SyncSender<Vec<i16>>) -> Self {
        Self { tx }
    }
}

impl SampleSink for ChannelSink {
    fn dispatch(&mut self, samples: &[i16]) -> bool {
        self.tx.send(samples.to_vec()).is_ok()
    }
}

// ---------------------------------------------------------------------------
// PcmWriter
// ---------------------------------------------------------------------------

/// Writes samples as raw mono s16le PCM to any [`Write`] target.
///
/// The first I/O error stops the stream; it is logged and kept for
/// [`take_error`](Self::take_error).
#[derive(Debug)]
pub struct PcmWriter<W: Write> {
    inner: W,
    scratch: Vec<u8>,
    bytes_written: u64,
    error: Option<io::Error>,
}

impl<W: Write> PcmWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            scratch: Vec::new(),
            bytes_written: 0,
            error: None,
        }
    }

    /// Total PCM bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// The I/O error that stopped the writer, if any.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> SampleSink for PcmWriter<W> {
    fn dispatch(&mut self, samples: &[i16]) -> bool {
        if self.error.is_some() {
            return false;
        }
        self.scratch.clear();
        self.scratch.extend(samples.iter().flat_map(|s| s.to_le_bytes()));

        match self.inner.write_all(&self.scratch) {
            Ok(()) => {
                self.bytes_written += self.scratch.len() as u64;
                true
            }
            Err(e) => {
                log::warn!("pcm writer: write failed after {} bytes: {e}", self.bytes_written);
                self.error = Some(e);
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// AsyncSampleSink
// ---------------------------------------------------------------------------

/// Asynchronous consumer used by [`crate::pipeline::StreamRunner`].
///
/// Awaiting `dispatch` is the backpressure point: the runner reads no more
/// commands until the sink has accepted the batch.
#[async_trait]
pub trait AsyncSampleSink: Send {
    /// Accept one batch.  Return `false` to cancel the stream.
    async fn dispatch(&mut self, samples: Vec<i16>) -> bool;
}

#[async_trait]
impl AsyncSampleSink for tokio::sync::mpsc::Sender<Vec<i16>> {
    async fn dispatch(&mut self, samples: Vec<i16>) -> bool {
        self.send(samples).await.is_ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
