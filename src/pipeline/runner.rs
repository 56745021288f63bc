//! Stream runner — drives a [`PcmStream`] from an async command channel.
//!
//! [`StreamRunner`] owns the stream and the playback sink.  A fetch task sends
//! [`StreamCommand`]s over a bounded `tokio::sync::mpsc` channel; the runner
//! decodes each chunk and awaits the sink before reading the next command.
//!
//! # Flow
//!
//! ```text
//! fetch task ──Chunk(bytes)──▶ runner ──PcmStream::feed──▶ sink.dispatch().await
//!            ──Finish────────▶        ──PcmStream::finish─▶ sink.dispatch().await
//!            ──Abort─────────▶        ──PcmStream::abort
//!
//! sink.dispatch() == false ──▶ Cancelled, receiver closed, fetch task's
//!                              send() fails and it stops downloading
//! ```
//!
//! Backpressure falls out of the bounded channels: a slow sink stalls the
//! runner, a stalled runner fills the command channel, and a full command
//! channel parks the fetch task.

use tokio::sync::mpsc;

use crate::audio::AsyncSampleSink;

use super::state::{SharedStatus, StreamPhase, StreamStatus};
use super::stream::{Flow, PcmStream, StreamError, StreamStats};

// ---------------------------------------------------------------------------
// StreamCommand
// ---------------------------------------------------------------------------

/// Messages from the fetch task to the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamCommand {
    /// The next fragment of base64 text, any length.
    Chunk(Vec<u8>),
    /// The payload is complete; flush and close the stream.
    Finish,
    /// Drop the current stream without flushing.
    Abort,
}

// ---------------------------------------------------------------------------
// StreamRunner
// ---------------------------------------------------------------------------

/// Async driver for one [`PcmStream`] and its sink.
///
/// Streams are served one after another: after `Finish` or `Abort` the
/// runner is ready for the next stream's chunks.
///
/// ```rust,no_run
/// use tokio::sync::mpsc;
/// use tts_stream::pipeline::{new_shared_status, StreamCommand, StreamRunner};
///
/// # async fn example() {
/// let (cmd_tx, cmd_rx) = mpsc::channel(8);
/// let (pcm_tx, mut pcm_rx) = mpsc::channel::<Vec<i16>>(4);
///
/// let runner = StreamRunner::new(new_shared_status(), pcm_tx);
/// tokio::spawn(runner.run(cmd_rx));
///
/// cmd_tx.send(StreamCommand::Chunk(b"AQACAAMA".to_vec())).await.unwrap();
/// cmd_tx.send(StreamCommand::Finish).await.unwrap();
/// drop(cmd_tx);
///
/// while let Some(batch) = pcm_rx.recv().await {
///     println!("play {} samples", batch.len());
/// }
/// # }
/// ```
pub struct StreamRunner<S> {
    status: SharedStatus,
    stream: PcmStream,
    sink: S,
}

impl<S: AsyncSampleSink> StreamRunner<S> {
    /// Create a runner that reports into `status` and plays through `sink`.
    pub fn new(status: SharedStatus, sink: S) -> Self {
        Self {
            status,
            stream: PcmStream::new(),
            sink,
        }
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Process commands until the channel closes or the sink cancels.
    ///
    /// Returns the sink so the caller can flush or inspect it.  A stream left
    /// open when the channel closes is discarded without a flush.
    pub async fn run(mut self, mut cmd_rx: mpsc::Receiver<StreamCommand>) -> S {
        while let Some(cmd) = cmd_rx.recv().await {
            let flow = match cmd {
                StreamCommand::Chunk(chunk) => self.handle_chunk(&chunk).await,
                StreamCommand::Finish => self.handle_finish().await,
                StreamCommand::Abort => {
                    self.handle_abort();
                    Flow::Continue
                }
            };

            if flow == Flow::Stop {
                // Closing the receiver makes every pending and future send fail.
                cmd_rx.close();
                break;
            }
        }

        if self.stream.stats().chunks > 0 && !self.stream.is_stopped() {
            log::debug!("runner: command channel closed mid-stream, discarding pending data");
        }
        log::info!("runner: shutting down");
        self.sink
    }

    // -----------------------------------------------------------------------
    // Command handlers
    // -----------------------------------------------------------------------

    async fn handle_chunk(&mut self, chunk: &[u8]) -> Flow {
        if !self.current_phase().is_active() {
            log::debug!("runner: new stream");
            self.update(|st| {
                st.stats = StreamStats::default();
                st.last_error = None;
            });
        }

        let mut batch = None;
        let result = self.stream.feed(chunk, &mut |s: &[i16]| {
            batch = Some(s.to_vec());
            true
        });

        match result {
            Ok(_) => self.set_phase(StreamPhase::Streaming),
            Err(err) => self.record_error(StreamPhase::Error, &err),
        }

        let flow = self.forward(batch).await;
        self.publish_stats();
        flow
    }

    async fn handle_finish(&mut self) -> Flow {
        let mut batch = None;
        let result = self.stream.finish(&mut |s: &[i16]| {
            batch = Some(s.to_vec());
            true
        });

        if self.forward(batch).await == Flow::Stop {
            self.publish_stats();
            return Flow::Stop;
        }
        self.publish_stats();

        match result {
            Ok(stats) => {
                log::info!(
                    "runner: stream finished ({} samples, {} batches)",
                    stats.samples,
                    stats.batches
                );
                self.set_phase(StreamPhase::Finished);
            }
            Err(err) => self.record_error(StreamPhase::Finished, &err),
        }
        self.update(|st| st.streams_completed += 1);

        // Ready for the next stream; the status keeps the final counters.
        self.stream.abort();
        Flow::Continue
    }

    fn handle_abort(&mut self) {
        log::info!(
            "runner: stream aborted after {} samples",
            self.stream.stats().samples
        );
        self.stream.abort();
        self.update(|st| {
            st.phase = StreamPhase::Idle;
            st.stats = StreamStats::default();
        });
    }

    /// Hand a batch to the sink; cancels the stream when it is refused.
    async fn forward(&mut self, batch: Option<Vec<i16>>) -> Flow {
        let Some(samples) = batch else {
            return Flow::Continue;
        };
        if self.sink.dispatch(samples).await {
            return Flow::Continue;
        }

        log::info!("runner: sink closed, cancelling stream");
        self.stream.abort();
        self.set_phase(StreamPhase::Cancelled);
        Flow::Stop
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn update(&self, f: impl FnOnce(&mut StreamStatus)) {
        let mut st = self
            .status
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut st);
    }

    fn current_phase(&self) -> StreamPhase {
        super::state::snapshot(&self.status).phase
    }

    fn set_phase(&self, phase: StreamPhase) {
        self.update(|st| st.phase = phase);
    }

    fn publish_stats(&self) {
        let stats = self.stream.stats();
        self.update(|st| st.stats = stats);
    }

    fn record_error(&self, phase: StreamPhase, err: &StreamError) {
        log::warn!("runner: {err}");
        let message = err.to_string();
        self.update(|st| {
            st.phase = phase;
            st.last_error = Some(message);
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::state::{new_shared_status, snapshot};
    use async_trait::async_trait;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Collects every sample; refuses audio after `limit` batches.
    #[derive(Default)]
    struct CollectSink {
        samples: Vec<i16>,
        batches: usize,
        limit: Option<usize>,
    }

    #[async_trait]
    impl AsyncSampleSink for CollectSink {
        async fn dispatch(&mut self, samples: Vec<i16>) -> bool {
            if self.limit.is_some_and(|limit| self.batches >= limit) {
                return false;
            }
            self.batches += 1;
            self.samples.extend(samples);
            true
        }
    }

    fn chunk(text: &str) -> StreamCommand {
        StreamCommand::Chunk(text.as_bytes().to_vec())
    }

    async fn run_commands(
        sink: CollectSink,
        commands: Vec<StreamCommand>,
    ) -> (CollectSink, StreamStatus) {
        let status = new_shared_status();
        let (tx, rx) = mpsc::channel(commands.len().max(1));
        for cmd in commands {
            tx.send(cmd).await.unwrap();
        }
        drop(tx);

        let sink = StreamRunner::new(status.clone(), sink).run(rx).await;
        (sink, snapshot(&status))
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn chunks_then_finish_reach_finished() {
        // 01 00 02 00 03 00 → "AQACAAMA"
        let (sink, status) = run_commands(
            CollectSink::default(),
            vec![chunk("AQA"), chunk("CAA"), chunk("MA"), StreamCommand::Finish],
        )
        .await;

        assert_eq!(sink.samples, vec![1, 2, 3]);
        assert_eq!(status.phase, StreamPhase::Finished);
        assert_eq!(status.stats.samples, 3);
        assert_eq!(status.stats.chunks, 3);
        assert_eq!(status.streams_completed, 1);
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn open_stream_stays_streaming_without_finish() {
        let (_, status) = run_commands(CollectSink::default(), vec![chunk("AQAC")]).await;
        assert_eq!(status.phase, StreamPhase::Streaming);
        assert_eq!(status.streams_completed, 0);
    }

    #[tokio::test]
    async fn bad_chunk_is_recoverable() {
        let (sink, status) = run_commands(
            CollectSink::default(),
            vec![chunk("AQ!!"), chunk("AQACAAMA"), StreamCommand::Finish],
        )
        .await;

        assert_eq!(sink.samples, vec![1, 2, 3]);
        assert_eq!(status.phase, StreamPhase::Finished);
        assert_eq!(status.stats.decode_errors, 1);
        // The error message survives until the next stream starts.
        assert!(status.last_error.is_some());
    }

    #[tokio::test]
    async fn bad_chunk_between_good_ones_keeps_samples_aligned() {
        // 01 00 02 00 03 00 04 00 05 00 06 00 → "AQACAAMABAAFAAYA"
        let (sink, status) = run_commands(
            CollectSink::default(),
            vec![
                chunk("AQAC"),
                chunk("A!MA"),
                chunk("BAAF"),
                chunk("AAYA"),
                StreamCommand::Finish,
            ],
        )
        .await;

        // Sample 2 lost its high byte and sample 3 was dropped whole.
        assert_eq!(sink.samples, vec![1, 4, 5, 6]);
        assert_eq!(status.phase, StreamPhase::Finished);
        assert_eq!(status.stats.decode_errors, 1);
        assert_eq!(status.stats.truncated_frames, 0);
        assert_eq!(status.stats.chunks, 4);
    }

    #[tokio::test]
    async fn bad_chunk_sets_error_phase() {
        let (_, status) = run_commands(CollectSink::default(), vec![chunk("****")]).await;
        assert_eq!(status.phase, StreamPhase::Error);
        let message = status.last_error.expect("error message");
        assert!(message.contains("0x2a"), "message: {message}");
    }

    #[tokio::test]
    async fn truncated_tail_finishes_with_warning() {
        // 01 00 02 → "AQAC"
        let (sink, status) = run_commands(
            CollectSink::default(),
            vec![chunk("AQAC"), StreamCommand::Finish],
        )
        .await;

        assert_eq!(sink.samples, vec![1]);
        assert_eq!(status.phase, StreamPhase::Finished);
        assert_eq!(status.stats.truncated_frames, 1);
        assert_eq!(status.streams_completed, 1);
        assert!(status.last_error.unwrap().contains("mid-sample"));
    }

    #[tokio::test]
    async fn sink_refusal_cancels_and_closes_channel() {
        let status = new_shared_status();
        let (tx, rx) = mpsc::channel(4);
        tx.send(chunk("AQAC")).await.unwrap();
        tx.send(chunk("AAMA")).await.unwrap();

        let sink = CollectSink {
            limit: Some(1),
            ..Default::default()
        };
        let sink = StreamRunner::new(status.clone(), sink).run(rx).await;

        assert_eq!(sink.samples, vec![1]);
        assert_eq!(snapshot(&status).phase, StreamPhase::Cancelled);
        // The fetch side sees the cancellation as a failed send.
        assert!(tx.send(StreamCommand::Finish).await.is_err());
    }

    #[tokio::test]
    async fn abort_returns_to_idle_and_allows_a_new_stream() {
        let (sink, status) = run_commands(
            CollectSink::default(),
            vec![
                chunk("AQA"),
                StreamCommand::Abort,
                chunk("AwA="),
                StreamCommand::Finish,
            ],
        )
        .await;

        // Only the second stream's sample (03 00) is played.
        assert_eq!(sink.samples, vec![3]);
        assert_eq!(status.phase, StreamPhase::Finished);
        assert_eq!(status.stats.chunks, 1);
    }

    #[tokio::test]
    async fn abort_alone_leaves_runner_idle() {
        let (sink, status) =
            run_commands(CollectSink::default(), vec![chunk("AQAC"), StreamCommand::Abort]).await;
        assert_eq!(sink.samples, vec![1]);
        assert_eq!(status.phase, StreamPhase::Idle);
        assert_eq!(status.stats, StreamStats::default());
    }

    #[tokio::test]
    async fn consecutive_streams_are_independent() {
        let (sink, status) = run_commands(
            CollectSink::default(),
            vec![
                chunk("AQA"),
                StreamCommand::Finish,
                chunk("AwA="),
                StreamCommand::Finish,
            ],
        )
        .await;

        // "AQA" → "AQA=" decodes to 01 00 → sample 1.
        assert_eq!(sink.samples, vec![1, 3]);
        assert_eq!(status.streams_completed, 2);
        assert_eq!(status.stats.samples, 1);
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn tokio_channel_sink_delivers_batches() {
        let status = new_shared_status();
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let (pcm_tx, mut pcm_rx) = mpsc::channel::<Vec<i16>>(4);

        let handle = tokio::spawn(StreamRunner::new(status.clone(), pcm_tx).run(cmd_rx));
        cmd_tx.send(chunk("AQACAAMA")).await.unwrap();
        cmd_tx.send(StreamCommand::Finish).await.unwrap();
        drop(cmd_tx);

        let mut played = Vec::new();
        while let Some(batch) = pcm_rx.recv().await {
            played.extend(batch);
        }
        handle.await.unwrap();
        assert_eq!(played, vec![1, 2, 3]);
    }
}
