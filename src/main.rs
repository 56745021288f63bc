//! Application entry point — stream a base64 `LINEAR16` payload to raw PCM.
//!
//! ```text
//! tts-stream <input.b64|-> [output.pcm|-]
//! ```
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run and writes
//!    it out so there is a file to edit).
//! 3. Create [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Spawn the [`StreamRunner`] and a blocking PCM writer task.
//! 5. Read the input in `chunk_size` pieces and feed the runner until EOF
//!    or until playback stops accepting audio.
//! 6. Log a summary of the decoded stream.

use std::fs::File;
use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tts_stream::{
    audio::{PcmWriter, SampleSink},
    config::{AppConfig, AppPaths},
    pipeline::{new_shared_status, snapshot, SharedStatus, StreamCommand, StreamRunner},
};

const USAGE: &str = "usage: tts-stream <input.b64|-> [output.pcm|-]";

fn main() -> Result<()> {
    // 1. Logging (stderr, so PCM on stdout stays clean)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (input, output) = match args.as_slice() {
        [input] => (input.clone(), "-".to_string()),
        [input, output] => (input.clone(), output.clone()),
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    config.validate()?;
    let settings_file = AppPaths::new().settings_file;
    if !settings_file.exists() {
        match config.save() {
            Ok(()) => log::info!("Wrote default settings to {}", settings_file.display()),
            Err(e) => log::warn!("Could not write default settings: {e}"),
        }
    }

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let status = new_shared_status();
    let written = rt.block_on(stream(&input, output, &config, status.clone()))?;

    // 6. Summary
    let st = snapshot(&status);
    let rate = config.playback.sample_rate;
    log::info!(
        "{}: {} samples, {} PCM bytes written, {:.2} s at {} Hz",
        st.phase.label(),
        st.stats.samples,
        written,
        st.stats.duration_secs(rate),
        rate
    );
    if let Some(err) = st.last_error {
        log::warn!("last stream error: {err}");
    }
    Ok(())
}

/// Feed `input` through a [`StreamRunner`] and write PCM to `output`.
///
/// Returns the number of PCM bytes written.
async fn stream(
    input: &str,
    output: String,
    config: &AppConfig,
    status: SharedStatus,
) -> Result<u64> {
    // 4. Runner + playback writer
    let (cmd_tx, cmd_rx) = mpsc::channel(config.stream.queue_capacity);
    let (pcm_tx, pcm_rx) = mpsc::channel::<Vec<i16>>(config.playback.queue_capacity);

    let runner = tokio::spawn(StreamRunner::new(status, pcm_tx).run(cmd_rx));
    let writer = tokio::task::spawn_blocking(move || write_pcm(pcm_rx, &output));

    // 5. Producer
    let mut reader: Box<dyn AsyncRead + Unpin + Send> = if input == "-" {
        Box::new(tokio::io::stdin())
    } else {
        Box::new(
            tokio::fs::File::open(input)
                .await
                .with_context(|| format!("failed to open {input}"))?,
        )
    };

    let mut buf = vec![0u8; config.stream.chunk_size];
    loop {
        let n = reader.read(&mut buf).await.context("failed to read input")?;
        if n == 0 {
            if cmd_tx.send(StreamCommand::Finish).await.is_err() {
                log::debug!("runner closed before end of input");
            }
            break;
        }
        // Line breaks are transport framing, not base64 data.
        let chunk: Vec<u8> = buf[..n]
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        if cmd_tx.send(StreamCommand::Chunk(chunk)).await.is_err() {
            log::info!("playback stopped; no further input read");
            break;
        }
    }
    drop(cmd_tx);

    // The runner hands back its sender; dropping it ends the writer loop.
    drop(runner.await.context("stream runner panicked")?);
    writer.await.context("PCM writer panicked")?
}

/// Blocking playback side: drain sample batches into `output`.
fn write_pcm(mut rx: mpsc::Receiver<Vec<i16>>, output: &str) -> Result<u64> {
    let target: Box<dyn Write + Send> = if output == "-" {
        Box::new(io::stdout())
    } else {
        Box::new(File::create(output).with_context(|| format!("failed to create {output}"))?)
    };

    let mut writer = PcmWriter::new(BufWriter::new(target));
    while let Some(batch) = rx.blocking_recv() {
        if !writer.dispatch(&batch) {
            break;
        }
    }

    if let Some(err) = writer.take_error() {
        return Err(err).context("failed to write PCM output");
    }
    writer.flush().context("failed to flush PCM output")?;
    Ok(writer.bytes_written())
}
