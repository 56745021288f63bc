//! Incremental base64 decoder.
//!
//! [`StreamingDecoder`] accepts base64 text in fragments of any size and
//! returns the decoded bytes of every complete 4-character group as soon as
//! the group is available.  At most three characters are carried between
//! calls, so memory use is constant no matter how long the stream runs.
//!
//! Concatenating the output of every [`decode_chunk`] call followed by
//! [`decode_finish`] is byte-identical to decoding the whole text in one
//! go, regardless of where the fragment boundaries fall.
//!
//! ```rust
//! use tts_stream::decode::StreamingDecoder;
//!
//! let mut decoder = StreamingDecoder::new();
//! let mut out = Vec::new();
//! for piece in ["SGV", "sbG8gd2", "9ybGQ="] {
//!     out.extend(decoder.decode_chunk(piece).unwrap());
//! }
//! out.extend(decoder.decode_finish().unwrap());
//! assert_eq!(out, b"Hello world");
//! ```
//!
//! [`decode_chunk`]: StreamingDecoder::decode_chunk
//! [`decode_finish`]: StreamingDecoder::decode_finish

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;

/// Characters in one base64 group.
pub const GROUP_LEN: usize = 4;

const PAD: u8 = b'=';

// ---------------------------------------------------------------------------
// DecodeError
// ---------------------------------------------------------------------------

/// A completed base64 group could not be decoded.
///
/// Offsets count characters from the start of the stream, so a failure can
/// be located in the original payload even though it arrived in fragments.
/// The error is recoverable: the decoder stays aligned on group boundaries
/// and later groups still decode.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A byte outside the standard base64 alphabet, or a misplaced `'='`.
    #[error("invalid base64 byte {byte:#04x} at offset {offset}")]
    InvalidByte { offset: u64, byte: u8 },

    /// The final symbol of a padded group carries non-zero trailing bits.
    #[error("non-canonical final base64 symbol {byte:#04x} at offset {offset}")]
    InvalidLastSymbol { offset: u64, byte: u8 },

    /// A group with the wrong number of characters (e.g. a lone character
    /// left over at the end of the stream).
    #[error("incomplete base64 group at offset {offset}")]
    InvalidLength { offset: u64 },

    /// Padding is missing, excessive or malformed.
    #[error("invalid base64 padding in group at offset {offset}")]
    InvalidPadding { offset: u64 },

    /// More text followed a padded group.
    #[error("base64 data after padding at offset {offset}")]
    DataAfterPadding { offset: u64 },
}

impl DecodeError {
    fn from_engine(err: base64::DecodeError, base: u64) -> Self {
        match err {
            base64::DecodeError::InvalidByte(i, byte) => Self::InvalidByte {
                offset: base + i as u64,
                byte,
            },
            base64::DecodeError::InvalidLastSymbol(i, byte) => Self::InvalidLastSymbol {
                offset: base + i as u64,
                byte,
            },
            base64::DecodeError::InvalidLength(_) => Self::InvalidLength { offset: base },
            #[allow(unreachable_patterns)]
            _ => Self::InvalidPadding { offset: base },
        }
    }

    /// Stream offset of the offending character or group.
    pub fn offset(&self) -> u64 {
        match self {
            Self::InvalidByte { offset, .. }
            | Self::InvalidLastSymbol { offset, .. }
            | Self::InvalidLength { offset }
            | Self::InvalidPadding { offset }
            | Self::DataAfterPadding { offset } => *offset,
        }
    }
}

// ---------------------------------------------------------------------------
// DecoderState
// ---------------------------------------------------------------------------

/// Lifecycle of a [`StreamingDecoder`].
///
/// ```text
/// Fresh ──first non-empty chunk──▶ Streaming ──decode_finish──▶ Finished
/// Fresh ──decode_finish──────────────────────────────────────▶ Finished
/// any   ──reset──▶ Fresh
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderState {
    /// No input seen yet.
    #[default]
    Fresh,
    /// At least one non-empty chunk has been accepted.
    Streaming,
    /// [`StreamingDecoder::decode_finish`] was called; further input is
    /// ignored.
    Finished,
}

// ---------------------------------------------------------------------------
// StreamingDecoder
// ---------------------------------------------------------------------------

/// Base64 decoder that can be fed one fragment at a time.
///
/// One instance decodes one stream.  Independent streams use independent
/// instances; the type holds no shared state.
#[derive(Debug, Clone, Default)]
pub struct StreamingDecoder {
    /// Undecoded characters carried over from the previous call.
    pending: [u8; GROUP_LEN - 1],
    pending_len: u8,
    state: DecoderState,
    /// Characters already taken out of the stream into decoded groups.
    consumed: u64,
    /// A padded group has been decoded; nothing may follow it.
    terminated: bool,
    /// Decoded bytes lost by the most recent call.
    dropped: usize,
}

impl StreamingDecoder {
    /// Create a decoder in the [`DecoderState::Fresh`] state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Number of undecoded characters held for the next call (0–3).
    pub fn pending_len(&self) -> usize {
        self.pending_len as usize
    }

    /// Decoded bytes that the most recent failed call discarded, 0 after a
    /// successful call.
    ///
    /// Counts three bytes per dropped group (one or two for a partial final
    /// group), so a sample framer downstream can realign past the gap.
    pub fn dropped_bytes(&self) -> usize {
        self.dropped
    }

    /// Returns `true` once [`decode_finish`](Self::decode_finish) has run.
    pub fn is_finished(&self) -> bool {
        self.state == DecoderState::Finished
    }

    /// Decode every complete group available after appending `input` to the
    /// pending characters.
    ///
    /// Empty input, and any input after [`decode_finish`](Self::decode_finish),
    /// returns an empty vector without touching the decoder state.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when one of the completed groups is not valid
    /// base64.  No bytes are produced for that call; the trailing partial
    /// group is still kept so decoding can resume with the next fragment.
    pub fn decode_chunk(&mut self, input: impl AsRef<[u8]>) -> Result<Vec<u8>, DecodeError> {
        let input = input.as_ref();
        let mut out = Vec::with_capacity((self.pending_len() + input.len()) / GROUP_LEN * 3);
        self.decode_chunk_into(input, &mut out)?;
        Ok(out)
    }

    /// Like [`decode_chunk`](Self::decode_chunk) but appends to `out`.
    ///
    /// Returns the number of bytes appended.  On error `out` is left exactly
    /// as it was.
    pub fn decode_chunk_into(
        &mut self,
        input: impl AsRef<[u8]>,
        out: &mut Vec<u8>,
    ) -> Result<usize, DecodeError> {
        let input = input.as_ref();
        self.dropped = 0;
        if input.is_empty() {
            return Ok(0);
        }
        if self.is_finished() {
            log::debug!("base64: ignoring {} bytes received after finish", input.len());
            return Ok(0);
        }
        self.state = DecoderState::Streaming;

        let pending = self.pending_len();
        let total = pending + input.len();
        let run_len = total - total % GROUP_LEN;

        if run_len == 0 {
            self.pending[pending..total].copy_from_slice(input);
            self.pending_len = total as u8;
            return Ok(0);
        }

        // input = [head: completes the pending group][body: whole groups][tail]
        let head = if pending > 0 { GROUP_LEN - pending } else { 0 };
        let body_end = run_len - pending;

        let start = out.len();
        let result = self.decode_run(&input[..head], &input[head..body_end], out);

        let tail = &input[body_end..];
        self.pending[..tail.len()].copy_from_slice(tail);
        self.pending_len = tail.len() as u8;
        self.consumed += run_len as u64;

        match result {
            Ok(()) => Ok(out.len() - start),
            Err(err) => {
                out.truncate(start);
                self.dropped = run_len / GROUP_LEN * 3;
                log::warn!("base64: dropped {run_len} characters: {err}");
                Err(err)
            }
        }
    }

    /// Flush the pending characters, padded with `'='` to a full group.
    ///
    /// The decoder moves to [`DecoderState::Finished`] whether or not the
    /// flush succeeds.  Calling this again returns an empty vector.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when the padded group does not decode, for
    /// example when a single stray character was left over.
    pub fn decode_finish(&mut self) -> Result<Vec<u8>, DecodeError> {
        let mut out = Vec::with_capacity(GROUP_LEN - 1);
        self.decode_finish_into(&mut out)?;
        Ok(out)
    }

    /// Like [`decode_finish`](Self::decode_finish) but appends to `out`.
    pub fn decode_finish_into(&mut self, out: &mut Vec<u8>) -> Result<usize, DecodeError> {
        self.dropped = 0;
        if self.is_finished() {
            return Ok(0);
        }
        self.state = DecoderState::Finished;

        let pending = self.pending_len();
        self.pending_len = 0;
        if pending == 0 {
            return Ok(0);
        }

        let mut group = [PAD; GROUP_LEN];
        group[..pending].copy_from_slice(&self.pending[..pending]);
        let base = self.consumed;
        self.consumed += pending as u64;

        let start = out.len();
        let result = self.ensure_not_terminated(base).and_then(|()| {
            STANDARD
                .decode_vec(group, out)
                .map_err(|e| DecodeError::from_engine(e, base))
        });

        match result {
            Ok(()) => Ok(out.len() - start),
            Err(err) => {
                out.truncate(start);
                self.dropped = pending * 3 / GROUP_LEN;
                log::warn!("base64: final group of {pending} characters dropped: {err}");
                Err(err)
            }
        }
    }

    /// Discard all pending state and return to [`DecoderState::Fresh`].
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn decode_run(&mut self, head: &[u8], body: &[u8], out: &mut Vec<u8>) -> Result<(), DecodeError> {
        let base = self.consumed;
        let mut body_base = base;

        if !head.is_empty() {
            let pending = self.pending_len();
            let mut group = [0u8; GROUP_LEN];
            group[..pending].copy_from_slice(&self.pending[..pending]);
            group[pending..].copy_from_slice(head);

            self.ensure_not_terminated(base)?;
            STANDARD
                .decode_vec(group, out)
                .map_err(|e| DecodeError::from_engine(e, base))?;
            self.terminated = group[GROUP_LEN - 1] == PAD;
            body_base += GROUP_LEN as u64;
        }

        if let Some(&last) = body.last() {
            self.ensure_not_terminated(body_base)?;
            STANDARD
                .decode_vec(body, out)
                .map_err(|e| DecodeError::from_engine(e, body_base))?;
            self.terminated = last == PAD;
        }

        Ok(())
    }

    fn ensure_not_terminated(&self, offset: u64) -> Result<(), DecodeError> {
        if self.terminated {
            Err(DecodeError::DataAfterPadding { offset })
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
