//! Little-endian 16-bit PCM framing for a byte stream of unknown chunking.
//!
//! Decoded base64 arrives in fragments whose length is a multiple of three,
//! so a 2-byte sample regularly straddles two fragments.  [`FrameAssembler`]
//! carries the odd byte forward instead of dropping it, keeping every sample
//! after the boundary intact.
//!
//! # Example
//!
//! ```rust
//! use tts_stream::audio::FrameAssembler;
//!
//! let mut frames = FrameAssembler::new();
//! let first: Vec<i16> = frames.push(&[0x01]).collect();
//! let rest: Vec<i16> = frames.push(&[0x00, 0x02, 0x00]).collect();
//! assert!(first.is_empty());
//! assert_eq!(rest, vec![1, 2]);
//! assert!(frames.finish().is_ok());
//! ```

use std::iter::FusedIterator;

use thiserror::Error;

/// Bytes per mono 16-bit sample.
pub const BYTES_PER_SAMPLE: usize = 2;

// ---------------------------------------------------------------------------
// TruncatedFrameWarning
// ---------------------------------------------------------------------------

/// The stream ended halfway through a sample.
///
/// The leftover byte is reported, never padded into a guessed sample.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("stream ended mid-sample: dropped trailing byte {byte:#04x}")]
pub struct TruncatedFrameWarning {
    /// The unpaired low byte that was discarded.
    pub byte: u8,
}

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// Samples produced by one [`FrameAssembler::push`] call.
///
/// Lazily converts the borrowed bytes; it yields each sample once, in
/// arrival order, and cannot be rewound.
#[derive(Debug)]
pub struct Samples<'a> {
    /// Low byte carried over from the previous push.
    lead: Option<u8>,
    /// Remaining bytes; always pairs up with `lead` exactly.
    body: &'a [u8],
}

impl<'a> Samples<'a> {
    fn new(lead: Option<u8>, body: &'a [u8]) -> Self {
        debug_assert_eq!((usize::from(lead.is_some()) + body.len()) % BYTES_PER_SAMPLE, 0);
        Self { lead, body }
    }

    /// An empty sequence.
    pub fn empty() -> Self {
        Self::new(None, &[])
    }
}

impl Iterator for Samples<'_> {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if let Some(lo) = self.lead.take() {
            let (&hi, rest) = self.body.split_first()?;
            self.body = rest;
            return Some(i16::from_le_bytes([lo, hi]));
        }
        let body = self.body;
        match body {
            [lo, hi, rest @ ..] => {
                self.body = rest;
                Some(i16::from_le_bytes([*lo, *hi]))
            }
            _ => None,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (usize::from(self.lead.is_some()) + self.body.len()) / BYTES_PER_SAMPLE;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Samples<'_> {}

impl FusedIterator for Samples<'_> {}

// ---------------------------------------------------------------------------
// FrameAssembler
// ---------------------------------------------------------------------------

/// Converts decoded byte fragments into `i16` samples, carrying a split
/// sample's first byte across calls.
#[derive(Debug, Clone, Default)]
pub struct FrameAssembler {
    pending: Option<u8>,
    /// The next byte is the high half of a sample lost upstream.
    skip_next: bool,
    finished: bool,
}

impl FrameAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` while a lone byte is waiting for its partner.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Returns `true` once [`finish`](Self::finish) has been called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Frame `bytes`, preceded by any byte held from the previous call.
    ///
    /// The assembler's state is updated before this returns; the iterator
    /// only reads `bytes`.  After [`finish`](Self::finish) the call is a
    /// no-op yielding nothing.
    pub fn push<'a>(&mut self, bytes: &'a [u8]) -> Samples<'a> {
        if self.finished {
            if !bytes.is_empty() {
                log::debug!("pcm: ignoring {} bytes pushed after finish", bytes.len());
            }
            return Samples::empty();
        }

        let bytes = match bytes.split_first() {
            Some((_, rest)) if self.skip_next => {
                self.skip_next = false;
                rest
            }
            _ => bytes,
        };

        let lead = self.pending.take();
        let total = usize::from(lead.is_some()) + bytes.len();
        if total % BYTES_PER_SAMPLE == 0 {
            return Samples::new(lead, bytes);
        }

        match bytes.split_last() {
            Some((&last, body)) => {
                self.pending = Some(last);
                Samples::new(lead, body)
            }
            None => {
                // Nothing new arrived; keep holding the same byte.
                self.pending = lead;
                Samples::empty()
            }
        }
    }

    /// Account for `lost` bytes that were dropped upstream and will never
    /// arrive.
    ///
    /// A held byte whose partner was lost is discarded.  When the gap ends
    /// halfway through a sample, the first byte after it (the high half of
    /// that sample) is skipped, so later samples keep their byte pairing.
    ///
    /// ```rust
    /// use tts_stream::audio::FrameAssembler;
    ///
    /// let mut frames = FrameAssembler::new();
    /// // 01 00 | 02 [00 03 00 lost] | 04 00
    /// assert_eq!(frames.push(&[0x01, 0x00, 0x02]).collect::<Vec<_>>(), vec![1]);
    /// frames.skip(3);
    /// assert_eq!(frames.push(&[0x04, 0x00]).collect::<Vec<_>>(), vec![4]);
    /// ```
    pub fn skip(&mut self, lost: usize) {
        if lost == 0 || self.finished {
            return;
        }
        let held = self.pending.take();
        if let Some(byte) = held {
            log::debug!("pcm: discarding byte {byte:#04x}, its partner was lost");
        }
        // Bytes of the current sample position consumed by the gap.
        self.skip_next = (usize::from(held.is_some()) + lost) % BYTES_PER_SAMPLE == 1;
    }

    /// End the stream.
    ///
    /// A complete stream yields no further samples.
    ///
    /// # Errors
    ///
    /// Returns [`TruncatedFrameWarning`] when a lone byte is still held.  The
    /// byte is discarded either way.
    pub fn finish(&mut self) -> Result<Samples<'static>, TruncatedFrameWarning> {
        self.finished = true;
        self.skip_next = false;
        match self.pending.take() {
            None => Ok(Samples::empty()),
            Some(byte) => {
                let warning = TruncatedFrameWarning { byte };
                log::warn!("pcm: {warning}");
                Err(warning)
            }
        }
    }

    /// Drop any held byte and accept input again.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn push_all(frames: &mut FrameAssembler, parts: &[&[u8]]) -> Vec<i16> {
        parts.iter().flat_map(|p| frames.push(p).collect::<Vec<_>>()).collect()
    }

    // ---- Ordering / carry-over ---------------------------------------------

    #[test]
    fn single_push_yields_samples_in_order() {
        let mut frames = FrameAssembler::new();
        let samples: Vec<i16> = frames.push(&[0x01, 0x00, 0x02, 0x00]).collect();
        assert_eq!(samples, vec![1, 2]);
        assert!(!frames.has_pending());
    }

    #[test]
    fn split_on_sample_boundary() {
        let mut frames = FrameAssembler::new();
        assert_eq!(push_all(&mut frames, &[&[0x01, 0x00], &[0x02, 0x00]]), vec![1, 2]);
    }

    #[test]
    fn split_inside_a_sample_carries_the_byte() {
        let mut frames = FrameAssembler::new();
        let first: Vec<i16> = frames.push(&[0x01]).collect();
        assert!(first.is_empty());
        assert!(frames.has_pending());

        let second: Vec<i16> = frames.push(&[0x00, 0x02, 0x00]).collect();
        assert_eq!(second, vec![1, 2]);
        assert!(!frames.has_pending());
    }

    #[test]
    fn three_byte_fragments_lose_nothing() {
        // Base64 groups decode to 3 bytes, the worst case for 2-byte samples.
        let expected: Vec<i16> = vec![-1, 256, i16::MIN, i16::MAX, 0, 7];
        let bytes: Vec<u8> = expected.iter().flat_map(|s| s.to_le_bytes()).collect();

        let mut frames = FrameAssembler::new();
        let got: Vec<i16> = bytes.chunks(3).flat_map(|c| frames.push(c).collect::<Vec<_>>()).collect();
        assert_eq!(got, expected);
        assert!(frames.finish().is_ok());
    }

    #[test]
    fn negative_values_are_sign_extended() {
        let mut frames = FrameAssembler::new();
        let samples: Vec<i16> = frames.push(&[0xFF, 0xFF, 0x00, 0x80]).collect();
        assert_eq!(samples, vec![-1, i16::MIN]);
    }

    #[test]
    fn empty_push_keeps_pending_byte() {
        let mut frames = FrameAssembler::new();
        assert_eq!(frames.push(&[0x05]).count(), 0);
        assert_eq!(frames.push(&[]).count(), 0);
        assert!(frames.has_pending());
        assert_eq!(frames.push(&[0x00]).collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn samples_report_exact_length() {
        let mut frames = FrameAssembler::new();
        frames.push(&[0x01]).for_each(drop);
        let samples = frames.push(&[0x00, 0x02, 0x00, 0x03]);
        assert_eq!(samples.len(), 2);
        assert!(frames.has_pending());
    }

    // ---- Finish ------------------------------------------------------------

    #[test]
    fn truncated_tail_is_reported_not_guessed() {
        let mut frames = FrameAssembler::new();
        let samples: Vec<i16> = frames.push(&[0x01, 0x00, 0x02]).collect();
        assert_eq!(samples, vec![1]);

        let warning = frames.finish().unwrap_err();
        assert_eq!(warning, TruncatedFrameWarning { byte: 0x02 });
        assert!(!frames.has_pending());
    }

    #[test]
    fn clean_finish_yields_nothing() {
        let mut frames = FrameAssembler::new();
        frames.push(&[0x01, 0x00]).for_each(drop);
        assert_eq!(frames.finish().unwrap().count(), 0);
        assert!(frames.is_finished());
    }

    #[test]
    fn push_after_finish_is_ignored() {
        let mut frames = FrameAssembler::new();
        frames.finish().unwrap();
        assert_eq!(frames.push(&[0x01, 0x00]).count(), 0);
        assert!(!frames.has_pending());
        // Second finish stays clean.
        assert!(frames.finish().is_ok());
    }

    #[test]
    fn reset_discards_pending_byte() {
        let mut frames = FrameAssembler::new();
        frames.push(&[0x01]).for_each(drop);
        frames.reset();
        assert!(!frames.has_pending());
        assert_eq!(frames.push(&[0x02, 0x00]).collect::<Vec<_>>(), vec![2]);
    }

    // ---- Gaps --------------------------------------------------------------

    #[test]
    fn odd_gap_after_held_byte_drops_the_orphan() {
        // 01 01 02 | [02 03 03 lost] | 04 04 05 | 05 06 06
        let mut frames = FrameAssembler::new();
        assert_eq!(push_all(&mut frames, &[&[0x01, 0x01, 0x02]]), vec![0x0101]);
        frames.skip(3);
        assert!(!frames.has_pending());

        let rest = push_all(&mut frames, &[&[0x04, 0x04, 0x05], &[0x05, 0x06, 0x06]]);
        assert_eq!(rest, vec![0x0404, 0x0505, 0x0606]);
        assert!(frames.finish().is_ok());
    }

    #[test]
    fn odd_gap_on_sample_boundary_skips_the_high_half() {
        // 01 01 | [02 02 03 lost] | 03 04 04 05 05
        let mut frames = FrameAssembler::new();
        assert_eq!(push_all(&mut frames, &[&[0x01, 0x01]]), vec![0x0101]);
        frames.skip(3);

        let rest = push_all(&mut frames, &[&[0x03, 0x04, 0x04], &[0x05, 0x05]]);
        assert_eq!(rest, vec![0x0404, 0x0505]);
        assert!(frames.finish().is_ok());
    }

    #[test]
    fn even_gap_after_held_byte_skips_the_high_half() {
        // 01 01 02 | [02 03 03 04 04 05 lost] | 05 06 06
        let mut frames = FrameAssembler::new();
        assert_eq!(push_all(&mut frames, &[&[0x01, 0x01, 0x02]]), vec![0x0101]);
        frames.skip(6);

        assert_eq!(push_all(&mut frames, &[&[0x05, 0x06, 0x06]]), vec![0x0606]);
        assert!(frames.finish().is_ok());
    }

    #[test]
    fn skip_survives_an_empty_push() {
        let mut frames = FrameAssembler::new();
        frames.skip(1);
        assert_eq!(frames.push(&[]).count(), 0);
        assert_eq!(frames.push(&[0xAA, 0x07, 0x00]).collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn even_gap_on_sample_boundary_changes_nothing() {
        let mut frames = FrameAssembler::new();
        frames.skip(0);
        frames.skip(4);
        assert_eq!(frames.push(&[0x02, 0x00]).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn warning_display_names_the_byte() {
        let msg = TruncatedFrameWarning { byte: 0x7f }.to_string();
        assert!(msg.contains("0x7f"), "message: {msg}");
    }
}
