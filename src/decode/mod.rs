//! Base64 stage — turns arbitrarily fragmented base64 text into raw bytes.
//!
//! TTS APIs hand back audio as one long base64 string.  [`StreamingDecoder`]
//! lets playback start on the first few hundred characters instead of
//! waiting for the whole response body.
//!
//! ```text
//! "SGVs" "bG8g" "d2"  "9y" "bGQ="
//!    │      │     │     │     │
//!    ▼      ▼     ▼     ▼     ▼
//! decode_chunk ───────────────────▶ b"Hel" b"lo " b"" b"wor" b"ld"
//! decode_finish ──────────────────▶ b""
//! ```

pub mod streaming;

pub use streaming::{DecodeError, DecoderState, StreamingDecoder, GROUP_LEN};
