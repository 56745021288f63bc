//! Streaming base64 → PCM decoding for text-to-speech playback.
//!
//! Speech APIs return `LINEAR16` audio as a base64 string inside a JSON
//! body.  This crate decodes that string while it is still arriving and
//! turns it into `i16` samples, so playback can start on the first few
//! hundred bytes with only a handful of bytes of carried state.
//!
//! | Module | Role |
//! |--------|------|
//! | [`decode`] | incremental base64 decoder |
//! | [`audio`] | 16-bit LE sample framing and playback sinks |
//! | [`pipeline`] | decoder + framer composition, async runner, status |
//! | [`config`] | TOML settings |

pub mod audio;
pub mod config;
pub mod decode;
pub mod pipeline;
