//! Audio data model: formats, frame buffers, the WAV container and sample conversions.
//!
//! # Data flow
//!
//! ```text
//! device frames → AudioBuffer → codec::encode → container bytes
//!                                                   │
//!        PlaybackDevice ← AudioBuffer ← codec::decode
//! ```
//!
//! # Quick start
//!
//! ```rust
//! use voice_query::audio::{codec, AudioBuffer, AudioFormat};
//!
//! let format = AudioFormat::new(2, 2, 16_000);
//! let mut buf = AudioBuffer::new(format, 2048);
//! buf.append_frame(vec![0u8; 2048 * 4]).unwrap();
//!
//! let wav = codec::encode(&buf).unwrap();
//! let back = codec::decode(&wav, 2048).unwrap();
//! assert_eq!(back, buf);
//! ```

pub mod codec;
pub mod convert;
pub mod format;

pub use codec::CodecError;
pub use convert::{float_to_pcm16, pcm_to_f32, resample_to_16k, stereo_to_mono};
pub use format::{AudioBuffer, AudioFormat, FrameError};
