//! Speech-to-text service.
//!
//! # Architecture
//!
//! ```text
//! WAV container ──decode──▶ f32 ──downmix──▶ mono ──resample──▶ 16 kHz
//!                                                                │
//!                                   TranscriptionService ◀───────┘
//!                                   (WhisperTranscriber)
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use voice_query::stt::{TranscribeParams, TranscriptionService, WhisperTranscriber};
//!
//! let stt = WhisperTranscriber::load("models/ggml-base.en.bin", TranscribeParams::default())
//!     .expect("model not found");
//!
//! let container: Vec<u8> = std::fs::read("question.wav").unwrap();
//! let text = stt.transcribe(&container).unwrap();
//! println!("{text}");
//! ```

pub mod engine;
pub mod transcribe;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use engine::{container_to_whisper_input, SttError, TranscriptionService, WhisperTranscriber};
pub use transcribe::{SamplingStrategy, Segment, TranscribeParams, TranscriptionResult};

#[cfg(test)]
pub use engine::MockTranscriber;
