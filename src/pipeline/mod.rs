//! Pipeline orchestrator for voice-query turns.
//!
//! # Architecture
//!
//! ```text
//! CaptureDevice ──frames──▶ AudioBuffer ──encode──▶ question.wav
//!                                                      │
//!                              TranscriptionService ◀──┘
//!                                      │ text
//!                                AnswerService
//!                                      │ text
//!                              SynthesisService
//!                                      │ AudioBuffer @ native rate
//!                       encode ──▶ answer.wav ──decode
//!                                                  │
//!                              PlaybackDevice ◀────┘
//! ```
//!
//! One turn runs at a time.  Each failed turn yields a single [`TurnError`]
//! whose [`FailureKind`] names the class of failure.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use voice_query::answer::ApiAnswerer;
//! use voice_query::config::AppConfig;
//! use voice_query::device::{CpalCapture, CpalPlayback};
//! use voice_query::pipeline::{PipelineOrchestrator, TurnSettings};
//! use voice_query::stt::{TranscribeParams, WhisperTranscriber};
//! use voice_query::tts::ApiSynthesizer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let stt = WhisperTranscriber::load("models/ggml-base.en.bin", TranscribeParams::default())
//!         .unwrap();
//!
//!     let mut orchestrator = PipelineOrchestrator::new(
//!         TurnSettings::from_config(&config),
//!         Box::new(CpalCapture::new(None, Duration::from_secs(5))),
//!         Box::new(CpalPlayback::new(None)),
//!         Arc::new(stt),
//!         Arc::new(ApiAnswerer::from_config(&config.answer)),
//!         Arc::new(ApiSynthesizer::from_config(&config.tts)),
//!     );
//!
//!     let turn = orchestrator.run_turn().await.unwrap();
//!     println!("Q: {}\nA: {}", turn.query_text, turn.answer_text);
//! }
//! ```

pub mod error;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use error::{FailureKind, TurnError};
pub use runner::{
    capture_stage, playback_stage, PipelineOrchestrator, TurnSettings, ANSWER_FILE, QUESTION_FILE,
};
pub use state::{Turn, TurnStage};
