//! Text-to-speech over an OpenAI-compatible `/v1/audio/speech` API.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use voice_query::config::TtsConfig;
//! use voice_query::tts::{ApiSynthesizer, SynthesisService};
//!
//! #[tokio::main]
//! async fn main() {
//!     let tts = ApiSynthesizer::from_config(&TtsConfig::default());
//!     let speech = tts.synthesize("it is sunny", None).await.unwrap();
//!     println!("{} Hz, {:.1} s", speech.sample_rate_hz, speech.buffer.duration_secs());
//! }
//! ```

pub mod synthesizer;

pub use synthesizer::{speech_from_wav, ApiSynthesizer, SynthesisService, SynthesizedSpeech, TtsError};
