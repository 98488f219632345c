//! Question answering over an OpenAI-compatible chat API.
//!
//! This module provides:
//! * [`AnswerService`] — async trait the pipeline calls with the transcript.
//! * [`ApiAnswerer`] — `/v1/chat/completions` client built from [`AnswerConfig`].
//! * [`PromptBuilder`] — system/user message construction.
//! * [`AnswerError`] — error variants for answer generation.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use voice_query::answer::{AnswerService, ApiAnswerer};
//! use voice_query::config::AnswerConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let answerer = ApiAnswerer::from_config(&AnswerConfig::default());
//!     let answer = answerer.answer("what is the capital of France").await.unwrap();
//!     println!("{answer}");
//! }
//! ```
//!
//! [`AnswerConfig`]: crate::config::AnswerConfig

pub mod answerer;
pub mod prompt;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use answerer::{AnswerError, AnswerService, ApiAnswerer};
pub use prompt::PromptBuilder;
