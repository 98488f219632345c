//! voice-query: ask a question out loud and hear the answer.
//!
//! One turn captures a fixed number of microphone frames, transcribes them
//! with Whisper, asks a chat-completion API, synthesizes the reply and plays
//! it back.  See [`pipeline`] for the orchestrator.

pub mod answer;
pub mod audio;
pub mod config;
pub mod device;
pub mod pipeline;
pub mod stt;
pub mod tts;
