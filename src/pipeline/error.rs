//! Turn failure type and its tag.
//!
//! Every failed turn yields exactly one [`TurnError`].  Its [`kind`]
//! (a [`FailureKind`]) is the stable tag printed by the CLI; its `Display`
//! is the human-readable message.
//!
//! [`kind`]: TurnError::kind

use thiserror::Error;

use crate::answer::AnswerError;
use crate::audio::CodecError;
use crate::device::DeviceError;
use crate::stt::SttError;
use crate::tts::TtsError;

// ---------------------------------------------------------------------------
// FailureKind
// ---------------------------------------------------------------------------

/// Tag identifying which class of failure ended a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    DeviceUnavailable,
    InvalidState,
    DeviceError,
    EncodeError,
    DecodeError,
    TranscriptionError,
    TranscriptionEmpty,
    AnswerServiceError,
    SynthesisError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::DeviceUnavailable => "DeviceUnavailable",
            FailureKind::InvalidState => "InvalidState",
            FailureKind::DeviceError => "DeviceError",
            FailureKind::EncodeError => "EncodeError",
            FailureKind::DecodeError => "DecodeError",
            FailureKind::TranscriptionError => "TranscriptionError",
            FailureKind::TranscriptionEmpty => "TranscriptionEmpty",
            FailureKind::AnswerServiceError => "AnswerServiceError",
            FailureKind::SynthesisError => "SynthesisError",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TurnError
// ---------------------------------------------------------------------------

/// The single failure surfaced for a turn.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("device I/O failed: {0}")]
    Device(String),

    #[error("could not encode audio: {0}")]
    Encode(String),

    #[error("could not decode audio: {0}")]
    Decode(String),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("nothing was heard: the transcript is empty")]
    TranscriptionEmpty,

    #[error("no answer: {0}")]
    AnswerService(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
}

impl TurnError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TurnError::DeviceUnavailable(_) => FailureKind::DeviceUnavailable,
            TurnError::InvalidState(_) => FailureKind::InvalidState,
            TurnError::Device(_) => FailureKind::DeviceError,
            TurnError::Encode(_) => FailureKind::EncodeError,
            TurnError::Decode(_) => FailureKind::DecodeError,
            TurnError::Transcription(_) => FailureKind::TranscriptionError,
            TurnError::TranscriptionEmpty => FailureKind::TranscriptionEmpty,
            TurnError::AnswerService(_) => FailureKind::AnswerServiceError,
            TurnError::Synthesis(_) => FailureKind::SynthesisError,
        }
    }
}

impl From<DeviceError> for TurnError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::Unavailable(msg) => TurnError::DeviceUnavailable(msg),
            DeviceError::InvalidState(msg) => TurnError::InvalidState(msg),
            DeviceError::Io(msg) => TurnError::Device(msg),
        }
    }
}

impl From<CodecError> for TurnError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Encode(msg) => TurnError::Encode(msg),
            CodecError::Decode(msg) => TurnError::Decode(msg),
        }
    }
}

impl From<SttError> for TurnError {
    fn from(e: SttError) -> Self {
        TurnError::Transcription(e.to_string())
    }
}

impl From<AnswerError> for TurnError {
    fn from(e: AnswerError) -> Self {
        TurnError::AnswerService(e.to_string())
    }
}

impl From<TtsError> for TurnError {
    fn from(e: TtsError) -> Self {
        TurnError::Synthesis(e.to_string())
    }
}
