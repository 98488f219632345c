//! Transcription parameter and result types.
//!
//! [`TranscribeParams`] carries the settings for one Whisper inference run.
//! [`TranscriptionResult`] is returned by
//! [`WhisperTranscriber::transcribe_full`](super::WhisperTranscriber::transcribe_full).

// ---------------------------------------------------------------------------
// SamplingStrategy
// ---------------------------------------------------------------------------

/// Owned, `Clone` mirror of `whisper_rs::SamplingStrategy`.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplingStrategy {
    /// Greedy (single-pass) decoding.
    Greedy {
        /// Candidate tokens evaluated per step.  1 is fastest.
        best_of: i32,
    },
    /// Beam-search decoding.
    BeamSearch { beam_size: i32, patience: f32 },
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        Self::Greedy { best_of: 1 }
    }
}

// ---------------------------------------------------------------------------
// TranscribeParams
// ---------------------------------------------------------------------------

/// Parameters for a Whisper transcription run.
///
/// ```
/// use voice_query::stt::TranscribeParams;
///
/// let params = TranscribeParams {
///     language: "auto".into(),
///     ..TranscribeParams::default()
/// };
/// assert!(params.n_threads >= 1);
/// ```
#[derive(Debug, Clone)]
pub struct TranscribeParams {
    /// ISO-639-1 language code, or `"auto"` for Whisper's detection.
    pub language: String,

    pub strategy: SamplingStrategy,

    /// CPU threads handed to Whisper.  Defaults to [`optimal_threads`].
    pub n_threads: i32,

    /// Suppress Whisper's progress output to stderr.
    pub suppress_progress: bool,

    /// Ask whisper.cpp for GPU inference when it was built with a backend.
    pub use_gpu: bool,
}

impl Default for TranscribeParams {
    fn default() -> Self {
        Self {
            language: "en".into(),
            strategy: SamplingStrategy::default(),
            n_threads: optimal_threads(),
            suppress_progress: true,
            use_gpu: false,
        }
    }
}

/// Available parallelism capped at 8; Whisper gains little beyond that.
pub fn optimal_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8) as i32)
        .unwrap_or(4)
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Output of a successful transcription.
#[derive(Debug, Clone)]
pub struct TranscriptionResult {
    /// Concatenated transcript, trimmed.
    pub text: String,
    pub segments: Vec<Segment>,
    /// Wall-clock inference time in milliseconds.
    pub duration_ms: u128,
}

/// A time-aligned chunk of transcript.
#[derive(Debug, Clone)]
pub struct Segment {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
}
