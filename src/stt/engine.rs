//! Transcription service trait and the whisper-rs implementation.
//!
//! # Overview
//!
//! [`TranscriptionService`] is the interface the pipeline uses.  It takes the
//! encoded audio container (the same bytes that would cross a process
//! boundary) and returns text.  It is blocking, object-safe and
//! `Send + Sync`, so the orchestrator holds it as `Arc<dyn TranscriptionService>`
//! and calls it from the blocking thread pool.
//!
//! [`WhisperTranscriber`] decodes the container, converts it to 16 kHz mono
//! `f32`, and runs a `whisper_rs::WhisperContext`.
//!
//! [`MockTranscriber`] (test-only) returns a canned response and counts calls.

use std::path::Path;

use thiserror::Error;
use whisper_rs::{FullParams, WhisperContext, WhisperContextParameters};

use crate::audio::{codec, pcm_to_f32, resample_to_16k, stereo_to_mono};
use crate::stt::transcribe::{SamplingStrategy, Segment, TranscribeParams, TranscriptionResult};

// ---------------------------------------------------------------------------
// SttError
// ---------------------------------------------------------------------------

/// Errors from the transcription subsystem.
#[derive(Debug, Clone, Error)]
pub enum SttError {
    /// The GGML model file was not found at the given path.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// `whisper_rs` failed to initialise a context or state.
    #[error("whisper context initialisation failed: {0}")]
    ContextInit(String),

    /// The audio container could not be decoded.
    #[error("malformed audio: {0}")]
    MalformedAudio(String),

    /// Inference failed.
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Less than 0.5 s of audio once converted to 16 kHz.
    #[error("audio too short: minimum 0.5 s")]
    AudioTooShort,

    /// More than 60 s of audio once converted to 16 kHz.
    #[error("audio too long: maximum 60 s")]
    AudioTooLong,
}

// ---------------------------------------------------------------------------
// TranscriptionService trait
// ---------------------------------------------------------------------------

/// Converts an encoded audio container into text.
///
/// # Contract
///
/// - `container` is a WAV container as produced by [`codec::encode`].
/// - Malformed input yields [`SttError::MalformedAudio`]; backend failures
///   yield the other [`SttError`] variants.
/// - An empty string is a valid return value; the caller decides what an
///   empty transcript means.
pub trait TranscriptionService: Send + Sync {
    fn transcribe(&self, container: &[u8]) -> Result<String, SttError>;
}

// Compile-time assertion: Box<dyn TranscriptionService> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn TranscriptionService>) {}
};

// ---------------------------------------------------------------------------
// Audio length constants (16 kHz mono f32)
// ---------------------------------------------------------------------------

/// 0.5 s × 16 000 Hz.
const MIN_AUDIO_SAMPLES: usize = 8_000;
/// 60 s × 16 000 Hz.
const MAX_AUDIO_SAMPLES: usize = 960_000;

/// Decode a container into 16 kHz mono `f32` samples for Whisper.
pub fn container_to_whisper_input(container: &[u8]) -> Result<Vec<f32>, SttError> {
    // Frame size is irrelevant here; the payload is flattened immediately.
    let buffer =
        codec::decode(container, 4096).map_err(|e| SttError::MalformedAudio(e.to_string()))?;
    let format = buffer.format();
    let samples = pcm_to_f32(&buffer.to_pcm(), &format);
    let mono = stereo_to_mono(&samples, format.channels);
    Ok(resample_to_16k(&mono, format.sample_rate))
}

fn check_length(audio: &[f32]) -> Result<(), SttError> {
    if audio.len() < MIN_AUDIO_SAMPLES {
        return Err(SttError::AudioTooShort);
    }
    if audio.len() > MAX_AUDIO_SAMPLES {
        return Err(SttError::AudioTooLong);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// WhisperTranscriber
// ---------------------------------------------------------------------------

/// Transcription service backed by a `whisper_rs::WhisperContext`.
///
/// A fresh `WhisperState` is created per call, so one instance can serve
/// any thread without locking.
pub struct WhisperTranscriber {
    ctx: WhisperContext,
    params: TranscribeParams,
}

impl std::fmt::Debug for WhisperTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperTranscriber")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

// SAFETY: whisper-rs declares WhisperContext Send + Sync; the model weights
// are read-only after loading.
unsafe impl Send for WhisperTranscriber {}
unsafe impl Sync for WhisperTranscriber {}

impl WhisperTranscriber {
    /// Load a GGML model from `model_path`.
    ///
    /// # Errors
    ///
    /// - [`SttError::ModelNotFound`] — `model_path` does not exist.
    /// - [`SttError::ContextInit`] — whisper-rs failed to load the file.
    pub fn load(model_path: impl AsRef<Path>, params: TranscribeParams) -> Result<Self, SttError> {
        let path = model_path.as_ref();

        if !path.exists() {
            return Err(SttError::ModelNotFound(path.display().to_string()));
        }

        let path_str = path.to_str().ok_or_else(|| {
            SttError::ModelNotFound(format!(
                "model path contains non-UTF-8 characters: {}",
                path.display()
            ))
        })?;

        let mut ctx_params = WhisperContextParameters::default();
        ctx_params.use_gpu = params.use_gpu;

        let ctx = WhisperContext::new_with_params(path_str, ctx_params)
            .map_err(|e| SttError::ContextInit(e.to_string()))?;
        log::info!("stt: loaded {}", path.display());

        Ok(Self { ctx, params })
    }

    /// Transcribe 16 kHz mono `f32` audio, keeping per-segment timing.
    pub fn transcribe_full(&self, audio: &[f32]) -> Result<TranscriptionResult, SttError> {
        check_length(audio)?;

        use whisper_rs::SamplingStrategy as WS;
        let ws = match self.params.strategy {
            SamplingStrategy::Greedy { best_of } => WS::Greedy { best_of },
            SamplingStrategy::BeamSearch { beam_size, patience } => {
                WS::BeamSearch { beam_size, patience }
            }
        };

        let mut fp = FullParams::new(ws);

        let lang: Option<&str> = if self.params.language == "auto" {
            None
        } else {
            Some(self.params.language.as_str())
        };
        fp.set_language(lang);
        fp.set_n_threads(self.params.n_threads);

        if self.params.suppress_progress {
            fp.set_print_progress(false);
            fp.set_print_realtime(false);
        }

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        let wall_start = std::time::Instant::now();

        state
            .full(fp, audio)
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        let mut text = String::new();
        let mut segments: Vec<Segment> = Vec::with_capacity(n_segments.max(0) as usize);

        for i in 0..n_segments {
            let seg_text = state
                .full_get_segment_text(i)
                .map_err(|e| SttError::Transcription(format!("segment {i}: {e}")))?;

            // Timestamps are centiseconds.
            let t0 = state.full_get_segment_t0(i).unwrap_or(0).max(0) as u64 * 10;
            let t1 = state.full_get_segment_t1(i).unwrap_or(0).max(0) as u64 * 10;

            text.push_str(&seg_text);
            segments.push(Segment {
                text: seg_text,
                start_ms: t0,
                end_ms: t1,
            });
        }

        log::debug!(
            "stt: {} segments in {} ms",
            segments.len(),
            wall_start.elapsed().as_millis()
        );

        Ok(TranscriptionResult {
            text: text.trim().to_string(),
            segments,
            duration_ms: wall_start.elapsed().as_millis(),
        })
    }
}

impl TranscriptionService for WhisperTranscriber {
    fn transcribe(&self, container: &[u8]) -> Result<String, SttError> {
        let audio = container_to_whisper_input(container)?;
        self.transcribe_full(&audio).map(|r| r.text)
    }
}

// ---------------------------------------------------------------------------
// MockTranscriber  (test-only)
// ---------------------------------------------------------------------------

/// Returns a pre-configured response and counts invocations.
///
/// The container is still decoded so callers are tested against the
/// malformed-input contract.
#[cfg(test)]
pub struct MockTranscriber {
    response: Result<String, SttError>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockTranscriber {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
            calls: Default::default(),
        }
    }

    pub fn err(error: SttError) -> Self {
        Self {
            response: Err(error),
            calls: Default::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl TranscriptionService for MockTranscriber {
    fn transcribe(&self, container: &[u8]) -> Result<String, SttError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        codec::decode(container, 4096).map_err(|e| SttError::MalformedAudio(e.to_string()))?;
        self.response.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
