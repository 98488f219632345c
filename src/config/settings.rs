//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Every section is `#[serde(default)]`, so a partial `settings.toml` only
//! overrides the keys it names.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::audio::AudioFormat;

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Capture format, capture length and playback chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture channel count.
    pub channels: u16,
    /// Capture sample width in bytes (1, 2 or 4 for live devices).
    pub sample_width: u16,
    /// Capture sample rate in Hz.
    pub sample_rate: u32,
    /// Sample blocks per captured frame.
    pub frame_samples: usize,
    /// Number of frames captured per turn.  40 × 2048 at 16 kHz ≈ 5.1 s.
    pub capture_frames: usize,
    /// Sample blocks per frame when streaming the answer to the speaker.
    pub playback_frame_samples: usize,
    /// How long a single capture read may block before it is an error.
    pub read_timeout_ms: u64,
    /// Input device name; `None` means the system default.
    pub input_device: Option<String>,
    /// Output device name; `None` means the system default.
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_width: 2,
            sample_rate: 16_000,
            frame_samples: 2048,
            capture_frames: 40,
            playback_frame_samples: 2048,
            read_timeout_ms: 5_000,
            input_device: None,
            output_device: None,
        }
    }
}

impl AudioConfig {
    pub fn capture_format(&self) -> AudioFormat {
        AudioFormat::new(self.channels, self.sample_width, self.sample_rate)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Capture length in seconds implied by the frame settings.
    pub fn capture_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        (self.capture_frames * self.frame_samples) as f64 / f64::from(self.sample_rate)
    }
}

// ---------------------------------------------------------------------------
// SttConfig
// ---------------------------------------------------------------------------

/// Settings for the Whisper STT engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// GGML model name (resolved to `ggml-<name>.bin` in the models dir) or
    /// an explicit path to a `.bin` file.
    pub model: String,
    /// Speech language as an ISO-639-1 code, or `"auto"` for Whisper's
    /// built-in language detection.
    pub language: String,
    /// Attempt GPU-accelerated inference when available.
    pub use_gpu: bool,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: "base.en".into(),
            language: "en".into(),
            use_gpu: false,
        }
    }
}

// ---------------------------------------------------------------------------
// AnswerConfig
// ---------------------------------------------------------------------------

/// Settings for the question-answering endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerConfig {
    /// Base URL of an OpenAI-compatible API.
    ///
    /// - Ollama: `http://localhost:11434`
    /// - OpenAI: `https://api.openai.com`
    pub base_url: String,
    /// API key; `None` for local providers.
    pub api_key: Option<String>,
    /// Model identifier sent to the API (e.g. `"qwen2.5:3b"`, `"gpt-4o-mini"`).
    pub model: String,
    /// Sampling temperature (0.0 – 1.0).
    pub temperature: f32,
    /// Maximum seconds to wait for an answer.
    pub timeout_secs: u64,
    /// Upper bound on answer length in tokens.
    pub max_tokens: u32,
    /// Replaces the built-in system prompt when set.
    pub system_prompt: Option<String>,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            api_key: None,
            model: "qwen2.5:3b".into(),
            temperature: 0.3,
            timeout_secs: 30,
            max_tokens: 256,
            system_prompt: None,
        }
    }
}

// ---------------------------------------------------------------------------
// TtsConfig
// ---------------------------------------------------------------------------

/// Settings for the speech-synthesis endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Base URL of an OpenAI-compatible `/v1/audio/speech` API.
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Default voice; the CLI `--voice` flag overrides it per turn.
    pub voice: String,
    pub timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            api_key: None,
            model: "tts-1".into(),
            voice: "alloy".into(),
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// OutputConfig
// ---------------------------------------------------------------------------

/// Where per-turn audio artifacts go.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// When set, each turn writes `question.wav` and `answer.wav` here.
    pub artifacts_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voice_query::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let mut config = AppConfig::load().unwrap();
///
/// // Modify and save
/// config.audio.capture_frames = 80;
/// config.save_to(std::path::Path::new("settings.toml")).unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub stt: SttConfig,
    pub answer: AnswerConfig,
    pub tts: TtsConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// so callers never need to special-case a missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("config: {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Write the settings to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings no turn could run with.
    pub fn validate(&self) -> Result<()> {
        let a = &self.audio;
        if !a.capture_format().is_valid() {
            bail!(
                "audio: channels, sample_width and sample_rate must be positive (got {:?})",
                a.capture_format()
            );
        }
        if a.frame_samples == 0 || a.playback_frame_samples == 0 {
            bail!("audio: frame sizes must be positive");
        }
        if a.capture_frames == 0 {
            bail!("audio: capture_frames must be positive");
        }
        if !(0.0..=2.0).contains(&self.answer.temperature) {
            bail!(
                "answer: temperature {} is outside 0.0 – 2.0",
                self.answer.temperature
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
