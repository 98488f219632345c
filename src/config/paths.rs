//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\voice-query\
//!   macOS:   ~/Library/Application Support/voice-query/
//!   Linux:   ~/.config/voice-query/
//!
//! Data dir (models, turn artifacts):
//!   Windows: %LOCALAPPDATA%\voice-query\
//!   macOS:   ~/Library/Application Support/voice-query/
//!   Linux:   ~/.local/share/voice-query/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory holding `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for GGML Whisper model files.
    pub models_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voice-query";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let models_dir = data_dir.join("models");

        Self {
            config_dir,
            settings_file,
            models_dir,
        }
    }

    /// Path of the GGML file for a model name: `<models_dir>/ggml-<name>.bin`.
    ///
    /// A name that already looks like a path (contains a separator or ends
    /// in `.bin`) is returned unchanged.
    pub fn model_file(&self, model: &str) -> PathBuf {
        let as_path = PathBuf::from(model);
        if as_path.components().count() > 1 || model.ends_with(".bin") {
            return as_path;
        }
        self.models_dir.join(format!("ggml-{model}.bin"))
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
