//! Application entry point: voice-query.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Parse the command line.
//! 3. Load [`AppConfig`] from disk (defaults when the file is missing) and
//!    apply flag overrides.
//! 4. Run the command:
//!    - `ask` (default): build the Whisper transcriber, the HTTP answer and
//!      speech clients and the cpal devices, then run one turn on a tokio
//!      runtime.
//!    - `record`: capture the configured frames into a WAV file.
//!    - `play`: stream a WAV file to the speaker.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use voice_query::{
    answer::ApiAnswerer,
    audio::codec,
    config::{AppConfig, AppPaths},
    device::{CpalCapture, CpalPlayback},
    pipeline::{capture_stage, playback_stage, PipelineOrchestrator, TurnError, TurnSettings},
    stt::{TranscribeParams, WhisperTranscriber},
    tts::ApiSynthesizer,
};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(
    name = "voice-query",
    version,
    about = "Ask a question out loud and hear the answer",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Settings file to use instead of the platform default.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,

    /// Flags for the default `ask` command.
    #[command(flatten)]
    ask: AskArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record a question, answer it and speak the answer (default).
    Ask(AskArgs),

    /// Capture the configured number of frames into a WAV file.
    Record {
        output: PathBuf,

        /// Frames to capture (overrides `audio.capture_frames`).
        #[arg(long)]
        frames: Option<usize>,
    },

    /// Play a WAV file through the output device.
    Play { input: PathBuf },
}

#[derive(Debug, Clone, Default, Args)]
struct AskArgs {
    /// Frames to capture (overrides `audio.capture_frames`).
    #[arg(long)]
    frames: Option<usize>,

    /// Synthesis voice (overrides `tts.voice`).
    #[arg(long)]
    voice: Option<String>,

    /// Directory for `question.wav` / `answer.wav`.
    #[arg(long, value_name = "DIR")]
    artifacts: Option<PathBuf>,

    /// API key for the answer and speech endpoints.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

impl AskArgs {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(frames) = self.frames {
            config.audio.capture_frames = frames;
        }
        if let Some(voice) = &self.voice {
            config.tts.voice = voice.clone();
        }
        if let Some(dir) = &self.artifacts {
            config.output.artifacts_dir = Some(dir.clone());
        }
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            config.answer.api_key = Some(key.to_string());
            config.tts.api_key = Some(key.to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Write `error[<Kind>]: <message>` for a failed turn.
fn write_failure(out: &mut impl Write, e: &TurnError) -> io::Result<()> {
    writeln!(out, "error[{}]: {e}", e.kind())
}

/// Print a tagged turn failure to stderr and map it to a non-zero exit.
fn report(e: TurnError) -> ExitCode {
    let _ = write_failure(&mut io::stderr().lock(), &e);
    ExitCode::FAILURE
}

fn ask(mut config: AppConfig, args: AskArgs) -> Result<ExitCode> {
    args.apply(&mut config);
    config.validate()?;

    // STT
    let model_path = AppPaths::new().model_file(&config.stt.model);
    let params = TranscribeParams {
        language: config.stt.language.clone(),
        use_gpu: config.stt.use_gpu,
        ..TranscribeParams::default()
    };
    let stt = WhisperTranscriber::load(&model_path, params)
        .with_context(|| format!("loading Whisper model {}", model_path.display()))?;

    // Devices
    let audio = &config.audio;
    let mic = CpalCapture::new(audio.input_device.clone(), audio.read_timeout());
    let speaker = CpalPlayback::new(audio.output_device.clone());

    let settings = TurnSettings {
        voice: args.voice.clone(),
        ..TurnSettings::from_config(&config)
    };
    log::info!(
        "voice-query: listening for {:.1} s at {}",
        audio.capture_secs(),
        settings.capture_format
    );

    let mut orchestrator = PipelineOrchestrator::new(
        settings,
        Box::new(mic),
        Box::new(speaker),
        Arc::new(stt),
        Arc::new(ApiAnswerer::from_config(&config.answer)),
        Arc::new(
            ApiSynthesizer::from_config(&config.tts)
                .with_frame_samples(config.audio.playback_frame_samples),
        ),
    );
    if let Some(dir) = &config.output.artifacts_dir {
        orchestrator = orchestrator.with_artifacts_dir(dir);
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    match rt.block_on(orchestrator.run_turn()) {
        Ok(turn) => {
            println!("Q: {}", turn.query_text);
            println!("A: {}", turn.answer_text);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(report(e)),
    }
}

fn record(config: &AppConfig, output: &Path, frames: Option<usize>) -> Result<ExitCode> {
    let audio = &config.audio;
    let frames = frames.unwrap_or(audio.capture_frames);
    let mut mic = CpalCapture::new(audio.input_device.clone(), audio.read_timeout());

    let buffer = match capture_stage(&mut mic, audio.capture_format(), audio.frame_samples, frames)
    {
        Ok(buffer) => buffer,
        Err(e) => return Ok(report(e.into())),
    };
    let bytes = match codec::encode(&buffer) {
        Ok(bytes) => bytes,
        Err(e) => return Ok(report(e.into())),
    };

    std::fs::write(output, bytes).with_context(|| format!("writing {}", output.display()))?;
    println!(
        "wrote {} ({:.2} s, {})",
        output.display(),
        buffer.duration_secs(),
        buffer.format()
    );
    Ok(ExitCode::SUCCESS)
}

fn play(config: &AppConfig, input: &Path) -> Result<ExitCode> {
    let bytes = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;

    let buffer = match codec::decode(&bytes, config.audio.playback_frame_samples) {
        Ok(buffer) => buffer,
        Err(e) => return Ok(report(e.into())),
    };

    let mut speaker = CpalPlayback::new(config.audio.output_device.clone());
    match playback_stage(&mut speaker, buffer) {
        Ok(frames) => {
            log::info!("voice-query: played {frames} frames from {}", input.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(report(e.into())),
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => AppConfig::load().context("loading settings")?,
    };

    match cli.command.unwrap_or(Command::Ask(cli.ask)) {
        Command::Ask(args) => ask(config, args),
        Command::Record { output, frames } => record(&config, &output, frames),
        Command::Play { input } => play(&config, &input),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
