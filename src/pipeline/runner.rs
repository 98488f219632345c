//! Pipeline orchestrator: one capture → transcribe → answer → synthesize →
//! playback turn at a time.
//!
//! # Turn flow
//!
//! ```text
//! spawn_blocking(capture_stage)        [Capturing]     mic opened, N frames, mic closed
//!   └─▶ codec::encode → question.wav
//!         └─▶ spawn_blocking(stt.transcribe)   [Transcribing]
//!               ├─ "" → TranscriptionEmpty (stop)
//!               └─▶ answerer.answer (async)     [Answering]
//!                     └─▶ synth.synthesize (async)   [Synthesizing]
//!                           └─▶ encode → answer.wav → decode
//!                                 └─▶ spawn_blocking(playback_stage)  [Playing]
//! ```
//!
//! Device stages and Whisper inference block for real time, so they run on
//! `tokio::task::spawn_blocking`.  The boxed device is moved into the
//! blocking task and handed back with the result; the orchestrator is the
//! only owner of each device.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::answer::AnswerService;
use crate::audio::{codec, AudioBuffer, AudioFormat};
use crate::config::AppConfig;
use crate::device::{
    capture_into, play_frames, CaptureDevice, DeviceError, DeviceHandle, Direction, PlaybackDevice,
};
use crate::stt::TranscriptionService;
use crate::tts::{SynthesisService, SynthesizedSpeech};

use super::error::TurnError;
use super::state::{Turn, TurnStage};

/// File written with the captured question when artifacts are enabled.
pub const QUESTION_FILE: &str = "question.wav";
/// File written with the synthesized answer when artifacts are enabled.
pub const ANSWER_FILE: &str = "answer.wav";

// ---------------------------------------------------------------------------
// TurnSettings
// ---------------------------------------------------------------------------

/// Per-turn audio parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSettings {
    /// Format the microphone is opened at.
    pub capture_format: AudioFormat,
    /// Sample blocks per captured frame.
    pub frame_samples: usize,
    /// Frames captured per turn.
    pub capture_frames: usize,
    /// Sample blocks per frame streamed to the speaker.
    pub playback_frame_samples: usize,
    /// Voice passed to the synthesis service; `None` uses its default.
    pub voice: Option<String>,
}

impl TurnSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let audio = &config.audio;
        Self {
            capture_format: audio.capture_format(),
            frame_samples: audio.frame_samples,
            capture_frames: audio.capture_frames,
            playback_frame_samples: audio.playback_frame_samples,
            voice: None,
        }
    }
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Stage helpers
// ---------------------------------------------------------------------------

/// Open `device` at `format`, capture `frame_count` frames and close it.
///
/// The device is closed on every path, including errors part-way through.
pub fn capture_stage<D: CaptureDevice + ?Sized>(
    device: &mut D,
    format: AudioFormat,
    frame_samples: usize,
    frame_count: usize,
) -> Result<AudioBuffer, DeviceError> {
    let mut buffer = AudioBuffer::new(format, frame_samples);
    let mut handle = DeviceHandle::open(device, format, frame_samples)?;
    log::info!("capture: recording {frame_count} frames at {format}");
    capture_into(&mut buffer, &mut handle, frame_count)?;
    handle.close();
    log::debug!(
        "capture: {} frames, {:.2} s",
        buffer.frame_count(),
        buffer.duration_secs()
    );
    Ok(buffer)
}

/// Open `device` at the buffer's format, play every frame and close it.
///
/// Returns the number of frames written.
pub fn playback_stage<D: PlaybackDevice + ?Sized>(
    device: &mut D,
    buffer: AudioBuffer,
) -> Result<usize, DeviceError> {
    let format = buffer.format();
    let mut handle = DeviceHandle::open(device, format, buffer.frame_samples())?;
    log::info!(
        "playback: {} frames at {format} ({:.2} s)",
        buffer.frame_count(),
        buffer.duration_secs()
    );
    let written = play_frames(&mut handle, buffer.into_frames())?;
    handle.close();
    Ok(written)
}

// ---------------------------------------------------------------------------
// PipelineOrchestrator
// ---------------------------------------------------------------------------

/// Runs voice-query turns over one capture and one playback device.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use voice_query::config::AppConfig;
/// use voice_query::pipeline::{PipelineOrchestrator, TurnSettings};
/// # use voice_query::answer::AnswerService;
/// # use voice_query::stt::TranscriptionService;
/// # use voice_query::tts::SynthesisService;
/// # use voice_query::device::{CaptureDevice, PlaybackDevice};
/// # fn parts() -> (Box<dyn CaptureDevice>, Box<dyn PlaybackDevice>,
/// #     Arc<dyn TranscriptionService>, Arc<dyn AnswerService>, Arc<dyn SynthesisService>) {
/// #     unimplemented!()
/// # }
/// # async fn example() {
/// let (mic, speaker, stt, answerer, synth) = parts();
/// let mut orchestrator = PipelineOrchestrator::new(
///     TurnSettings::from_config(&AppConfig::default()),
///     mic,
///     speaker,
///     stt,
///     answerer,
///     synth,
/// );
/// match orchestrator.run_turn().await {
///     Ok(turn) => println!("Q: {}\nA: {}", turn.query_text, turn.answer_text),
///     Err(e) => eprintln!("error[{}]: {e}", e.kind()),
/// }
/// # }
/// ```
pub struct PipelineOrchestrator {
    settings: TurnSettings,
    capture: Option<Box<dyn CaptureDevice>>,
    playback: Option<Box<dyn PlaybackDevice>>,
    stt: Arc<dyn TranscriptionService>,
    answerer: Arc<dyn AnswerService>,
    synth: Arc<dyn SynthesisService>,
    artifacts_dir: Option<PathBuf>,
    stage: TurnStage,
}

impl PipelineOrchestrator {
    pub fn new(
        settings: TurnSettings,
        capture: Box<dyn CaptureDevice>,
        playback: Box<dyn PlaybackDevice>,
        stt: Arc<dyn TranscriptionService>,
        answerer: Arc<dyn AnswerService>,
        synth: Arc<dyn SynthesisService>,
    ) -> Self {
        Self {
            settings,
            capture: Some(capture),
            playback: Some(playback),
            stt,
            answerer,
            synth,
            artifacts_dir: None,
            stage: TurnStage::Idle,
        }
    }

    /// Write `question.wav` and `answer.wav` into `dir` on every turn.
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = Some(dir.into());
        self
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    /// Stage of the current or most recent turn.
    pub fn stage(&self) -> TurnStage {
        self.stage
    }

    /// Run one full turn.
    ///
    /// Any stage failure aborts the rest of the turn.  Devices opened by the
    /// turn are closed before this returns, whatever the outcome.
    pub async fn run_turn(&mut self) -> Result<Turn, TurnError> {
        let result = self.execute().await;
        match &result {
            Ok(turn) => {
                self.enter(TurnStage::Done);
                log::info!(
                    "pipeline: turn complete ({} frames in, {} frames out)",
                    turn.query_frames,
                    turn.frames_played
                );
            }
            Err(e) => {
                log::error!("pipeline: turn failed during {} [{}]: {e}", self.stage, e.kind());
                self.enter(TurnStage::Failed);
            }
        }
        result
    }

    async fn execute(&mut self) -> Result<Turn, TurnError> {
        // ── 1. Capture ───────────────────────────────────────────────────
        self.enter(TurnStage::Capturing);
        let query_audio = self.capture().await?;
        let query_frames = query_audio.frame_count();

        // ── 2. Encode the question ───────────────────────────────────────
        let question = codec::encode(&query_audio)?;
        self.save_artifact(QUESTION_FILE, &question);

        // ── 3. Transcribe ────────────────────────────────────────────────
        self.enter(TurnStage::Transcribing);
        let stt = Arc::clone(&self.stt);
        let raw_text = tokio::task::spawn_blocking(move || stt.transcribe(&question))
            .await
            .map_err(|e| TurnError::Transcription(format!("transcription task aborted: {e}")))??;

        let query_text = raw_text.trim().to_string();
        if query_text.is_empty() {
            return Err(TurnError::TranscriptionEmpty);
        }
        log::info!("pipeline: query = {query_text:?}");

        // ── 4. Answer ────────────────────────────────────────────────────
        self.enter(TurnStage::Answering);
        let answer_text = self.answerer.answer(&query_text).await?.trim().to_string();
        if answer_text.is_empty() {
            return Err(TurnError::AnswerService(
                "answer service returned an empty answer".into(),
            ));
        }
        log::info!("pipeline: answer = {answer_text:?}");

        // ── 5. Synthesize ────────────────────────────────────────────────
        self.enter(TurnStage::Synthesizing);
        let speech = self
            .synth
            .synthesize(&answer_text, self.settings.voice.as_deref())
            .await?;

        // ── 6. Encode → decode: the buffer actually played ───────────────
        let speech = at_declared_rate(speech)?;
        let answer = codec::encode(&speech)?;
        self.save_artifact(ANSWER_FILE, &answer);
        let playable = codec::decode(&answer, self.settings.playback_frame_samples)?;
        let answer_format = playable.format();

        // ── 7. Play ──────────────────────────────────────────────────────
        self.enter(TurnStage::Playing);
        let frames_played = self.play(playable).await?;

        Ok(Turn {
            query_text,
            answer_text,
            query_frames,
            answer_format,
            frames_played,
        })
    }

    async fn capture(&mut self) -> Result<AudioBuffer, TurnError> {
        let mut device = self
            .capture
            .take()
            .ok_or_else(|| lost_device(Direction::Capture))?;
        let format = self.settings.capture_format;
        let frame_samples = self.settings.frame_samples;
        let frame_count = self.settings.capture_frames;

        let (device, result) = tokio::task::spawn_blocking(move || {
            let result = capture_stage(device.as_mut(), format, frame_samples, frame_count);
            (device, result)
        })
        .await
        .map_err(|e| TurnError::Device(format!("capture stage aborted: {e}")))?;

        self.capture = Some(device);
        Ok(result?)
    }

    async fn play(&mut self, buffer: AudioBuffer) -> Result<usize, TurnError> {
        let mut device = self
            .playback
            .take()
            .ok_or_else(|| lost_device(Direction::Playback))?;

        let (device, result) = tokio::task::spawn_blocking(move || {
            let result = playback_stage(device.as_mut(), buffer);
            (device, result)
        })
        .await
        .map_err(|e| TurnError::Device(format!("playback stage aborted: {e}")))?;

        self.playback = Some(device);
        Ok(result?)
    }

    fn enter(&mut self, stage: TurnStage) {
        log::debug!("pipeline: {} → {stage}", self.stage);
        if stage.is_busy() {
            log::info!("pipeline: {stage}");
        }
        self.stage = stage;
    }

    fn save_artifact(&self, name: &str, bytes: &[u8]) {
        if let Some(dir) = &self.artifacts_dir {
            if let Err(e) = write_artifact(dir, name, bytes) {
                log::warn!("pipeline: could not save {name} in {}: {e}", dir.display());
            }
        }
    }
}

fn lost_device(direction: Direction) -> TurnError {
    TurnError::DeviceUnavailable(format!(
        "{direction} device was lost when an earlier stage aborted"
    ))
}

fn write_artifact(dir: &Path, name: &str, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(name), bytes)?;
    log::debug!("pipeline: wrote {}", dir.join(name).display());
    Ok(())
}

/// The synthesized buffer, relabelled at the rate the service declared.
fn at_declared_rate(speech: SynthesizedSpeech) -> Result<AudioBuffer, TurnError> {
    let SynthesizedSpeech {
        buffer,
        sample_rate_hz,
    } = speech;

    if buffer.is_empty() {
        return Err(TurnError::Synthesis("service returned no audio".into()));
    }
    if buffer.format().sample_rate == sample_rate_hz {
        return Ok(buffer);
    }

    log::warn!(
        "pipeline: synthesized buffer says {} Hz but service reported {sample_rate_hz} Hz; using the latter",
        buffer.format().sample_rate
    );
    let format = AudioFormat {
        sample_rate: sample_rate_hz,
        ..buffer.format()
    };
    AudioBuffer::from_pcm(format, buffer.frame_samples(), &buffer.to_pcm())
        .map_err(|e| TurnError::Synthesis(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::tempdir;

    use super::*;
    use crate::answer::AnswerError;
    use crate::device::mock::{MockCapture, MockPlayback, MockProbe};
    use crate::device::Device;
    use crate::pipeline::FailureKind;
    use crate::stt::{MockTranscriber, SttError};
    use crate::tts::TtsError;

    const MONO_16K: AudioFormat = AudioFormat::new(1, 2, 16_000);
    const MONO_22K: AudioFormat = AudioFormat::new(1, 2, 22_050);

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    struct StubAnswer {
        reply: Result<String, AnswerError>,
        calls: AtomicUsize,
    }

    impl StubAnswer {
        fn ok(text: &str) -> Self {
            Self {
                reply: Ok(text.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn err(e: AnswerError) -> Self {
            Self {
                reply: Err(e),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AnswerService for StubAnswer {
        async fn answer(&self, _query: &str) -> Result<String, AnswerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    struct StubSynth {
        reply: Result<SynthesizedSpeech, TtsError>,
        calls: AtomicUsize,
        voices: Mutex<Vec<Option<String>>>,
    }

    impl StubSynth {
        fn ok(speech: SynthesizedSpeech) -> Self {
            Self {
                reply: Ok(speech),
                calls: AtomicUsize::new(0),
                voices: Mutex::new(Vec::new()),
            }
        }

        fn err(e: TtsError) -> Self {
            Self {
                reply: Err(e),
                calls: AtomicUsize::new(0),
                voices: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SynthesisService for StubSynth {
        async fn synthesize(
            &self,
            _text: &str,
            voice_id: Option<&str>,
        ) -> Result<SynthesizedSpeech, TtsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.voices.lock().unwrap().push(voice_id.map(str::to_string));
            self.reply.clone()
        }
    }

    /// Capture device whose stream thread dies.
    struct PanickingCapture;

    impl Device for PanickingCapture {
        fn direction(&self) -> Direction {
            Direction::Capture
        }

        fn open(&mut self, _: &AudioFormat, _: usize) -> Result<(), DeviceError> {
            Ok(())
        }

        fn close(&mut self) {}
    }

    impl CaptureDevice for PanickingCapture {
        fn read_frame(&mut self) -> Result<Vec<u8>, DeviceError> {
            panic!("driver crashed");
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// `frames` full frames of 2048 samples at 22 050 Hz mono.
    fn speech_22k(frames: usize) -> SynthesizedSpeech {
        let pcm = vec![0x11u8; frames * 2048 * 2];
        SynthesizedSpeech::new(AudioBuffer::from_pcm(MONO_22K, 2048, &pcm).unwrap())
    }

    fn settings() -> TurnSettings {
        TurnSettings {
            capture_format: MONO_16K,
            frame_samples: 2048,
            capture_frames: 5,
            playback_frame_samples: 2048,
            voice: None,
        }
    }

    struct Harness {
        orc: PipelineOrchestrator,
        mic: MockProbe,
        speaker: MockProbe,
        stt: Arc<MockTranscriber>,
        answer: Arc<StubAnswer>,
        synth: Arc<StubSynth>,
    }

    fn build(
        settings: TurnSettings,
        mic: MockCapture,
        speaker: MockPlayback,
        stt: MockTranscriber,
        answer: StubAnswer,
        synth: StubSynth,
    ) -> Harness {
        let (mic_probe, speaker_probe) = (mic.probe(), speaker.probe());
        let stt = Arc::new(stt);
        let answer = Arc::new(answer);
        let synth = Arc::new(synth);
        let orc = PipelineOrchestrator::new(
            settings,
            Box::new(mic),
            Box::new(speaker),
            stt.clone(),
            answer.clone(),
            synth.clone(),
        );
        Harness {
            orc,
            mic: mic_probe,
            speaker: speaker_probe,
            stt,
            answer,
            synth,
        }
    }

    fn harness(stt: MockTranscriber, answer: StubAnswer, synth: StubSynth) -> Harness {
        build(
            settings(),
            MockCapture::new(MONO_16K),
            MockPlayback::new(MONO_22K),
            stt,
            answer,
            synth,
        )
    }

    fn happy() -> Harness {
        harness(
            MockTranscriber::ok("what is the weather"),
            StubAnswer::ok("it is sunny"),
            StubSynth::ok(speech_22k(3)),
        )
    }

    // -----------------------------------------------------------------------
    // End-to-end turns
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn full_turn_plays_synthesized_answer() {
        let mut h = happy();
        assert_eq!(h.orc.stage(), TurnStage::Idle);

        let turn = h.orc.run_turn().await.unwrap();

        assert_eq!(turn.query_text, "what is the weather");
        assert_eq!(turn.answer_text, "it is sunny");
        assert_eq!(turn.query_frames, 5);
        assert_eq!(turn.answer_format, MONO_22K);
        assert_eq!(turn.frames_played, 3);

        assert_eq!(h.mic.opened_format(), Some(MONO_16K));
        assert_eq!(h.mic.frames_read(), 5);
        assert!(!h.mic.is_open());

        assert_eq!(h.speaker.opened_format(), Some(MONO_22K));
        assert_eq!(h.speaker.frames_written(), 3);
        assert!(!h.speaker.is_open());
        assert_eq!(h.speaker.close_count(), 1);

        assert_eq!(h.orc.stage(), TurnStage::Done);
    }

    #[tokio::test]
    async fn empty_transcript_stops_before_answering() {
        let mut h = harness(
            MockTranscriber::ok(""),
            StubAnswer::ok("unused"),
            StubSynth::ok(speech_22k(1)),
        );

        let err = h.orc.run_turn().await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::TranscriptionEmpty);
        assert_eq!(h.answer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.synth.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.speaker.open_count(), 0);
        assert!(!h.mic.is_open());
        assert_eq!(h.orc.stage(), TurnStage::Failed);
    }

    #[tokio::test]
    async fn whitespace_transcript_counts_as_empty() {
        let mut h = harness(
            MockTranscriber::ok("  \n\t"),
            StubAnswer::ok("unused"),
            StubSynth::ok(speech_22k(1)),
        );
        let err = h.orc.run_turn().await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::TranscriptionEmpty);
        assert_eq!(h.answer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn synthesis_failure_never_opens_speaker() {
        let mut h = harness(
            MockTranscriber::ok("what is the weather"),
            StubAnswer::ok("it is sunny"),
            StubSynth::err(TtsError::Timeout),
        );

        let err = h.orc.run_turn().await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::SynthesisError);
        assert_eq!(h.mic.open_count(), 1);
        assert!(!h.mic.is_open());
        assert_eq!(h.stt.calls(), 1);
        assert_eq!(h.answer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.speaker.open_count(), 0);
    }

    // -----------------------------------------------------------------------
    // Failure tagging and device discipline
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn capture_failure_is_device_error_and_skips_services() {
        let mut h = build(
            settings(),
            MockCapture::new(MONO_16K).fail_after(2),
            MockPlayback::new(MONO_22K),
            MockTranscriber::ok("unused"),
            StubAnswer::ok("unused"),
            StubSynth::ok(speech_22k(1)),
        );

        let err = h.orc.run_turn().await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::DeviceError);
        assert!(!h.mic.is_open());
        assert_eq!(h.stt.calls(), 0);
        assert_eq!(h.speaker.open_count(), 0);
    }

    #[tokio::test]
    async fn unsupported_capture_format_is_device_unavailable() {
        let mut h = build(
            settings(),
            MockCapture::new(AudioFormat::new(2, 2, 16_000)),
            MockPlayback::new(MONO_22K),
            MockTranscriber::ok("unused"),
            StubAnswer::ok("unused"),
            StubSynth::ok(speech_22k(1)),
        );

        let err = h.orc.run_turn().await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::DeviceUnavailable);
        assert_eq!(h.mic.open_count(), 0);
        assert!(!h.mic.is_open());
    }

    #[tokio::test]
    async fn unset_capture_format_is_device_error() {
        let mut h = build(
            TurnSettings {
                capture_format: AudioFormat::new(1, 2, 0),
                ..settings()
            },
            MockCapture::new(MONO_16K),
            MockPlayback::new(MONO_22K),
            MockTranscriber::ok("unused"),
            StubAnswer::ok("unused"),
            StubSynth::ok(speech_22k(1)),
        );

        let err = h.orc.run_turn().await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::DeviceError);
        assert_eq!(h.mic.open_count(), 0);
        assert_eq!(h.stt.calls(), 0);
    }

    #[tokio::test]
    async fn unplayable_answer_rate_is_device_unavailable() {
        let mut h = build(
            settings(),
            MockCapture::new(MONO_16K),
            MockPlayback::new(MONO_16K),
            MockTranscriber::ok("what is the weather"),
            StubAnswer::ok("it is sunny"),
            StubSynth::ok(speech_22k(3)),
        );

        let err = h.orc.run_turn().await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::DeviceUnavailable);
        assert!(!h.speaker.is_open());
        assert_eq!(h.speaker.frames_written(), 0);
        assert!(!h.mic.is_open());
    }

    #[tokio::test]
    async fn playback_failure_still_closes_speaker() {
        let mut h = build(
            settings(),
            MockCapture::new(MONO_16K),
            MockPlayback::new(MONO_22K).fail_after(1),
            MockTranscriber::ok("what is the weather"),
            StubAnswer::ok("it is sunny"),
            StubSynth::ok(speech_22k(3)),
        );

        let err = h.orc.run_turn().await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::DeviceError);
        assert_eq!(h.speaker.frames_written(), 1);
        assert!(!h.speaker.is_open());
    }

    #[tokio::test]
    async fn transcription_failure_skips_answer() {
        let mut h = harness(
            MockTranscriber::err(SttError::Transcription("model crashed".into())),
            StubAnswer::ok("unused"),
            StubSynth::ok(speech_22k(1)),
        );

        let err = h.orc.run_turn().await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::TranscriptionError);
        assert!(err.to_string().contains("model crashed"));
        assert_eq!(h.answer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn answer_failure_skips_synthesis() {
        let mut h = harness(
            MockTranscriber::ok("what is the weather"),
            StubAnswer::err(AnswerError::Timeout),
            StubSynth::ok(speech_22k(1)),
        );

        let err = h.orc.run_turn().await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::AnswerServiceError);
        assert_eq!(h.synth.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.speaker.open_count(), 0);
    }

    #[tokio::test]
    async fn blank_answer_is_an_answer_failure() {
        let mut h = harness(
            MockTranscriber::ok("what is the weather"),
            StubAnswer::ok("   "),
            StubSynth::ok(speech_22k(1)),
        );

        let err = h.orc.run_turn().await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::AnswerServiceError);
        assert_eq!(h.synth.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_synthesized_audio_is_synthesis_failure() {
        let silent = SynthesizedSpeech::new(AudioBuffer::new(MONO_22K, 2048));
        let mut h = harness(
            MockTranscriber::ok("what is the weather"),
            StubAnswer::ok("it is sunny"),
            StubSynth::ok(silent),
        );

        let err = h.orc.run_turn().await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::SynthesisError);
        assert_eq!(h.speaker.open_count(), 0);
    }

    #[tokio::test]
    async fn device_lost_to_panic_fails_later_turns() {
        let mut orc = PipelineOrchestrator::new(
            settings(),
            Box::new(PanickingCapture),
            Box::new(MockPlayback::new(MONO_22K)),
            Arc::new(MockTranscriber::ok("unused")),
            Arc::new(StubAnswer::ok("unused")),
            Arc::new(StubSynth::ok(speech_22k(1))),
        );

        let first = orc.run_turn().await.unwrap_err();
        assert_eq!(first.kind(), FailureKind::DeviceError);

        let second = orc.run_turn().await.unwrap_err();
        assert_eq!(second.kind(), FailureKind::DeviceUnavailable);
    }

    // -----------------------------------------------------------------------
    // Settings, artifacts, repeated turns
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn voice_is_forwarded_to_synthesis() {
        let mut s = settings();
        s.voice = Some("nova".into());
        let mut h = build(
            s,
            MockCapture::new(MONO_16K),
            MockPlayback::new(MONO_22K),
            MockTranscriber::ok("what is the weather"),
            StubAnswer::ok("it is sunny"),
            StubSynth::ok(speech_22k(1)),
        );

        h.orc.run_turn().await.unwrap();

        assert_eq!(
            *h.synth.voices.lock().unwrap(),
            vec![Some("nova".to_string())]
        );
    }

    #[tokio::test]
    async fn playback_uses_configured_chunk_size() {
        let mut s = settings();
        s.playback_frame_samples = 1024;
        let mut h = build(
            s,
            MockCapture::new(MONO_16K),
            MockPlayback::new(MONO_22K),
            MockTranscriber::ok("what is the weather"),
            StubAnswer::ok("it is sunny"),
            StubSynth::ok(speech_22k(3)),
        );

        let turn = h.orc.run_turn().await.unwrap();

        assert_eq!(turn.frames_played, 6);
        assert!(h.speaker.written().iter().all(|f| f.len() == 1024 * 2));
    }

    #[tokio::test]
    async fn declared_sample_rate_wins() {
        let buffer = AudioBuffer::from_pcm(MONO_16K, 2048, &[0u8; 2048 * 2]).unwrap();
        let speech = SynthesizedSpeech {
            buffer,
            sample_rate_hz: 22_050,
        };
        let mut h = harness(
            MockTranscriber::ok("what is the weather"),
            StubAnswer::ok("it is sunny"),
            StubSynth::ok(speech),
        );

        let turn = h.orc.run_turn().await.unwrap();

        assert_eq!(turn.answer_format, MONO_22K);
        assert_eq!(h.speaker.opened_format(), Some(MONO_22K));
    }

    #[tokio::test]
    async fn artifacts_are_written_per_turn() {
        let dir = tempdir().expect("temp dir");
        let mut h = happy();
        h.orc = h.orc.with_artifacts_dir(dir.path().join("turns"));

        h.orc.run_turn().await.unwrap();

        let question = std::fs::read(dir.path().join("turns").join(QUESTION_FILE)).unwrap();
        let question = codec::decode(&question, 2048).unwrap();
        assert_eq!(question.format(), MONO_16K);
        assert_eq!(question.frame_count(), 5);

        let answer = std::fs::read(dir.path().join("turns").join(ANSWER_FILE)).unwrap();
        assert_eq!(codec::decode(&answer, 2048).unwrap().format(), MONO_22K);
    }

    #[tokio::test]
    async fn unwritable_artifacts_dir_does_not_fail_turn() {
        let dir = tempdir().expect("temp dir");
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let mut h = happy();
        h.orc = h.orc.with_artifacts_dir(&blocker);

        assert!(h.orc.run_turn().await.is_ok());
    }

    #[tokio::test]
    async fn devices_are_reused_across_turns() {
        let mut h = happy();

        h.orc.run_turn().await.unwrap();
        h.orc.run_turn().await.unwrap();

        assert_eq!(h.mic.open_count(), 2);
        assert_eq!(h.speaker.open_count(), 2);
        assert_eq!(h.speaker.frames_written(), 6);
        assert!(!h.mic.is_open() && !h.speaker.is_open());
    }

    // -----------------------------------------------------------------------
    // Stage helpers
    // -----------------------------------------------------------------------

    #[test]
    fn capture_stage_returns_closed_device_and_full_buffer() {
        let mut mic = MockCapture::new(MONO_16K);
        let probe = mic.probe();
        let buffer = capture_stage(&mut mic, MONO_16K, 256, 4).unwrap();
        assert_eq!(buffer.frame_count(), 4);
        assert_eq!(buffer.payload_len(), 4 * 256 * 2);
        assert!(!probe.is_open());
    }

    #[test]
    fn playback_stage_opens_at_buffer_format() {
        let mut speaker = MockPlayback::new(MONO_22K);
        let probe = speaker.probe();
        let buffer = AudioBuffer::from_pcm(MONO_22K, 256, &[0u8; 256 * 2 * 2 + 10]).unwrap();
        assert_eq!(playback_stage(&mut speaker, buffer).unwrap(), 3);
        assert_eq!(probe.opened_format(), Some(MONO_22K));
        assert!(!probe.is_open());
    }

    #[test]
    fn settings_follow_config() {
        let mut cfg = AppConfig::default();
        cfg.audio.channels = 1;
        cfg.audio.capture_frames = 8;
        let s = TurnSettings::from_config(&cfg);
        assert_eq!(s.capture_format, MONO_16K);
        assert_eq!(s.capture_frames, 8);
        assert_eq!(s.voice, None);
    }
}
