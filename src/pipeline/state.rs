//! Turn progress and the user-visible turn result.

use crate::audio::AudioFormat;

// ---------------------------------------------------------------------------
// TurnStage
// ---------------------------------------------------------------------------

/// Where the orchestrator is within a turn.
///
/// ```text
/// Idle ─▶ Capturing ─▶ Transcribing ─▶ Answering ─▶ Synthesizing ─▶ Playing ─▶ Done
///              │              │              │              │            │
///              └──────────────┴──────────────┴──────────────┴────────────┴─▶ Failed
/// ```
///
/// `Done` and `Failed` are terminal for a turn; the next turn starts over
/// from `Capturing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnStage {
    #[default]
    Idle,
    Capturing,
    Transcribing,
    Answering,
    Synthesizing,
    Playing,
    Done,
    Failed,
}

impl TurnStage {
    /// Returns `true` while a turn is in flight.
    ///
    /// ```
    /// use voice_query::pipeline::TurnStage;
    ///
    /// assert!(!TurnStage::Idle.is_busy());
    /// assert!(TurnStage::Capturing.is_busy());
    /// assert!(TurnStage::Playing.is_busy());
    /// assert!(!TurnStage::Done.is_busy());
    /// assert!(!TurnStage::Failed.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        !matches!(self, TurnStage::Idle | TurnStage::Done | TurnStage::Failed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TurnStage::Idle => "Idle",
            TurnStage::Capturing => "Capturing",
            TurnStage::Transcribing => "Transcribing",
            TurnStage::Answering => "Answering",
            TurnStage::Synthesizing => "Synthesizing",
            TurnStage::Playing => "Playing",
            TurnStage::Done => "Done",
            TurnStage::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for TurnStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Turn
// ---------------------------------------------------------------------------

/// Result of one successful capture → playback cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    /// What the speaker asked, as transcribed.
    pub query_text: String,
    /// What was said back.
    pub answer_text: String,
    /// Frames captured from the microphone.
    pub query_frames: usize,
    /// Format the playback device was opened at.
    pub answer_format: AudioFormat,
    /// Frames written to the speaker.
    pub frames_played: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_idle() {
        assert_eq!(TurnStage::default(), TurnStage::Idle);
    }

    #[test]
    fn every_working_stage_is_busy() {
        for stage in [
            TurnStage::Capturing,
            TurnStage::Transcribing,
            TurnStage::Answering,
            TurnStage::Synthesizing,
            TurnStage::Playing,
        ] {
            assert!(stage.is_busy(), "{stage} should be busy");
        }
    }

    #[test]
    fn labels_match_display() {
        assert_eq!(TurnStage::Synthesizing.to_string(), "Synthesizing");
        assert_eq!(TurnStage::Failed.label(), "Failed");
    }
}
