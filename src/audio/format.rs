//! Audio format metadata and the frame-oriented [`AudioBuffer`].
//!
//! An [`AudioBuffer`] is an append-only sequence of raw PCM frames, each
//! holding `frame_samples` interleaved sample blocks.  Capture appends full
//! frames only; a decoded or synthesized payload may end with one shorter
//! tail frame.
//!
//! # Example
//!
//! ```rust
//! use voice_query::audio::{AudioBuffer, AudioFormat};
//!
//! let format = AudioFormat::new(1, 2, 16_000);
//! let mut buf = AudioBuffer::new(format, 4);
//! buf.append_frame(vec![0u8; 8]).unwrap(); // 4 samples × 2 bytes
//! assert_eq!(buf.frame_count(), 1);
//! assert_eq!(buf.payload_len(), 8);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// AudioFormat
// ---------------------------------------------------------------------------

/// Channel count, sample width and sample rate of a PCM stream.
///
/// Fixed for the lifetime of a buffer or an open device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Number of interleaved channels (1 = mono, 2 = stereo, …).
    pub channels: u16,
    /// Bytes per sample (2 = 16-bit).
    pub sample_width: u16,
    /// Samples per second per channel.
    pub sample_rate: u32,
}

impl AudioFormat {
    pub const fn new(channels: u16, sample_width: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_width,
            sample_rate,
        }
    }

    /// `true` when every field is positive.
    pub fn is_valid(&self) -> bool {
        self.channels > 0 && self.sample_width > 0 && self.sample_rate > 0
    }

    /// Bytes in one sample block (one sample for every channel).
    pub fn block_align(&self) -> usize {
        self.channels as usize * self.sample_width as usize
    }

    /// Bytes of payload per second of audio.
    pub fn bytes_per_second(&self) -> u64 {
        u64::from(self.sample_rate) * self.block_align() as u64
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ch / {}-bit / {} Hz",
            self.channels,
            u32::from(self.sample_width) * 8,
            self.sample_rate
        )
    }
}

// ---------------------------------------------------------------------------
// FrameError
// ---------------------------------------------------------------------------

/// Reason a frame was rejected by [`AudioBuffer::append_frame`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame is empty")]
    Empty,

    #[error("frame of {len} bytes is not a whole number of {block_align}-byte sample blocks")]
    PartialBlock { len: usize, block_align: usize },

    #[error("frame of {len} bytes exceeds the {max}-byte frame size")]
    Oversized { len: usize, max: usize },

    #[error("cannot append after a short tail frame")]
    AfterTail,

    #[error("invalid audio format: {0:?}")]
    InvalidFormat(AudioFormat),
}

// ---------------------------------------------------------------------------
// AudioBuffer
// ---------------------------------------------------------------------------

/// Ordered sequence of raw PCM frames sharing one [`AudioFormat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBuffer {
    format: AudioFormat,
    frame_samples: usize,
    frames: Vec<Vec<u8>>,
}

impl AudioBuffer {
    /// Create an empty buffer whose full frames hold `frame_samples` sample
    /// blocks each.
    pub fn new(format: AudioFormat, frame_samples: usize) -> Self {
        Self {
            format,
            frame_samples,
            frames: Vec::new(),
        }
    }

    /// Split a contiguous PCM payload into frames of `frame_samples` blocks.
    /// The last frame holds whatever remains.
    pub fn from_pcm(
        format: AudioFormat,
        frame_samples: usize,
        pcm: &[u8],
    ) -> Result<Self, FrameError> {
        if !format.is_valid() {
            return Err(FrameError::InvalidFormat(format));
        }
        let mut buffer = Self::new(format, frame_samples);
        let frame_bytes = buffer.frame_bytes();
        if frame_bytes == 0 {
            return Err(FrameError::Empty);
        }
        for chunk in pcm.chunks(frame_bytes) {
            buffer.append_frame(chunk.to_vec())?;
        }
        Ok(buffer)
    }

    /// Append one frame, enforcing the frame-size invariant.
    pub fn append_frame(&mut self, frame: Vec<u8>) -> Result<(), FrameError> {
        if !self.format.is_valid() {
            return Err(FrameError::InvalidFormat(self.format));
        }
        if frame.is_empty() {
            return Err(FrameError::Empty);
        }
        let block_align = self.format.block_align();
        if frame.len() % block_align != 0 {
            return Err(FrameError::PartialBlock {
                len: frame.len(),
                block_align,
            });
        }
        let max = self.frame_bytes();
        if frame.len() > max {
            return Err(FrameError::Oversized {
                len: frame.len(),
                max,
            });
        }
        if self.frames.last().is_some_and(|last| last.len() < max) {
            return Err(FrameError::AfterTail);
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Sample blocks per full frame.
    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    /// Byte length of a full frame.
    pub fn frame_bytes(&self) -> usize {
        self.frame_samples * self.format.block_align()
    }

    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total payload bytes across all frames.
    pub fn payload_len(&self) -> usize {
        self.frames.iter().map(Vec::len).sum()
    }

    /// Concatenated payload in frame order.
    pub fn to_pcm(&self) -> Vec<u8> {
        self.frames.concat()
    }

    /// Playback duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        let bps = self.format.bytes_per_second();
        if bps == 0 {
            return 0.0;
        }
        self.payload_len() as f32 / bps as f32
    }

    /// Consume the buffer into its lazy, non-restartable frame sequence.
    pub fn into_frames(self) -> std::vec::IntoIter<Vec<u8>> {
        self.frames.into_iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
