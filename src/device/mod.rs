//! Capture and playback devices with scoped open/close discipline.
//!
//! # Lifecycle
//!
//! ```text
//! Closed ──open(format)──▶ Open ──read/write──▶ Streaming ──▶ Open ──close──▶ Closed
//! ```
//!
//! A [`DeviceHandle`] is the only way the pipeline touches a device.  It is an
//! RAII guard: the device is closed when the handle is dropped, so every exit
//! path (success, `?`, panic) releases the hardware.
//!
//! [`capture_into`] and [`play_frames`] drive the frame loops on top of an
//! open handle.
//!
//! # Example
//!
//! ```rust,no_run
//! use voice_query::audio::{AudioBuffer, AudioFormat};
//! use voice_query::device::{capture_into, CpalCapture, DeviceHandle};
//!
//! let format = AudioFormat::new(2, 2, 16_000);
//! let mut mic = CpalCapture::new(None, std::time::Duration::from_secs(5));
//! let mut buffer = AudioBuffer::new(format, 2048);
//!
//! let mut handle = DeviceHandle::open(&mut mic, format, 2048).unwrap();
//! capture_into(&mut buffer, &mut handle, 40).unwrap();
//! // `handle` closes the microphone when it goes out of scope.
//! ```

pub mod cpal_backend;
#[cfg(test)]
pub(crate) mod mock;

use thiserror::Error;

use crate::audio::{AudioBuffer, AudioFormat};

pub use cpal_backend::{CpalCapture, CpalPlayback};

// ---------------------------------------------------------------------------
// DeviceError
// ---------------------------------------------------------------------------

/// Errors raised by capture and playback devices.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The device does not exist or cannot be configured to the exact
    /// requested format.
    #[error("device unavailable: {0}")]
    Unavailable(String),

    /// The operation is not valid in the device's current state (closed
    /// handle, mismatched buffer).
    #[error("invalid device state: {0}")]
    InvalidState(String),

    /// The device reported an error while streaming, or was asked to stream
    /// an unset format.
    #[error("device I/O error: {0}")]
    Io(String),
}

// ---------------------------------------------------------------------------
// Device traits
// ---------------------------------------------------------------------------

/// Stream direction of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Capture,
    Playback,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Direction::Capture => "capture",
            Direction::Playback => "playback",
        })
    }
}

/// Lifecycle shared by capture and playback devices.
///
/// # Contract
///
/// - `open` configures the device at exactly `format` (no resampling) or
///   fails with [`DeviceError::Unavailable`], leaving nothing acquired.
/// - `close` is idempotent and always succeeds.
pub trait Device: Send {
    fn direction(&self) -> Direction;

    /// Acquire the device at `format`, streaming frames of `frame_samples`
    /// sample blocks.
    fn open(&mut self, format: &AudioFormat, frame_samples: usize) -> Result<(), DeviceError>;

    /// Release the device.
    fn close(&mut self);
}

/// An input device that yields one frame per call.
pub trait CaptureDevice: Device {
    /// Block until a full frame is available and return it.
    fn read_frame(&mut self) -> Result<Vec<u8>, DeviceError>;
}

/// An output device that accepts one frame per call.
pub trait PlaybackDevice: Device {
    /// Block until `frame` has been queued for output.
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), DeviceError>;
}

// Compile-time assertion: both device traits are object-safe.
const _: fn() = || {
    fn _capture(_: Box<dyn CaptureDevice>) {}
    fn _playback(_: Box<dyn PlaybackDevice>) {}
};

// ---------------------------------------------------------------------------
// DeviceHandle
// ---------------------------------------------------------------------------

/// An open device, closed on drop.
pub struct DeviceHandle<'d, D: Device + ?Sized> {
    device: &'d mut D,
    format: AudioFormat,
    frame_samples: usize,
    is_open: bool,
}

impl<'d, D: Device + ?Sized> DeviceHandle<'d, D> {
    /// Open `device` at `format`.
    ///
    /// # Errors
    ///
    /// - [`DeviceError::Io`] — `format` has a zero field or `frame_samples`
    ///   is zero.
    /// - Whatever the device's `open` returns, typically
    ///   [`DeviceError::Unavailable`].  The device is closed again before
    ///   the error is returned.
    pub fn open(
        device: &'d mut D,
        format: AudioFormat,
        frame_samples: usize,
    ) -> Result<Self, DeviceError> {
        if !format.is_valid() {
            return Err(DeviceError::Io(format!("audio format is unset: {format:?}")));
        }
        if frame_samples == 0 {
            return Err(DeviceError::Io("frame size is zero".into()));
        }

        if let Err(e) = device.open(&format, frame_samples) {
            device.close();
            log::warn!("{}: open at {format} failed: {e}", device.direction());
            return Err(e);
        }

        log::debug!("{}: opened at {format}", device.direction());
        Ok(Self {
            device,
            format,
            frame_samples,
            is_open: true,
        })
    }

    pub fn direction(&self) -> Direction {
        self.device.direction()
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Close the device.  Safe to call any number of times.
    pub fn close(&mut self) {
        if self.is_open {
            self.device.close();
            self.is_open = false;
            log::debug!("{}: closed", self.device.direction());
        }
    }

    fn ensure_open(&self) -> Result<(), DeviceError> {
        if self.is_open {
            Ok(())
        } else {
            Err(DeviceError::InvalidState(format!(
                "{} handle is closed",
                self.device.direction()
            )))
        }
    }
}

impl<D: CaptureDevice + ?Sized> DeviceHandle<'_, D> {
    pub fn read_frame(&mut self) -> Result<Vec<u8>, DeviceError> {
        self.ensure_open()?;
        self.device.read_frame()
    }
}

impl<D: PlaybackDevice + ?Sized> DeviceHandle<'_, D> {
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<(), DeviceError> {
        self.ensure_open()?;
        self.device.write_frame(frame)
    }
}

impl<D: Device + ?Sized> Drop for DeviceHandle<'_, D> {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Frame loops
// ---------------------------------------------------------------------------

/// Read `frame_count` full frames from `handle` and append them to `buffer`.
///
/// Blocks until every frame has arrived; partial frames are never appended.
///
/// # Errors
///
/// - [`DeviceError::InvalidState`] — the buffer's format differs from the
///   handle's, or the handle is closed.
/// - [`DeviceError::Io`] — the buffer's format is unset, or the device
///   failed or returned a wrong-sized frame.
pub fn capture_into<D: CaptureDevice + ?Sized>(
    buffer: &mut AudioBuffer,
    handle: &mut DeviceHandle<'_, D>,
    frame_count: usize,
) -> Result<(), DeviceError> {
    let format = buffer.format();
    if !format.is_valid() {
        return Err(DeviceError::Io(format!("buffer format is unset: {format:?}")));
    }
    if handle.format() != format || handle.frame_samples() != buffer.frame_samples() {
        return Err(DeviceError::InvalidState(format!(
            "buffer expects {format} × {} but device streams {} × {}",
            buffer.frame_samples(),
            handle.format(),
            handle.frame_samples()
        )));
    }

    let frame_bytes = buffer.frame_bytes();
    for i in 0..frame_count {
        let frame = handle.read_frame()?;
        if frame.len() != frame_bytes {
            return Err(DeviceError::Io(format!(
                "short read: got {} bytes, expected {frame_bytes}",
                frame.len()
            )));
        }
        buffer
            .append_frame(frame)
            .map_err(|e| DeviceError::Io(e.to_string()))?;
        log::trace!("capture: frame {}/{frame_count}", i + 1);
    }

    Ok(())
}

/// Write `frames` to `handle` in order.
///
/// Stops at the first zero-length sentinel frame or when the sequence is
/// exhausted, whichever comes first.  Returns the number of frames written.
pub fn play_frames<D, I>(handle: &mut DeviceHandle<'_, D>, frames: I) -> Result<usize, DeviceError>
where
    D: PlaybackDevice + ?Sized,
    I: IntoIterator<Item = Vec<u8>>,
{
    let mut written = 0;
    for frame in frames {
        if frame.is_empty() {
            log::debug!("playback: sentinel frame after {written} frames");
            break;
        }
        handle.write_frame(&frame)?;
        written += 1;
        log::trace!("playback: frame {written}");
    }
    Ok(written)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
