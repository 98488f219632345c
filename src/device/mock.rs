//! In-memory test doubles for [`CaptureDevice`] and [`PlaybackDevice`].
//!
//! Each mock shares its state with a [`MockProbe`] so a test can keep
//! observing the device after it has been boxed and moved into the
//! orchestrator.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::audio::AudioFormat;

use super::{CaptureDevice, Device, DeviceError, Direction, PlaybackDevice};

#[derive(Debug, Default)]
struct MockState {
    is_open: bool,
    open_count: usize,
    close_count: usize,
    opened_format: Option<AudioFormat>,
    frames_read: usize,
    written: Vec<Vec<u8>>,
}

/// Read-only view onto a mock device's state.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockProbe(Arc<Mutex<MockState>>);

impl MockProbe {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap()
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open
    }

    pub fn open_count(&self) -> usize {
        self.state().open_count
    }

    pub fn close_count(&self) -> usize {
        self.state().close_count
    }

    pub fn opened_format(&self) -> Option<AudioFormat> {
        self.state().opened_format
    }

    pub fn frames_read(&self) -> usize {
        self.state().frames_read
    }

    pub fn frames_written(&self) -> usize {
        self.state().written.len()
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state().written.clone()
    }
}

fn open_shared(
    probe: &MockProbe,
    supported: AudioFormat,
    format: &AudioFormat,
) -> Result<(), DeviceError> {
    if *format != supported {
        return Err(DeviceError::Unavailable(format!(
            "mock supports only {supported}, asked for {format}"
        )));
    }
    let mut st = probe.state();
    if st.is_open {
        return Err(DeviceError::InvalidState("already open".into()));
    }
    st.is_open = true;
    st.open_count += 1;
    st.opened_format = Some(*format);
    Ok(())
}

fn close_shared(probe: &MockProbe) {
    let mut st = probe.state();
    if st.is_open {
        st.is_open = false;
        st.close_count += 1;
    }
}

// ---------------------------------------------------------------------------
// MockCapture
// ---------------------------------------------------------------------------

/// Microphone stand-in producing frames of a ramp pattern.
pub(crate) struct MockCapture {
    supported: AudioFormat,
    probe: MockProbe,
    frame_bytes: usize,
    frame_len_override: Option<usize>,
    fail_after: Option<usize>,
}

impl MockCapture {
    /// A device that can only be opened at `supported`.
    pub fn new(supported: AudioFormat) -> Self {
        Self {
            supported,
            probe: MockProbe::default(),
            frame_bytes: 0,
            frame_len_override: None,
            fail_after: None,
        }
    }

    /// Fail every read after the first `n` frames.
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Return frames of `len` bytes regardless of the negotiated size.
    pub fn with_frame_len(mut self, len: usize) -> Self {
        self.frame_len_override = Some(len);
        self
    }

    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }
}

impl Device for MockCapture {
    fn direction(&self) -> Direction {
        Direction::Capture
    }

    fn open(&mut self, format: &AudioFormat, frame_samples: usize) -> Result<(), DeviceError> {
        open_shared(&self.probe, self.supported, format)?;
        self.frame_bytes = frame_samples * format.block_align();
        Ok(())
    }

    fn close(&mut self) {
        close_shared(&self.probe);
    }
}

impl CaptureDevice for MockCapture {
    fn read_frame(&mut self) -> Result<Vec<u8>, DeviceError> {
        let mut st = self.probe.state();
        if !st.is_open {
            return Err(DeviceError::InvalidState("mock capture is closed".into()));
        }
        if self.fail_after.is_some_and(|n| st.frames_read >= n) {
            return Err(DeviceError::Io("mock capture failure".into()));
        }
        let len = self.frame_len_override.unwrap_or(self.frame_bytes);
        let seed = st.frames_read;
        st.frames_read += 1;
        Ok((0..len).map(|i| ((seed + i) % 251) as u8).collect())
    }
}

// ---------------------------------------------------------------------------
// MockPlayback
// ---------------------------------------------------------------------------

/// Speaker stand-in recording every frame written.
pub(crate) struct MockPlayback {
    supported: AudioFormat,
    probe: MockProbe,
    fail_after: Option<usize>,
}

impl MockPlayback {
    /// A device that can only be opened at `supported`.
    pub fn new(supported: AudioFormat) -> Self {
        Self {
            supported,
            probe: MockProbe::default(),
            fail_after: None,
        }
    }

    /// Fail every write after the first `n` frames.
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }
}

impl Device for MockPlayback {
    fn direction(&self) -> Direction {
        Direction::Playback
    }

    fn open(&mut self, format: &AudioFormat, _frame_samples: usize) -> Result<(), DeviceError> {
        open_shared(&self.probe, self.supported, format)
    }

    fn close(&mut self) {
        close_shared(&self.probe);
    }
}

impl PlaybackDevice for MockPlayback {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), DeviceError> {
        let mut st = self.probe.state();
        if !st.is_open {
            return Err(DeviceError::InvalidState("mock playback is closed".into()));
        }
        if self.fail_after.is_some_and(|n| st.written.len() >= n) {
            return Err(DeviceError::Io("mock playback failure".into()));
        }
        st.written.push(frame.to_vec());
        Ok(())
    }
}
