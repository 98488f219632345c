//! Hardware devices via `cpal`.
//!
//! [`CpalCapture`] and [`CpalPlayback`] negotiate the exact requested format
//! (channels, rate, and an integer sample format matching the width) and
//! refuse anything else.  There is no implicit resampling.
//!
//! `cpal::Stream` is not `Send` on every platform, so each open device runs
//! its stream on a dedicated worker thread.  Audio crosses the thread
//! boundary over `std::sync::mpsc` channels; closing the device signals the
//! worker, which drops the stream and exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio::AudioFormat;

use super::{CaptureDevice, Device, DeviceError, Direction, PlaybackDevice};

/// Frames queued ahead of the output callback before `write_frame` waits.
const PLAYBACK_QUEUE_DEPTH: usize = 4;

// ---------------------------------------------------------------------------
// Sample plumbing
// ---------------------------------------------------------------------------

/// Integer sample types the backend streams, with their little-endian layout.
trait PcmSample: cpal::SizedSample + Send + 'static {
    const WIDTH: usize;
    const SILENCE: Self;
    fn write_le(self, out: &mut Vec<u8>);
    fn read_le(bytes: &[u8]) -> Self;
}

impl PcmSample for u8 {
    const WIDTH: usize = 1;
    const SILENCE: Self = 0x80;
    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self);
    }
    fn read_le(bytes: &[u8]) -> Self {
        bytes[0]
    }
}

impl PcmSample for i16 {
    const WIDTH: usize = 2;
    const SILENCE: Self = 0;
    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
    fn read_le(bytes: &[u8]) -> Self {
        i16::from_le_bytes([bytes[0], bytes[1]])
    }
}

impl PcmSample for i32 {
    const WIDTH: usize = 4;
    const SILENCE: Self = 0;
    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
    fn read_le(bytes: &[u8]) -> Self {
        i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

/// cpal sample format carrying `width`-byte integer samples.
fn sample_format_for(width: u16) -> Result<cpal::SampleFormat, DeviceError> {
    match width {
        1 => Ok(cpal::SampleFormat::U8),
        2 => Ok(cpal::SampleFormat::I16),
        4 => Ok(cpal::SampleFormat::I32),
        w => Err(DeviceError::Unavailable(format!(
            "no native sample format for {w}-byte samples"
        ))),
    }
}

/// Pick the supported range that honours `format` exactly.
fn negotiate(
    mut ranges: impl Iterator<Item = cpal::SupportedStreamConfigRange>,
    format: &AudioFormat,
) -> Result<cpal::StreamConfig, DeviceError> {
    let sample_format = sample_format_for(format.sample_width)?;
    let rate = cpal::SampleRate(format.sample_rate);

    ranges
        .find(|r| {
            r.channels() == format.channels
                && r.sample_format() == sample_format
                && r.min_sample_rate() <= rate
                && rate <= r.max_sample_rate()
        })
        .map(|r| r.with_sample_rate(rate).config())
        .ok_or_else(|| {
            DeviceError::Unavailable(format!("device cannot be configured to {format}"))
        })
}

fn find_device(
    host: &cpal::Host,
    name: Option<&str>,
    direction: Direction,
) -> Result<cpal::Device, DeviceError> {
    let found = match (name, direction) {
        (None, Direction::Capture) => host.default_input_device(),
        (None, Direction::Playback) => host.default_output_device(),
        (Some(wanted), Direction::Capture) => host
            .input_devices()
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?
            .find(|d| d.name().is_ok_and(|n| n == wanted)),
        (Some(wanted), Direction::Playback) => host
            .output_devices()
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?
            .find(|d| d.name().is_ok_and(|n| n == wanted)),
    };

    found.ok_or_else(|| match name {
        Some(wanted) => DeviceError::Unavailable(format!("{direction} device {wanted:?} not found")),
        None => DeviceError::Unavailable(format!("no default {direction} device")),
    })
}

// ---------------------------------------------------------------------------
// StreamWorker
// ---------------------------------------------------------------------------

/// Thread that owns a playing `cpal::Stream` until told to stop.
struct StreamWorker {
    stop_tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl StreamWorker {
    /// Run `build` on a new thread, start the stream, and wait for it to be
    /// playing.  Setup errors are returned here and the thread is joined.
    fn spawn<F>(name: &str, build: F) -> Result<Self, DeviceError>
    where
        F: FnOnce() -> Result<cpal::Stream, DeviceError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), DeviceError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(DeviceError::Unavailable(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Either an explicit stop or the sender being dropped ends the stream.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| DeviceError::Unavailable(format!("failed to spawn {name}: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop_tx,
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(DeviceError::Unavailable(format!("{name} exited during setup")))
            }
        }
    }

    fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("audio worker thread panicked during shutdown");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CpalCapture
// ---------------------------------------------------------------------------

type CaptureMessage = Result<Vec<u8>, String>;

/// Microphone input built on `cpal`.
pub struct CpalCapture {
    device_name: Option<String>,
    read_timeout: Duration,
    worker: Option<StreamWorker>,
    rx: Option<Receiver<CaptureMessage>>,
    pending: Vec<u8>,
    frame_bytes: usize,
}

impl CpalCapture {
    /// `device_name = None` selects the host's default input device.
    /// `read_timeout` bounds how long a single [`read_frame`] may wait for
    /// the hardware.
    ///
    /// [`read_frame`]: CaptureDevice::read_frame
    pub fn new(device_name: Option<String>, read_timeout: Duration) -> Self {
        Self {
            device_name,
            read_timeout,
            worker: None,
            rx: None,
            pending: Vec::new(),
            frame_bytes: 0,
        }
    }
}

fn build_input_stream<T: PcmSample>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    tx: mpsc::Sender<CaptureMessage>,
) -> Result<cpal::Stream, DeviceError> {
    let err_tx = tx.clone();
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mut bytes = Vec::with_capacity(data.len() * T::WIDTH);
                for &sample in data {
                    sample.write_le(&mut bytes);
                }
                // Receiver gone means the device is closing.
                let _ = tx.send(Ok(bytes));
            },
            move |err: cpal::StreamError| {
                log::error!("capture: cpal stream error: {err}");
                let _ = err_tx.send(Err(err.to_string()));
            },
            None,
        )
        .map_err(|e| DeviceError::Unavailable(e.to_string()))
}

impl Device for CpalCapture {
    fn direction(&self) -> Direction {
        Direction::Capture
    }

    fn open(&mut self, format: &AudioFormat, frame_samples: usize) -> Result<(), DeviceError> {
        if self.worker.is_some() {
            return Err(DeviceError::InvalidState("capture device already open".into()));
        }
        sample_format_for(format.sample_width)?;

        let (tx, rx) = mpsc::channel();
        let name = self.device_name.clone();
        let format = *format;

        let worker = StreamWorker::spawn("audio-capture", move || {
            let host = cpal::default_host();
            let device = find_device(&host, name.as_deref(), Direction::Capture)?;
            let ranges = device
                .supported_input_configs()
                .map_err(|e| DeviceError::Unavailable(e.to_string()))?;
            let config = negotiate(ranges, &format)?;
            log::info!(
                "capture: {} at {format}",
                device.name().unwrap_or_else(|_| "<unnamed>".into())
            );
            match format.sample_width {
                1 => build_input_stream::<u8>(&device, &config, tx),
                2 => build_input_stream::<i16>(&device, &config, tx),
                _ => build_input_stream::<i32>(&device, &config, tx),
            }
        })?;

        self.worker = Some(worker);
        self.rx = Some(rx);
        self.pending.clear();
        self.frame_bytes = frame_samples * format.block_align();
        Ok(())
    }

    fn close(&mut self) {
        self.rx = None;
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
        self.pending.clear();
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.close();
    }
}

impl CaptureDevice for CpalCapture {
    fn read_frame(&mut self) -> Result<Vec<u8>, DeviceError> {
        let rx = self
            .rx
            .as_ref()
            .ok_or_else(|| DeviceError::InvalidState("capture device is not open".into()))?;

        while self.pending.len() < self.frame_bytes {
            match rx.recv_timeout(self.read_timeout) {
                Ok(Ok(bytes)) => self.pending.extend_from_slice(&bytes),
                Ok(Err(msg)) => return Err(DeviceError::Io(msg)),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(DeviceError::Io(format!(
                        "no input for {} ms",
                        self.read_timeout.as_millis()
                    )))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(DeviceError::Io("input stream ended".into()))
                }
            }
        }

        let rest = self.pending.split_off(self.frame_bytes);
        Ok(std::mem::replace(&mut self.pending, rest))
    }
}

// ---------------------------------------------------------------------------
// CpalPlayback
// ---------------------------------------------------------------------------

/// Speaker output built on `cpal`.
pub struct CpalPlayback {
    device_name: Option<String>,
    worker: Option<StreamWorker>,
    tx: Option<SyncSender<Vec<u8>>>,
    errors: Option<Receiver<String>>,
    drained: Arc<AtomicBool>,
    drain_timeout: Duration,
}

impl CpalPlayback {
    /// `device_name = None` selects the host's default output device.
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            worker: None,
            tx: None,
            errors: None,
            drained: Arc::new(AtomicBool::new(true)),
            drain_timeout: Duration::ZERO,
        }
    }
}

/// Output-callback side of the frame queue.
struct FrameFeed {
    rx: Receiver<Vec<u8>>,
    current: Vec<u8>,
    pos: usize,
    drained: Arc<AtomicBool>,
}

impl FrameFeed {
    fn fill<T: PcmSample>(&mut self, out: &mut [T]) {
        for slot in out.iter_mut() {
            while self.pos + T::WIDTH > self.current.len() {
                match self.rx.try_recv() {
                    Ok(frame) => {
                        self.current = frame;
                        self.pos = 0;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.drained.store(true, Ordering::Release);
                        break;
                    }
                }
            }
            if self.pos + T::WIDTH <= self.current.len() {
                *slot = T::read_le(&self.current[self.pos..self.pos + T::WIDTH]);
                self.pos += T::WIDTH;
            } else {
                *slot = T::SILENCE;
            }
        }
    }
}

fn build_output_stream<T: PcmSample>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut feed: FrameFeed,
    err_tx: mpsc::Sender<String>,
) -> Result<cpal::Stream, DeviceError> {
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| feed.fill(data),
            move |err: cpal::StreamError| {
                log::error!("playback: cpal stream error: {err}");
                let _ = err_tx.send(err.to_string());
            },
            None,
        )
        .map_err(|e| DeviceError::Unavailable(e.to_string()))
}

impl Device for CpalPlayback {
    fn direction(&self) -> Direction {
        Direction::Playback
    }

    fn open(&mut self, format: &AudioFormat, frame_samples: usize) -> Result<(), DeviceError> {
        if self.worker.is_some() {
            return Err(DeviceError::InvalidState("playback device already open".into()));
        }
        sample_format_for(format.sample_width)?;

        let (tx, rx) = mpsc::sync_channel(PLAYBACK_QUEUE_DEPTH);
        let (err_tx, err_rx) = mpsc::channel();
        let drained = Arc::new(AtomicBool::new(false));
        let feed = FrameFeed {
            rx,
            current: Vec::new(),
            pos: 0,
            drained: Arc::clone(&drained),
        };
        let name = self.device_name.clone();
        let format = *format;

        let worker = StreamWorker::spawn("audio-playback", move || {
            let host = cpal::default_host();
            let device = find_device(&host, name.as_deref(), Direction::Playback)?;
            let ranges = device
                .supported_output_configs()
                .map_err(|e| DeviceError::Unavailable(e.to_string()))?;
            let config = negotiate(ranges, &format)?;
            log::info!(
                "playback: {} at {format}",
                device.name().unwrap_or_else(|_| "<unnamed>".into())
            );
            match format.sample_width {
                1 => build_output_stream::<u8>(&device, &config, feed, err_tx),
                2 => build_output_stream::<i16>(&device, &config, feed, err_tx),
                _ => build_output_stream::<i32>(&device, &config, feed, err_tx),
            }
        })?;

        let frame_secs = frame_samples as f64 / f64::from(format.sample_rate);
        self.drain_timeout =
            Duration::from_secs_f64(frame_secs * (PLAYBACK_QUEUE_DEPTH + 2) as f64)
                + Duration::from_millis(500);
        self.worker = Some(worker);
        self.tx = Some(tx);
        self.errors = Some(err_rx);
        self.drained = drained;
        Ok(())
    }

    fn close(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        // Disconnect the queue and let what is already queued play out.
        self.tx = None;
        let start = Instant::now();
        while !self.drained.load(Ordering::Acquire) {
            if start.elapsed() > self.drain_timeout {
                log::warn!("playback: drain timed out, cutting output");
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        worker.stop();
        self.errors = None;
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.close();
    }
}

/// Queue `frame` for the output callback.
///
/// Retries while the queue is full, checking `errors` between attempts.
/// Fails with [`DeviceError::Io`] when the stream reports an error or the
/// callback has not taken a frame within `timeout`.
fn enqueue_frame(
    tx: &SyncSender<Vec<u8>>,
    errors: &Receiver<String>,
    frame: Vec<u8>,
    timeout: Duration,
) -> Result<(), DeviceError> {
    let start = Instant::now();
    let mut pending = frame;
    loop {
        if let Ok(msg) = errors.try_recv() {
            return Err(DeviceError::Io(msg));
        }
        match tx.try_send(pending) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Disconnected(_)) => {
                return Err(DeviceError::Io("output stream ended".into()))
            }
            Err(TrySendError::Full(back)) => pending = back,
        }
        if start.elapsed() > timeout {
            return Err(DeviceError::Io(format!(
                "output stream stalled for {} ms",
                timeout.as_millis()
            )));
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

impl PlaybackDevice for CpalPlayback {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), DeviceError> {
        let (Some(tx), Some(errors)) = (&self.tx, &self.errors) else {
            return Err(DeviceError::InvalidState("playback device is not open".into()));
        };
        enqueue_frame(tx, errors, frame.to_vec(), self.drain_timeout)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
