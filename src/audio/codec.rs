//! WAV container encoding and decoding.
//!
//! The container is a RIFF/WAVE file holding integer PCM: the header carries
//! channel count, sample width and sample rate, followed by the interleaved
//! little-endian payload.  It is the hand-off format between pipeline stages
//! and between processes.
//!
//! Decoding re-chunks the payload into frames of a caller-chosen size, so a
//! buffer survives the round trip when the same size is passed back in:
//!
//! ```rust
//! use voice_query::audio::{codec, AudioBuffer, AudioFormat};
//!
//! let buf = AudioBuffer::from_pcm(AudioFormat::new(1, 2, 16_000), 4, &[1u8; 20]).unwrap();
//! let wav = codec::encode(&buf).unwrap();
//! assert_eq!(codec::decode(&wav, buf.frame_samples()).unwrap(), buf);
//! ```

use std::io::Cursor;

use thiserror::Error;

use super::format::{AudioBuffer, AudioFormat};

// ---------------------------------------------------------------------------
// CodecError
// ---------------------------------------------------------------------------

/// Errors from [`encode`] and [`decode`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The buffer cannot be serialised.
    #[error("encode failed: {0}")]
    Encode(String),

    /// The bytes are not a well-formed integer PCM container.
    #[error("decode failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// encode
// ---------------------------------------------------------------------------

/// Serialise `buffer` into a WAV container.
///
/// Deterministic: the same buffer always yields the same bytes.
///
/// # Errors
///
/// [`CodecError::Encode`] when the buffer has no frames, its format has a
/// zero field, or the sample width is not 1–4 bytes.
pub fn encode(buffer: &AudioBuffer) -> Result<Vec<u8>, CodecError> {
    let format = buffer.format();
    if buffer.is_empty() {
        return Err(CodecError::Encode("audio buffer is empty".into()));
    }
    if !format.is_valid() {
        return Err(CodecError::Encode(format!("invalid audio format: {format:?}")));
    }
    check_width(format.sample_width).map_err(CodecError::Encode)?;

    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: format.sample_width * 8,
        sample_format: hound::SampleFormat::Int,
    };

    let enc = |e: hound::Error| CodecError::Encode(e.to_string());
    let width = format.sample_width as usize;

    let mut cursor = Cursor::new(Vec::with_capacity(44 + buffer.payload_len()));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(enc)?;
        for frame in buffer.frames() {
            for sample in frame.chunks_exact(width) {
                match width {
                    // 8-bit WAV is unsigned on disk; hound stores i8 offset by 128.
                    1 => writer.write_sample(sample[0].wrapping_sub(0x80) as i8),
                    2 => writer.write_sample(i16::from_le_bytes([sample[0], sample[1]])),
                    3 => writer.write_sample(i24_from_le(sample[0], sample[1], sample[2])),
                    _ => writer.write_sample(i32::from_le_bytes([
                        sample[0], sample[1], sample[2], sample[3],
                    ])),
                }
                .map_err(enc)?;
            }
        }
        writer.finalize().map_err(enc)?;
    }

    Ok(cursor.into_inner())
}

// ---------------------------------------------------------------------------
// decode
// ---------------------------------------------------------------------------

/// Parse a WAV container and split its payload into frames of
/// `frame_samples` sample blocks (the last frame may be shorter).
///
/// # Errors
///
/// [`CodecError::Decode`] on a malformed header, a non-integer sample
/// format, a truncated payload, an empty payload, or `frame_samples == 0`.
pub fn decode(bytes: &[u8], frame_samples: usize) -> Result<AudioBuffer, CodecError> {
    if frame_samples == 0 {
        return Err(CodecError::Decode("frame size must be positive".into()));
    }

    let dec = |e: hound::Error| CodecError::Decode(e.to_string());
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).map_err(dec)?;
    let spec = reader.spec();

    if spec.sample_format != hound::SampleFormat::Int {
        return Err(CodecError::Decode("floating-point samples are not PCM".into()));
    }
    if spec.bits_per_sample % 8 != 0 {
        return Err(CodecError::Decode(format!(
            "unsupported bit depth {}",
            spec.bits_per_sample
        )));
    }
    let format = AudioFormat::new(spec.channels, spec.bits_per_sample / 8, spec.sample_rate);
    if !format.is_valid() {
        return Err(CodecError::Decode(format!("invalid header: {format:?}")));
    }
    check_width(format.sample_width).map_err(CodecError::Decode)?;

    let width = format.sample_width as usize;
    let mut pcm = Vec::with_capacity(reader.len() as usize * width);
    for sample in reader.samples::<i32>() {
        let sample = sample.map_err(|e| CodecError::Decode(format!("truncated payload: {e}")))?;
        let le = sample.to_le_bytes();
        match width {
            1 => pcm.push((sample as i8 as u8).wrapping_add(0x80)),
            _ => pcm.extend_from_slice(&le[..width]),
        }
    }

    if pcm.is_empty() {
        return Err(CodecError::Decode("container has no payload".into()));
    }
    if pcm.len() % format.block_align() != 0 {
        return Err(CodecError::Decode(format!(
            "truncated payload: {} bytes is not a multiple of {}",
            pcm.len(),
            format.block_align()
        )));
    }

    AudioBuffer::from_pcm(format, frame_samples, &pcm).map_err(|e| CodecError::Decode(e.to_string()))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_width(width: u16) -> Result<(), String> {
    if (1..=4).contains(&width) {
        Ok(())
    } else {
        Err(format!("unsupported sample width {width} bytes"))
    }
}

fn i24_from_le(b0: u8, b1: u8, b2: u8) -> i32 {
    let sign = if b2 & 0x80 != 0 { 0xff } else { 0x00 };
    i32::from_le_bytes([b0, b1, b2, sign])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
