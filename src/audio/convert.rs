//! Sample conversions between raw PCM bytes and `f32` signals.
//!
//! Whisper wants **16 kHz mono `f32`**; synthesis backends may hand back
//! floating-point audio that has to become integer PCM before playback.
//!
//! 1. [`pcm_to_f32`] — little-endian integer PCM bytes → `f32` in `[-1, 1)`.
//! 2. [`stereo_to_mono`] — downmix interleaved channels by averaging.
//! 3. [`resample_to_16k`] — linear-interpolation resampling to 16 000 Hz.
//! 4. [`float_to_pcm16`] — `f32` signal → 16-bit little-endian PCM bytes.

use super::format::AudioFormat;

// ---------------------------------------------------------------------------
// pcm_to_f32
// ---------------------------------------------------------------------------

/// Decode interleaved PCM bytes of `format` into normalised `f32` samples.
///
/// 8-bit PCM is unsigned (centred on 128); wider widths are signed.  A
/// trailing partial sample is ignored.  Unsupported widths yield an empty
/// vector.
///
/// ```rust
/// use voice_query::audio::{pcm_to_f32, AudioFormat};
///
/// let pcm = [0x00, 0x40, 0x00, 0xc0]; // +16384, -16384
/// let out = pcm_to_f32(&pcm, &AudioFormat::new(1, 2, 16_000));
/// assert_eq!(out, vec![0.5, -0.5]);
/// ```
pub fn pcm_to_f32(pcm: &[u8], format: &AudioFormat) -> Vec<f32> {
    let width = format.sample_width as usize;
    match width {
        1 => pcm.iter().map(|&b| (f32::from(b) - 128.0) / 128.0).collect(),
        2 => pcm
            .chunks_exact(2)
            .map(|s| f32::from(i16::from_le_bytes([s[0], s[1]])) / 32_768.0)
            .collect(),
        3 => pcm
            .chunks_exact(3)
            .map(|s| {
                let sign = if s[2] & 0x80 != 0 { 0xff } else { 0x00 };
                i32::from_le_bytes([s[0], s[1], s[2], sign]) as f32 / 8_388_608.0
            })
            .collect(),
        4 => pcm
            .chunks_exact(4)
            .map(|s| i32::from_le_bytes([s[0], s[1], s[2], s[3]]) as f32 / 2_147_483_648.0)
            .collect(),
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// float_to_pcm16
// ---------------------------------------------------------------------------

/// Convert an `f32` signal to 16-bit little-endian PCM.
///
/// Samples are scaled by 32 768 and clipped to the `i16` range, so `1.0`
/// maps to `32767` and `-1.0` to `-32768`.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (f64::from(s) * 32_768.0).clamp(-32_768.0, 32_767.0) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// * `channels == 1` returns the input unchanged.
/// * `channels == 0` returns an empty vector.
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample_to_16k
// ---------------------------------------------------------------------------

/// Resample `samples` from `source_rate` Hz to 16 000 Hz using linear
/// interpolation.
///
/// Output length is `ceil(samples.len() * 16_000 / source_rate)`.
pub fn resample_to_16k(samples: &[f32], source_rate: u32) -> Vec<f32> {
    const TARGET_RATE: u32 = 16_000;

    if source_rate == TARGET_RATE || source_rate == 0 {
        return samples.to_vec();
    }
    if samples.is_empty() {
        return Vec::new();
    }

    let ratio = f64::from(TARGET_RATE) / f64::from(source_rate);
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm8_is_unsigned() {
        let out = pcm_to_f32(&[128, 0, 192], &AudioFormat::new(1, 1, 8_000));
        assert_eq!(out, vec![0.0, -1.0, 0.5]);
    }

    #[test]
    fn pcm24_sign_extends() {
        // -1 in 24-bit two's complement
        let out = pcm_to_f32(&[0xff, 0xff, 0xff], &AudioFormat::new(1, 3, 48_000));
        assert_eq!(out.len(), 1);
        assert!(out[0] < 0.0 && out[0] > -1e-6);
    }

    #[test]
    fn pcm_unsupported_width_is_empty() {
        assert!(pcm_to_f32(&[0; 10], &AudioFormat::new(1, 5, 8_000)).is_empty());
    }

    #[test]
    fn float_to_pcm16_scales_and_clips() {
        let pcm = float_to_pcm16(&[0.0, 0.5, 1.0, -1.0, 2.0, -2.0]);
        let values: Vec<i16> = pcm
            .chunks_exact(2)
            .map(|s| i16::from_le_bytes([s[0], s[1]]))
            .collect();
        assert_eq!(values, vec![0, 16_384, 32_767, -32_768, 32_767, -32_768]);
    }

    #[test]
    fn float_pcm_float_is_close() {
        let signal = [0.1_f32, -0.3, 0.75];
        let pcm = float_to_pcm16(&signal);
        let back = pcm_to_f32(&pcm, &AudioFormat::new(1, 2, 22_050));
        for (a, b) in signal.iter().zip(&back) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn stereo_to_mono_two_channel() {
        let out = stereo_to_mono(&[1.0, -1.0, 0.5, 0.5], 2);
        assert_eq!(out.len(), 2);
        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn stereo_to_mono_edge_channel_counts() {
        assert_eq!(stereo_to_mono(&[0.1, 0.2], 1), vec![0.1, 0.2]);
        assert!(stereo_to_mono(&[0.1, 0.2], 0).is_empty());
    }

    #[test]
    fn resample_already_16k_is_noop() {
        let input: Vec<f32> = (0..160).map(|i| i as f32 / 160.0).collect();
        assert_eq!(resample_to_16k(&input, 16_000), input);
    }

    #[test]
    fn resample_48k_to_16k_output_length() {
        assert_eq!(resample_to_16k(&vec![0.5_f32; 480], 48_000).len(), 160);
    }

    #[test]
    fn resample_22050_preserves_dc_level() {
        let out = resample_to_16k(&vec![0.25_f32; 2_205], 22_050);
        assert!(out.len().abs_diff(1_600) <= 1);
        assert!(out.iter().all(|s| (s - 0.25).abs() < 1e-5));
    }
}
