//! `SynthesisService` trait and the HTTP implementation.

use std::borrow::Cow;
use std::io::Cursor;

use async_trait::async_trait;
use thiserror::Error;

use crate::audio::{codec, float_to_pcm16, AudioBuffer, AudioFormat};
use crate::config::TtsConfig;

/// Frame size used when the caller does not pick one.
const DEFAULT_FRAME_SAMPLES: usize = 2048;

// ---------------------------------------------------------------------------
// TtsError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum TtsError {
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("speech endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("speech request timed out")]
    Timeout,

    /// Nothing to say.
    #[error("cannot synthesize empty text")]
    EmptyText,

    /// The response was not audio this crate can play.
    #[error("unsupported synthesized audio: {0}")]
    UnsupportedAudio(String),
}

impl From<reqwest::Error> for TtsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TtsError::Timeout
        } else {
            TtsError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// SynthesizedSpeech
// ---------------------------------------------------------------------------

/// Audio produced by a synthesis backend at its native rate.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedSpeech {
    pub buffer: AudioBuffer,
    pub sample_rate_hz: u32,
}

impl SynthesizedSpeech {
    pub fn new(buffer: AudioBuffer) -> Self {
        let sample_rate_hz = buffer.format().sample_rate;
        Self {
            buffer,
            sample_rate_hz,
        }
    }
}

// ---------------------------------------------------------------------------
// SynthesisService trait
// ---------------------------------------------------------------------------

/// Converts answer text into speech.
///
/// `voice_id` selects a backend voice; `None` means the backend default.
#[async_trait]
pub trait SynthesisService: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: Option<&str>,
    ) -> Result<SynthesizedSpeech, TtsError>;
}

// ---------------------------------------------------------------------------
// WAV response handling
// ---------------------------------------------------------------------------

/// Size written by servers that stream WAV before the length is known.
const STREAMED_SIZE: u32 = u32::MAX;

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Replace placeholder RIFF and `data` sizes with the real ones.
///
/// The `data` chunk is taken to run to the end of the body, trimmed to a
/// whole number of sample blocks.  Bodies with real sizes are returned
/// untouched.
fn fix_streamed_header(bytes: &[u8]) -> Cow<'_, [u8]> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Cow::Borrowed(bytes);
    }

    let mut block_align = 1usize;
    let mut pos = 12;
    while let Some(size) = read_u32(bytes, pos + 4) {
        let id = &bytes[pos..pos + 4];
        let body = pos + 8;

        if id == b"fmt " {
            if let Some(b) = bytes.get(body + 12..body + 14) {
                block_align = usize::from(u16::from_le_bytes([b[0], b[1]])).max(1);
            }
        } else if id == b"data" {
            let remaining = bytes.len() - body;
            if size != STREAMED_SIZE && size as usize <= remaining {
                return Cow::Borrowed(bytes);
            }
            let data_len = remaining - remaining % block_align;
            let mut fixed = bytes[..body + data_len].to_vec();
            fixed[pos + 4..pos + 8].copy_from_slice(&(data_len as u32).to_le_bytes());
            let riff_len = (fixed.len() - 8) as u32;
            fixed[4..8].copy_from_slice(&riff_len.to_le_bytes());
            log::debug!("tts: streamed WAV header, {data_len} bytes of audio");
            return Cow::Owned(fixed);
        }

        if size == STREAMED_SIZE {
            break;
        }
        pos = body + size as usize + (size as usize & 1);
    }
    Cow::Borrowed(bytes)
}

/// Turn a WAV response body into [`SynthesizedSpeech`].
///
/// Streamed bodies with placeholder sizes are repaired first.  Integer PCM
/// goes through [`codec::decode`].  32-bit float PCM, which neural vocoders
/// commonly emit, is converted to 16-bit with [`float_to_pcm16`].
pub fn speech_from_wav(bytes: &[u8], frame_samples: usize) -> Result<SynthesizedSpeech, TtsError> {
    let bytes = fix_streamed_header(bytes);
    let bytes = bytes.as_ref();
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| TtsError::UnsupportedAudio(e.to_string()))?;
    let spec = reader.spec();

    if spec.sample_format == hound::SampleFormat::Float {
        if spec.bits_per_sample != 32 {
            return Err(TtsError::UnsupportedAudio(format!(
                "{}-bit float samples",
                spec.bits_per_sample
            )));
        }
        let samples = reader
            .into_samples::<f32>()
            .collect::<Result<Vec<f32>, _>>()
            .map_err(|e| TtsError::UnsupportedAudio(e.to_string()))?;
        if samples.is_empty() {
            return Err(TtsError::UnsupportedAudio("no samples".into()));
        }
        let format = AudioFormat::new(spec.channels, 2, spec.sample_rate);
        let buffer = AudioBuffer::from_pcm(format, frame_samples, &float_to_pcm16(&samples))
            .map_err(|e| TtsError::UnsupportedAudio(e.to_string()))?;
        log::debug!("tts: converted {} float samples to 16-bit", samples.len());
        return Ok(SynthesizedSpeech::new(buffer));
    }

    let buffer =
        codec::decode(bytes, frame_samples).map_err(|e| TtsError::UnsupportedAudio(e.to_string()))?;
    Ok(SynthesizedSpeech::new(buffer))
}

// ---------------------------------------------------------------------------
// ApiSynthesizer
// ---------------------------------------------------------------------------

#[derive(serde::Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// Calls `{base_url}/v1/audio/speech` and requests a WAV body.
pub struct ApiSynthesizer {
    client: reqwest::Client,
    config: TtsConfig,
    frame_samples: usize,
}

impl ApiSynthesizer {
    pub fn from_config(config: &TtsConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
            frame_samples: DEFAULT_FRAME_SAMPLES,
        }
    }

    /// Chunk size of the returned buffer's frames.
    pub fn with_frame_samples(mut self, frame_samples: usize) -> Self {
        self.frame_samples = frame_samples.max(1);
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/audio/speech",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl SynthesisService for ApiSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: Option<&str>,
    ) -> Result<SynthesizedSpeech, TtsError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TtsError::EmptyText);
        }

        let voice = voice_id.unwrap_or(&self.config.voice);
        let request = SpeechRequest {
            model: &self.config.model,
            input: text,
            voice,
            response_format: "wav",
        };

        let url = self.endpoint();
        log::debug!("tts: POST {url} (voice {voice})");

        let mut req = self.client.post(&url).json(&request);
        let key = self.config.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TtsError::Status { status, body });
        }

        let audio = response.bytes().await?;
        speech_from_wav(&audio, self.frame_samples)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn float_wav(samples: &[f32], rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut w = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                w.write_sample(s).unwrap();
            }
            w.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn integer_wav_is_decoded_as_is() {
        let format = AudioFormat::new(1, 2, 22_050);
        let buf = AudioBuffer::from_pcm(format, 4, &[7u8; 24]).unwrap();
        let wav = codec::encode(&buf).unwrap();

        let speech = speech_from_wav(&wav, 4).unwrap();
        assert_eq!(speech.sample_rate_hz, 22_050);
        assert_eq!(speech.buffer, buf);
    }

    #[test]
    fn float_wav_is_converted_to_16_bit() {
        let wav = float_wav(&[0.0, 0.5, -1.0, 1.0], 22_050);
        let speech = speech_from_wav(&wav, 2).unwrap();

        assert_eq!(speech.buffer.format(), AudioFormat::new(1, 2, 22_050));
        assert_eq!(speech.buffer.frame_count(), 2);
        let pcm = speech.buffer.to_pcm();
        let values: Vec<i16> = pcm
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(values, vec![0, 16_384, i16::MIN, i16::MAX]);
    }

    /// Overwrite the RIFF and `data` sizes the way a streaming server does.
    fn as_streamed(mut wav: Vec<u8>) -> Vec<u8> {
        let data = wav.windows(4).position(|w| w == b"data").unwrap();
        wav[4..8].copy_from_slice(&[0xff; 4]);
        wav[data + 4..data + 8].copy_from_slice(&[0xff; 4]);
        wav
    }

    #[test]
    fn streamed_wav_sizes_are_repaired() {
        let format = AudioFormat::new(1, 2, 24_000);
        let buf = AudioBuffer::from_pcm(format, 4, &[3u8; 40]).unwrap();
        let wav = as_streamed(codec::encode(&buf).unwrap());
        assert!(codec::decode(&wav, 4).is_err());

        let speech = speech_from_wav(&wav, 4).unwrap();
        assert_eq!(speech.sample_rate_hz, 24_000);
        assert_eq!(speech.buffer, buf);
    }

    #[test]
    fn streamed_wav_drops_partial_sample_block() {
        let format = AudioFormat::new(1, 2, 24_000);
        let buf = AudioBuffer::from_pcm(format, 4, &[3u8; 16]).unwrap();
        let mut wav = as_streamed(codec::encode(&buf).unwrap());
        wav.push(0x7f);

        let speech = speech_from_wav(&wav, 4).unwrap();
        assert_eq!(speech.buffer, buf);
    }

    #[test]
    fn streamed_float_wav_is_repaired_too() {
        let wav = as_streamed(float_wav(&[0.5, -0.5], 22_050));
        let speech = speech_from_wav(&wav, 2).unwrap();
        assert_eq!(speech.buffer.frame_count(), 1);
        assert_eq!(speech.buffer.payload_len(), 4);
    }

    #[test]
    fn complete_wav_is_left_untouched() {
        let buf = AudioBuffer::from_pcm(AudioFormat::new(1, 2, 16_000), 4, &[1u8; 8]).unwrap();
        let wav = codec::encode(&buf).unwrap();
        assert!(matches!(fix_streamed_header(&wav), Cow::Borrowed(_)));
    }

    #[test]
    fn empty_float_wav_is_unsupported() {
        let wav = float_wav(&[], 22_050);
        assert!(matches!(
            speech_from_wav(&wav, 2),
            Err(TtsError::UnsupportedAudio(_))
        ));
    }

    #[test]
    fn non_wav_body_is_unsupported() {
        assert!(matches!(
            speech_from_wav(b"ID3\x04mp3 data", 2048),
            Err(TtsError::UnsupportedAudio(_))
        ));
    }

    #[tokio::test]
    async fn empty_text_fails_before_any_request() {
        let tts = ApiSynthesizer::from_config(&TtsConfig {
            base_url: "http://127.0.0.1:9".into(),
            ..TtsConfig::default()
        });
        assert!(matches!(
            tts.synthesize("  ", None).await,
            Err(TtsError::EmptyText)
        ));
    }

    #[test]
    fn request_serialises_wav_format() {
        let req = SpeechRequest {
            model: "tts-1",
            input: "it is sunny",
            voice: "alloy",
            response_format: "wav",
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["response_format"], "wav");
        assert_eq!(json["input"], "it is sunny");
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let tts = ApiSynthesizer::from_config(&TtsConfig {
            base_url: "http://localhost:8880/".into(),
            ..TtsConfig::default()
        });
        assert_eq!(tts.endpoint(), "http://localhost:8880/v1/audio/speech");
    }
}
