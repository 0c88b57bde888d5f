//! WAV + base64 payloads carried in JSON frames.
//!
//! Captured speech goes up as 16-bit mono PCM in a minimal WAV container;
//! synthesized speech comes back as base64 WAV, sometimes wrapped in a
//! `data:audio/wav;base64,` URI.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::VoiceError;

/// Decoded PCM ready for an output device.
///
/// Samples are shared so an interrupted clip can be resumed without copying.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    /// Interleaved f32 samples in `-1.0..=1.0`.
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioClip {
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    /// Playback length.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        #[allow(clippy::cast_precision_loss)]
        let secs = self.frames() as f64 / f64::from(self.sample_rate);
        Duration::from_secs_f64(secs)
    }

    /// Index of the first interleaved sample at `offset` into the clip.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn sample_offset(&self, offset: Duration) -> usize {
        let frame = (offset.as_secs_f64() * f64::from(self.sample_rate)) as usize;
        (frame * usize::from(self.channels)).min(self.samples.len())
    }
}

/// Encode mono f32 samples as a base64 16-bit PCM WAV.
pub fn encode_wav_base64(samples: &[f32], sample_rate: u32) -> Result<String, VoiceError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| VoiceError::EncodeError(e.to_string()))?;
        for &sample in samples {
            writer
                .write_sample(pcm16(sample))
                .map_err(|e| VoiceError::EncodeError(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| VoiceError::EncodeError(e.to_string()))?;
    }

    Ok(BASE64.encode(cursor.into_inner()))
}

/// Asymmetric float → i16 conversion: negative full scale maps to -32768,
/// positive to 32767.
#[allow(clippy::cast_possible_truncation)]
fn pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32_768.0) as i16
    } else {
        (s * 32_767.0) as i16
    }
}

/// Decode a base64 WAV payload (bare or `data:` URI) into a clip.
pub fn decode_wav_base64(payload: &str) -> Result<AudioClip, VoiceError> {
    let encoded = strip_data_uri(payload.trim());
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| VoiceError::DecodeError(format!("invalid base64: {e}")))?;
    decode_wav_bytes(&bytes)
}

/// Decode WAV bytes into interleaved f32 samples.
pub fn decode_wav_bytes(bytes: &[u8]) -> Result<AudioClip, VoiceError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    read_clip(reader)
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn read_clip<R: std::io::Read>(
    mut reader: hound::WavReader<R>,
) -> Result<AudioClip, VoiceError> {
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << spec.bits_per_sample.saturating_sub(1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    if samples.is_empty() {
        return Err(VoiceError::DecodeError("WAV contains no samples".to_string()));
    }

    Ok(AudioClip::new(samples, spec.sample_rate, spec.channels))
}

fn strip_data_uri(payload: &str) -> &str {
    if payload.starts_with("data:") {
        if let Some((_, rest)) = payload.split_once(',') {
            return rest;
        }
    }
    payload
}
