//! Sample-rate conversion and channel downmix for captured audio.
//!
//! Devices and WAV files rarely run at the session rate, so everything that
//! feeds the voice-activity gate goes through here first.

use rubato::{FftFixedIn, Resampler as _};

use crate::error::VoiceError;

/// Input block size handed to the FFT resampler.
const CHUNK_SIZE: usize = 1024;

/// Streaming mono resampler.
///
/// Accepts arbitrarily sized blocks and returns whatever output the complete
/// input chunks produced; leftover input waits for the next call. When the
/// rates match, samples pass straight through.
pub struct FrameResampler {
    inner: Option<FftFixedIn<f32>>,
    pending: Vec<f32>,
}

impl FrameResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self, VoiceError> {
        let inner = if from_rate == to_rate {
            None
        } else {
            Some(
                FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, 2, 1)
                    .map_err(|e| VoiceError::ResampleError(e.to_string()))?,
            )
        };
        Ok(Self {
            inner,
            pending: Vec::new(),
        })
    }

    /// Whether this resampler actually converts anything.
    pub const fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    /// Resample one block of mono samples.
    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>, VoiceError> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(samples.to_vec());
        };

        self.pending.extend_from_slice(samples);

        let mut output = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let result = resampler
                .process(&[&self.pending[..needed]], None)
                .map_err(|e| VoiceError::ResampleError(e.to_string()))?;
            if let Some(channel) = result.first() {
                output.extend_from_slice(channel);
            }
            self.pending.drain(..needed);
        }

        Ok(output)
    }
}

/// Resample a whole buffer at once, padding the tail chunk with silence and
/// keeping only the proportional share of its output.
pub fn resample_all(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, VoiceError> {
    if samples.is_empty() || from_rate == to_rate {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, 2, 1)
        .map_err(|e| VoiceError::ResampleError(e.to_string()))?;

    let mut output = Vec::new();
    let mut pos = 0;
    loop {
        let needed = resampler.input_frames_next();
        if pos + needed > samples.len() {
            break;
        }
        let result = resampler
            .process(&[&samples[pos..pos + needed]], None)
            .map_err(|e| VoiceError::ResampleError(e.to_string()))?;
        if let Some(channel) = result.first() {
            output.extend_from_slice(channel);
        }
        pos += needed;
    }

    if pos < samples.len() {
        let remaining = &samples[pos..];
        let mut padded = vec![0.0f32; resampler.input_frames_next()];
        padded[..remaining.len()].copy_from_slice(remaining);

        let result = resampler
            .process(&[&padded], None)
            .map_err(|e| VoiceError::ResampleError(e.to_string()))?;
        if let Some(channel) = result.first() {
            #[allow(
                clippy::cast_precision_loss,
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss
            )]
            let output_len =
                (remaining.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).ceil() as usize;
            output.extend_from_slice(&channel[..output_len.min(channel.len())]);
        }
    }

    Ok(output)
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels = usize::from(channels);
    #[allow(clippy::cast_precision_loss)]
    let scale = 1.0 / channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}
