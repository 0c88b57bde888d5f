//! Microphone input via `cpal`.
//!
//! Captures from the default input device, downmixes to mono and resamples
//! to the session rate before handing blocks to the gate.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use tokio::sync::mpsc::UnboundedSender;

use crate::audio_io::AudioSource;
use crate::error::VoiceError;
use crate::resample::{FrameResampler, downmix_to_mono};

/// Default input device as an [`AudioSource`].
///
/// The device is acquired on [`open`](AudioSource::open) and released when
/// the stream is dropped on [`close`](AudioSource::close).
pub struct LocalMicrophone {
    /// Session sample rate the gate expects.
    target_rate: u32,

    /// The active cpal input stream (None when closed).
    stream: Option<Stream>,
}

impl LocalMicrophone {
    pub const fn new(target_rate: u32) -> Self {
        Self {
            target_rate,
            stream: None,
        }
    }

    /// Names of the available input devices.
    pub fn list_devices() -> Result<Vec<String>, VoiceError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| VoiceError::InputStreamError(e.to_string()))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    fn build_input_stream(
        &self,
        device: &Device,
        config: &cpal::SupportedStreamConfig,
        frames: UnboundedSender<Vec<f32>>,
    ) -> Result<Stream, VoiceError> {
        let stream_config: StreamConfig = config.clone().into();
        let sample_format = config.sample_format();
        let channels = stream_config.channels;

        let resampler = Arc::new(Mutex::new(FrameResampler::new(
            stream_config.sample_rate.0,
            self.target_rate,
        )?));

        // Runs on the audio thread: convert, forward, never block for long.
        let forward = move |interleaved: &[f32]| {
            let mono = downmix_to_mono(interleaved, channels);
            let Ok(mut resampler) = resampler.lock() else {
                return;
            };
            match resampler.process(&mono) {
                Ok(block) if !block.is_empty() => {
                    let _ = frames.send(block);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Dropping microphone block"),
            }
        };

        let err_fn = |err: cpal::StreamError| {
            tracing::error!(%err, "Audio input stream error");
        };

        let stream = match sample_format {
            SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| forward(data),
                err_fn,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let float_data: Vec<f32> =
                        data.iter().map(|&s| f32::from(s) / 32_768.0).collect();
                    forward(&float_data);
                },
                err_fn,
                None,
            ),
            SampleFormat::I32 => device.build_input_stream(
                &stream_config,
                move |data: &[i32], _: &cpal::InputCallbackInfo| {
                    #[allow(clippy::cast_precision_loss)]
                    let float_data: Vec<f32> =
                        data.iter().map(|&s| s as f32 / 2_147_483_648.0).collect();
                    forward(&float_data);
                },
                err_fn,
                None,
            ),
            _ => {
                return Err(VoiceError::InputStreamError(format!(
                    "Unsupported sample format: {sample_format:?}"
                )));
            }
        };

        stream.map_err(|e| VoiceError::InputStreamError(e.to_string()))
    }
}

impl AudioSource for LocalMicrophone {
    fn open(&mut self, frames: UnboundedSender<Vec<f32>>) -> Result<(), VoiceError> {
        if self.stream.is_some() {
            return Err(VoiceError::AlreadyActive);
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(VoiceError::NoInputDevice)?;
        let config = device
            .default_input_config()
            .map_err(|e| VoiceError::InputStreamError(e.to_string()))?;

        tracing::info!(
            device = %device.name().unwrap_or_default(),
            sample_rate = config.sample_rate().0,
            channels = config.channels(),
            target_rate = self.target_rate,
            "Microphone opened"
        );

        let stream = self.build_input_stream(&device, &config, frames)?;
        stream
            .play()
            .map_err(|e| VoiceError::InputStreamError(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("Microphone released");
        }
    }
}
