//! Speaker output via `rodio`.

use std::time::Duration;

use rodio::{OutputStream, OutputStreamHandle, Sink};

use crate::audio_io::AudioSink;
use crate::codec::AudioClip;
use crate::error::VoiceError;

/// Default output device as an [`AudioSink`].
pub struct LocalSpeaker {
    /// rodio output stream (must be kept alive).
    _stream: OutputStream,

    /// Handle used to create sinks.
    stream_handle: OutputStreamHandle,

    /// Sink for the clip currently playing.
    sink: Option<Sink>,
}

impl LocalSpeaker {
    /// Open the default output device.
    pub fn new() -> Result<Self, VoiceError> {
        let (stream, stream_handle) = OutputStream::try_default().map_err(|e| match e {
            rodio::StreamError::NoDevice => VoiceError::NoOutputDevice,
            other => VoiceError::OutputStreamError(other.to_string()),
        })?;

        tracing::info!("Speaker opened on default output device");

        Ok(Self {
            _stream: stream,
            stream_handle,
            sink: None,
        })
    }
}

impl AudioSink for LocalSpeaker {
    fn start(&mut self, clip: &AudioClip, offset: Duration) -> Result<(), VoiceError> {
        self.stop();

        let sink = Sink::try_new(&self.stream_handle)
            .map_err(|e| VoiceError::OutputStreamError(e.to_string()))?;

        let skip = clip.sample_offset(offset).min(clip.samples.len());
        let source = rodio::buffer::SamplesBuffer::new(
            clip.channels,
            clip.sample_rate,
            clip.samples[skip..].to_vec(),
        );
        sink.append(source);

        tracing::debug!(
            sample_rate = clip.sample_rate,
            offset_ms = offset.as_millis(),
            "Speaker playback started"
        );
        self.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }
}
