//! Audio device selection for the session.

use parley_core::SessionSettings;
use parley_voice::{AudioSink, AudioSource, EnergyClassifier, SpeechClassifier, WavFileSource};

use crate::error::CliError;
use crate::parser::Cli;

/// Pick the microphone and speaker for this run.
///
/// `--input-wav` replaces the microphone. Without the `local-audio` feature
/// there is no microphone, so a WAV file is required and output is discarded.
pub fn open_devices(
    cli: &Cli,
    settings: &SessionSettings,
) -> Result<(Box<dyn AudioSource>, Box<dyn AudioSink>), CliError> {
    let source = open_source(cli, settings)?;
    let sink = open_sink()?;
    Ok((source, sink))
}

fn open_source(cli: &Cli, settings: &SessionSettings) -> Result<Box<dyn AudioSource>, CliError> {
    if let Some(path) = &cli.input_wav {
        tracing::info!(path = %path.display(), "Using WAV file as microphone");
        let source = WavFileSource::open_file(path, settings.sample_rate)?;
        return Ok(Box::new(source));
    }

    #[cfg(feature = "local-audio")]
    {
        Ok(Box::new(parley_voice::LocalMicrophone::new(settings.sample_rate)))
    }

    #[cfg(not(feature = "local-audio"))]
    {
        Err(CliError::Arguments(
            "no microphone support in this build; pass --input-wav or rebuild with --features local-audio"
                .to_string(),
        ))
    }
}

/// Pick the speech classifier: Silero when a model is given, energy otherwise.
pub fn open_classifier(
    cli: &Cli,
    settings: &SessionSettings,
) -> Result<Box<dyn SpeechClassifier>, CliError> {
    let Some(path) = &cli.vad_model else {
        tracing::debug!("Using energy-based speech detection");
        return Ok(Box::new(EnergyClassifier::default()));
    };

    #[cfg(feature = "silero")]
    {
        let classifier =
            parley_voice::SileroClassifier::load(path, &settings.vad, settings.sample_rate)?;
        Ok(Box::new(classifier))
    }

    #[cfg(not(feature = "silero"))]
    {
        let _ = settings;
        Err(CliError::Arguments(format!(
            "--vad-model {} needs a build with --features silero",
            path.display()
        )))
    }
}

#[cfg(feature = "local-audio")]
fn open_sink() -> Result<Box<dyn AudioSink>, CliError> {
    Ok(Box::new(parley_voice::LocalSpeaker::new()?))
}

#[cfg(not(feature = "local-audio"))]
#[allow(clippy::unnecessary_wraps)]
fn open_sink() -> Result<Box<dyn AudioSink>, CliError> {
    tracing::info!("No speaker support in this build, discarding assistant audio");
    Ok(Box::new(parley_voice::NullSink::new()))
}
