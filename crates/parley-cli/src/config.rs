//! Settings resolution: file, then flags, then validation.

use std::path::Path;

use parley_core::{SessionSettings, validate_settings};

use crate::error::CliError;
use crate::parser::Cli;

/// Read a JSON settings file. Missing fields take their defaults.
pub fn load_settings_file(path: &Path) -> Result<SessionSettings, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::Io(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|e| CliError::Config(format!("{}: {e}", path.display())))
}

/// Build the session settings for this invocation.
pub fn resolve_settings(cli: &Cli) -> Result<SessionSettings, CliError> {
    let mut settings = match &cli.config {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading settings file");
            load_settings_file(path)?
        }
        None => SessionSettings::with_defaults(),
    };

    if let Some(url) = &cli.server_url {
        settings.server_url.clone_from(url);
    }
    if let Some(mode) = cli.capture_mode {
        settings.capture_mode = mode;
    }
    if let Some(attempts) = cli.max_reconnect_attempts {
        settings.max_reconnect_attempts = Some(attempts);
    }

    validate_settings(&settings)?;
    Ok(settings)
}
