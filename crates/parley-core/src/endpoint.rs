//! Session identity and the connection URL derived from it.

use std::fmt;

use thiserror::Error;
use url::Url;

/// Bearer credential presented when opening the connection.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for building the connection URL.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Where and as whom a session connects.
#[derive(Debug, Clone)]
pub struct SessionEndpoint {
    server_url: Url,
    session_id: String,
    credential: Credential,
}

/// Errors building a [`SessionEndpoint`].
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("Invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported URL scheme '{0}' (expected ws or wss)")]
    UnsupportedScheme(String),

    #[error("Server URL cannot carry path segments: {0}")]
    CannotBeABase(String),

    #[error("Session id cannot be empty")]
    EmptySessionId,

    #[error("Credential cannot be empty")]
    EmptyCredential,
}

impl SessionEndpoint {
    pub fn new(
        server_url: &str,
        session_id: impl Into<String>,
        credential: Credential,
    ) -> Result<Self, EndpointError> {
        let server_url = Url::parse(server_url)?;
        if !matches!(server_url.scheme(), "ws" | "wss") {
            return Err(EndpointError::UnsupportedScheme(
                server_url.scheme().to_string(),
            ));
        }
        if server_url.cannot_be_a_base() {
            return Err(EndpointError::CannotBeABase(server_url.to_string()));
        }

        let session_id = session_id.into();
        if session_id.trim().is_empty() {
            return Err(EndpointError::EmptySessionId);
        }
        if credential.expose().trim().is_empty() {
            return Err(EndpointError::EmptyCredential);
        }

        Ok(Self {
            server_url,
            session_id,
            credential,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Connection URL: `{server_url}/{session_id}/message/{token}`.
    pub fn connect_url(&self) -> Url {
        let mut url = self.server_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(&self.session_id)
                .push("message")
                .push(self.credential.expose());
        }
        url
    }

    /// Connection URL with the credential masked, for logs.
    pub fn redacted_url(&self) -> String {
        let mut url = self.server_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(&self.session_id)
                .push("message")
                .push("***");
        }
        url.to_string()
    }
}
