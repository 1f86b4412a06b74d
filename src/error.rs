//! Error kinds surfaced by the client.

use thiserror::Error;

/// The transfer never produced an HTTP status (connection refused, DNS
/// failure, TLS handshake failure, timeout).
#[derive(Debug, Error)]
#[error("Can't reach the server ({message})")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<reqwest::Error>,
}

impl TransportError {
    /// For [`Transport`](crate::http::Transport) implementations that fail without a reqwest error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        let message = if error.is_timeout() {
            format!("timed out: {}", error)
        } else if error.is_connect() {
            format!("connection failed: {}", error)
        } else {
            error.to_string()
        };
        Self {
            message,
            source: Some(error),
        }
    }
}

/// Every failure the client reports to its caller.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid or missing construction parameters. Raised before any network call.
    #[error("{0}")]
    Configuration(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The token endpoint was reached but refused the credentials or sent
    /// back something that is not a token.
    #[error("{0}")]
    Authentication(String),

    /// A resource endpoint answered with a status >= 400.
    #[error("{0}")]
    Request(String),
}

impl ClientError {
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, ClientError::Authentication(_))
    }

    pub fn is_request(&self) -> bool {
        matches!(self, ClientError::Request(_))
    }
}
