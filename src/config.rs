//! Construction-time settings for a client.

use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::error::ClientError;

/// Connect timeout applied when none is configured.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Total per-transfer timeout applied when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const MISSING_PARAMETERS: &str = "Host, client id and client secret are required";

/// Settings fixed for the lifetime of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// PEM file holding the certificate the web service is trusted with.
    pub certificate: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub timeout: Duration,
}

impl ClientConfig {
    /// Configuration for a service reachable at `base_url` (e.g. `https://ws.example.org`).
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            certificate: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Configuration for a plain-HTTP service known only by host and port.
    ///
    /// The host is given without protocol (`127.0.0.1`, `ws.example.org/`).
    pub fn from_host(
        host: &str,
        port: Option<u16>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        let host = host.trim_matches('/');
        let base_url = if host.is_empty() {
            String::new()
        } else {
            match port {
                Some(port) => format!("http://{}:{}", host, port),
                None => format!("http://{}", host),
            }
        };
        Self::new(base_url, client_id, client_secret)
    }

    /// Trusts the certificate in the PEM file at `path` in addition to the system roots.
    pub fn with_certificate(mut self, path: impl AsRef<Path>) -> Self {
        self.certificate = Some(path.as_ref().to_path_buf());
        self
    }

    /// Overrides [`DEFAULT_CONNECT_TIMEOUT`].
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Overrides [`DEFAULT_TIMEOUT`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks the settings without touching the network.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.base_url.trim().is_empty()
            || self.client_id.is_empty()
            || self.client_secret.is_empty()
        {
            return Err(ClientError::Configuration(MISSING_PARAMETERS.to_string()));
        }

        let url = Url::parse(&self.base_url).map_err(|e| {
            ClientError::Configuration(format!("Invalid base URL '{}': {}", self.base_url, e))
        })?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(ClientError::Configuration(format!(
                    "Unsupported scheme '{}' in base URL '{}'",
                    scheme, self.base_url
                )));
            }
        }

        if url.host_str().is_none() {
            return Err(ClientError::Configuration(format!(
                "Base URL '{}' has no host",
                self.base_url
            )));
        }

        Ok(())
    }
}
