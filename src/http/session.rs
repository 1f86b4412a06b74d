//! Session-scoped cookie store.

use std::sync::Arc;

use log::debug;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use url::Url;

/// Cookies kept for the lifetime of one transport.
///
/// The jar is created with the transport and released with it; nothing is
/// written to disk.
pub struct CookieSession {
    jar: Arc<Jar>,
}

impl CookieSession {
    pub fn new() -> Self {
        debug!("Opening cookie session");
        Self {
            jar: Arc::new(Jar::default()),
        }
    }

    /// Shared handle given to the HTTP client.
    pub fn jar(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }

    /// The `Cookie` header value that would be sent to `url`, if any.
    pub fn cookies_for(&self, url: &Url) -> Option<HeaderValue> {
        self.jar.cookies(url)
    }
}

impl Default for CookieSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CookieSession {
    fn drop(&mut self) {
        debug!("Releasing cookie session");
    }
}
