//! Client credentials and the bearer token lifecycle.

use std::fmt;
use std::future::Future;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::debug;
use reqwest::header::HeaderValue;
use tokio::sync::Mutex;

use crate::error::ClientError;

/// Client id and secret, kept only as the Basic authorization value.
#[derive(Clone)]
pub struct Credentials {
    client_id: String,
    basic: HeaderValue,
}

impl Credentials {
    pub fn new(client_id: &str, client_secret: &str) -> Result<Self, ClientError> {
        let encoded = STANDARD.encode(format!("{}:{}", client_id, client_secret));
        let mut basic = HeaderValue::from_str(&format!("Basic {}", encoded)).map_err(|e| {
            ClientError::Configuration(format!("Invalid client credentials: {}", e))
        })?;
        basic.set_sensitive(true);

        Ok(Self {
            client_id: client_id.to_string(),
            basic,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// `Authorization: Basic base64(id:secret)`.
    pub fn authorization(&self) -> HeaderValue {
        self.basic.clone()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Opaque bearer token issued by the token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First characters only, for logs.
    pub fn masked(&self) -> String {
        let prefix: String = self.0.chars().take(4).collect();
        format!("{}***", prefix)
    }

    /// `Authorization: Bearer <token>`.
    pub fn authorization(&self) -> Result<HeaderValue, ClientError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.0)).map_err(|_| {
            ClientError::Authentication("Access token is not a valid header value".to_string())
        })?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccessToken").field(&self.masked()).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Unauthenticated,
    /// A token call is in flight.
    Authenticating,
    Authenticated(AccessToken),
}

/// The single token held by a client.
///
/// Acquisition keeps the lock for the whole token call, so concurrent
/// callers wait for one refresh instead of racing each other.
pub struct TokenHolder {
    state: Mutex<TokenState>,
}

impl TokenHolder {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TokenState::Unauthenticated),
        }
    }

    /// Current state; an abandoned acquisition reads as `Unauthenticated`.
    pub async fn state(&self) -> TokenState {
        self.state.lock().await.clone()
    }

    /// The held token, if any. Never starts a token call.
    pub async fn current(&self) -> Option<AccessToken> {
        match &*self.state.lock().await {
            TokenState::Authenticated(token) => Some(token.clone()),
            _ => None,
        }
    }

    /// Returns the held token, running `acquire` only when there is none.
    pub async fn get_or_acquire<F, Fut>(&self, acquire: F) -> Result<AccessToken, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken, ClientError>>,
    {
        let mut state = self.state.lock().await;
        if let TokenState::Authenticated(token) = &*state {
            return Ok(token.clone());
        }
        // Authenticating here means an earlier acquisition was cancelled.
        Self::acquire_locked(&mut state, acquire).await
    }

    /// Runs `acquire` unconditionally and replaces the held token.
    pub async fn refresh<F, Fut>(&self, acquire: F) -> Result<AccessToken, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken, ClientError>>,
    {
        let mut state = self.state.lock().await;
        Self::acquire_locked(&mut state, acquire).await
    }

    async fn acquire_locked<F, Fut>(
        state: &mut TokenState,
        acquire: F,
    ) -> Result<AccessToken, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken, ClientError>>,
    {
        *state = TokenState::Authenticating;
        match acquire().await {
            Ok(token) => {
                debug!("Stored access token {}", token.masked());
                *state = TokenState::Authenticated(token.clone());
                Ok(token)
            }
            Err(e) => {
                *state = TokenState::Unauthenticated;
                Err(e)
            }
        }
    }

    /// Drops the held token if it is still `stale`.
    ///
    /// Returns false when another caller already replaced it.
    pub async fn invalidate(&self, stale: &AccessToken) -> bool {
        let mut state = self.state.lock().await;
        match &*state {
            TokenState::Authenticated(token) if token == stale => {
                debug!("Clearing access token {}", stale.masked());
                *state = TokenState::Unauthenticated;
                true
            }
            _ => false,
        }
    }

    /// Forgets the held token unconditionally.
    pub async fn clear(&self) {
        *self.state.lock().await = TokenState::Unauthenticated;
    }
}

impl Default for TokenHolder {
    fn default() -> Self {
        Self::new()
    }
}
