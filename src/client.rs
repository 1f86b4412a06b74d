//! Web service client authenticated with the OAuth2 client-credentials grant.
//!
//! The client acquires a bearer token on first use, attaches it to every
//! request and, when the service reports the token as expired, authenticates
//! again and replays the request exactly once.

use std::time::Duration;

use log::{debug, warn};
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::{AccessToken, Credentials, TokenHolder, TokenState};
use crate::classify::{ErrorPayload, describe};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::http::{
    Body, CookieSession, HttpTransport, RequestOptions, Transport, TransportRequest,
    TransportResponse,
};

/// Path of the token endpoint, relative to the base URL.
pub const TOKEN_ENDPOINT: &str = "token";

/// A call against a resource endpoint, replayable for the expired-token retry.
#[derive(Debug, Clone)]
pub struct EndpointRequest {
    pub method: Method,
    /// Path relative to the base URL; surrounding `/` are ignored.
    pub endpoint: String,
    pub body: Body,
    pub headers: HeaderMap,
    pub options: RequestOptions,
}

impl EndpointRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            body: Body::Empty,
            headers: HeaderMap::new(),
            options: RequestOptions::default(),
        }
    }

    /// `GET endpoint` without a body.
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    /// `POST endpoint` with `body`.
    pub fn post(endpoint: impl Into<String>, body: impl Into<Body>) -> Self {
        Self::new(Method::POST, endpoint).body(body)
    }

    /// `PUT endpoint` with `body`.
    pub fn put(endpoint: impl Into<String>, body: impl Into<Body>) -> Self {
        Self::new(Method::PUT, endpoint).body(body)
    }

    /// `DELETE endpoint` without a body.
    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    /// Replaces the payload.
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Adds a header. `Authorization` is always replaced by the bearer token.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Total timeout for this call only.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// The endpoint as used in URLs and diagnostics.
    pub fn path(&self) -> &str {
        self.endpoint.trim_matches('/')
    }
}

#[derive(Deserialize)]
struct TokenGrant {
    access_token: String,
}

/// Authenticated web service client.
///
/// Holds at most one token. Safe to share between tasks: token
/// acquisition is serialized, resource calls are not.
pub struct AuthenticatedClient<T: Transport = HttpTransport> {
    transport: T,
    base_url: String,
    credentials: Credentials,
    token: TokenHolder,
}

impl AuthenticatedClient<HttpTransport> {
    /// Validates `config` and builds the HTTP transport. No network call is made.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(&config, transport)
    }

    /// Cookies kept by this client's session.
    pub fn session(&self) -> &CookieSession {
        self.transport.session()
    }
}

impl<T: Transport> AuthenticatedClient<T> {
    /// Validates `config` and uses `transport` for every call.
    pub fn with_transport(config: &ClientConfig, transport: T) -> Result<Self, ClientError> {
        config.validate()?;
        let credentials = Credentials::new(&config.client_id, &config.client_secret)?;
        debug!(
            "Client {} configured for {}",
            credentials.client_id(),
            config.base_url
        );

        Ok(Self {
            transport,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            token: TokenHolder::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Snapshot of the token lifecycle.
    pub async fn token_state(&self) -> TokenState {
        self.token.state().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.current().await.is_some()
    }

    /// Requests a new token and replaces the held one.
    #[tracing::instrument(skip(self))]
    pub async fn authenticate(&self) -> Result<(), ClientError> {
        self.token.refresh(|| self.fetch_token()).await.map(|_| ())
    }

    /// Drops the held token; the next request authenticates again.
    pub async fn logout(&self) {
        self.token.clear().await;
    }

    /// `GET endpoint`, returning the decoded body.
    pub async fn get(&self, endpoint: &str) -> Result<Option<Value>, ClientError> {
        self.request(EndpointRequest::get(endpoint)).await
    }

    /// Raw bodies are sent as-is, field lists as `multipart/form-data`.
    pub async fn post(
        &self,
        endpoint: &str,
        body: impl Into<Body>,
    ) -> Result<Option<Value>, ClientError> {
        self.request(EndpointRequest::post(endpoint, body)).await
    }

    pub async fn put(
        &self,
        endpoint: &str,
        body: impl Into<Body>,
    ) -> Result<Option<Value>, ClientError> {
        self.request(EndpointRequest::put(endpoint, body)).await
    }

    /// `DELETE endpoint`, returning the decoded body if any.
    pub async fn delete(&self, endpoint: &str) -> Result<Option<Value>, ClientError> {
        self.request(EndpointRequest::delete(endpoint)).await
    }

    /// Executes `request`, authenticating first if needed.
    ///
    /// A rejection caused by an expired token triggers one new
    /// authentication and one replay; every other rejection is a
    /// [`ClientError::Request`] carrying the classified message.
    #[tracing::instrument(skip(self, request), fields(method = %request.method, endpoint = %request.path()))]
    pub async fn request(&self, request: EndpointRequest) -> Result<Option<Value>, ClientError> {
        let token = self.token.get_or_acquire(|| self.fetch_token()).await?;

        let response = self.dispatch(&request, &token).await?;
        if !response.is_rejected() {
            return Ok(response.body);
        }

        if !ErrorPayload::from_body(response.body.as_ref()).is_token_expired() {
            return Err(self.rejection(&request, &response));
        }

        warn!(
            "Access token {} rejected on {} {}, authenticating again",
            token.masked(),
            request.method,
            request.path()
        );
        self.token.invalidate(&token).await;
        let token = self.token.get_or_acquire(|| self.fetch_token()).await?;

        let retried = self.dispatch(&request, &token).await?;
        if !retried.is_rejected() {
            return Ok(retried.body);
        }

        match ErrorPayload::from_body(retried.body.as_ref()) {
            ErrorPayload::OAuth { description, .. } => Err(ClientError::Request(description)),
            _ => Err(self.rejection(&request, &retried)),
        }
    }

    /// One attempt of `request` with `token`.
    async fn dispatch(
        &self,
        request: &EndpointRequest,
        token: &AccessToken,
    ) -> Result<TransportResponse, ClientError> {
        let url = format!("{}/{}", self.base_url, request.path());
        let transport_request = TransportRequest::new(request.method.clone(), url)
            .headers(request.headers.clone())
            .header(AUTHORIZATION, token.authorization()?)
            .body(request.body.clone())
            .options(request.options);

        let response = self.transport.execute(transport_request).await?;
        debug!(
            "{} {} answered {}",
            request.method,
            request.path(),
            response.status
        );
        Ok(response)
    }

    fn rejection(&self, request: &EndpointRequest, response: &TransportResponse) -> ClientError {
        ClientError::Request(describe(
            response.status,
            response.body.as_ref(),
            request.path(),
            &request.method,
        ))
    }

    /// Client-credentials grant against the token endpoint.
    async fn fetch_token(&self) -> Result<AccessToken, ClientError> {
        let url = format!("{}/{}", self.base_url, TOKEN_ENDPOINT);
        debug!(
            "Requesting access token for {} from {}...",
            self.credentials.client_id(),
            url
        );

        let request = TransportRequest::new(Method::POST, url)
            .header(AUTHORIZATION, self.credentials.authorization())
            .body(Body::Json(json!({"grant_type": "client_credentials"})));

        let response = self.transport.execute(request).await?;
        let body = response.body.as_ref();

        if let ErrorPayload::OAuth { description, .. } = ErrorPayload::from_body(body) {
            return Err(ClientError::Authentication(description));
        }

        if response.is_rejected() {
            return Err(ClientError::Authentication(describe(
                response.status,
                body,
                TOKEN_ENDPOINT,
                &Method::POST,
            )));
        }

        match body.and_then(|b| TokenGrant::deserialize(b).ok()) {
            Some(grant) if !grant.access_token.is_empty() => {
                Ok(AccessToken::new(grant.access_token))
            }
            _ => Err(ClientError::Authentication(
                "Authentication failed".to_string(),
            )),
        }
    }
}
