//! REST client for web services secured by the OAuth2 client-credentials grant.
//!
//! ```no_run
//! # async fn run() -> Result<(), wsclient::ClientError> {
//! use wsclient::{AuthenticatedClient, Body, ClientConfig};
//!
//! let client = AuthenticatedClient::new(ClientConfig::new(
//!     "https://ws.example.org",
//!     "client-id",
//!     "client-secret",
//! ))?;
//!
//! let _video = client.get("videos/1").await?;
//! client.post("videos", Body::form([("title", "Demo")])).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod http;

pub use auth::{AccessToken, Credentials, TokenState};
pub use client::{AuthenticatedClient, EndpointRequest};
pub use config::ClientConfig;
pub use error::{ClientError, TransportError};
pub use http::{Body, HttpTransport, RequestOptions, Transport};
