//! HTTP transport: a single call against the network, independent of authentication.

mod request;
mod session;
mod transport;

pub use request::{Body, RequestOptions, TransportRequest, TransportResponse};
pub use session::CookieSession;
pub use transport::{HttpTransport, Transport, decode_body};

#[cfg(test)]
pub use transport::MockTransport;
