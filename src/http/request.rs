//! Values exchanged with a [`Transport`](super::Transport).

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde_json::Value;

/// Payload sent with a request.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Body {
    #[default]
    Empty,
    /// Sent as-is; the caller picks the content type.
    Raw(String),
    /// Serialized JSON, `Content-Type: application/json` unless overridden.
    Json(Value),
    /// Key/value fields sent as `multipart/form-data`.
    Form(Vec<(String, String)>),
}

impl Body {
    /// Form body from any list of key/value pairs.
    pub fn form<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Body::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<&str> for Body {
    fn from(raw: &str) -> Self {
        Body::Raw(raw.to_string())
    }
}

impl From<String> for Body {
    fn from(raw: String) -> Self {
        Body::Raw(raw)
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Json(value)
    }
}

impl<K: Into<String>, V: Into<String>> From<Vec<(K, V)>> for Body {
    fn from(fields: Vec<(K, V)>) -> Self {
        Body::form(fields)
    }
}

/// Per-call transport overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestOptions {
    /// Total timeout for this call, replacing the client-wide one.
    pub timeout: Option<Duration>,
}

/// One HTTP call, fully resolved.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Body,
    pub options: RequestOptions,
}

impl TransportRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Body::Empty,
            options: RequestOptions::default(),
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

/// What came back from a transfer that reached the server.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: StatusCode,
    /// Decoded JSON body; `None` when the body was empty or not JSON.
    pub body: Option<Value>,
}

impl TransportResponse {
    pub fn new(status: StatusCode, body: Option<Value>) -> Self {
        Self { status, body }
    }

    /// Transferred successfully but refused by the server (status >= 400).
    pub fn is_rejected(&self) -> bool {
        self.status.as_u16() >= 400
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::AUTHORIZATION;
    use serde_json::json;

    #[test]
    fn test_body_conversions() {
        assert_eq!(Body::from("raw"), Body::Raw("raw".to_string()));
        assert_eq!(
            Body::from(json!({"title": "x"})),
            Body::Json(json!({"title": "x"}))
        );
        assert_eq!(
            Body::from(vec![("title", "x")]),
            Body::Form(vec![("title".to_string(), "x".to_string())])
        );
        assert_eq!(Body::default(), Body::Empty);
    }

    #[test]
    fn test_is_rejected_boundary() {
        assert!(!TransportResponse::new(StatusCode::OK, None).is_rejected());
        assert!(!TransportResponse::new(StatusCode::FOUND, None).is_rejected());
        assert!(TransportResponse::new(StatusCode::BAD_REQUEST, None).is_rejected());
        assert!(TransportResponse::new(StatusCode::INTERNAL_SERVER_ERROR, None).is_rejected());
    }

    #[test]
    fn test_request_builder() {
        let request = TransportRequest::new(Method::PUT, "http://localhost/videos/1")
            .header(AUTHORIZATION, HeaderValue::from_static("Bearer abc"))
            .body(Body::from("payload"))
            .options(RequestOptions {
                timeout: Some(Duration::from_secs(2)),
            });

        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.headers[AUTHORIZATION], "Bearer abc");
        assert_eq!(request.body, Body::Raw("payload".to_string()));
        assert_eq!(request.options.timeout, Some(Duration::from_secs(2)));
    }
}
