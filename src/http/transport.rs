//! HTTP transport over reqwest.

use std::path::Path;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::Form;
use reqwest::redirect::Policy;
use reqwest::{Certificate, Client};
use serde_json::Value;

use super::request::{Body, TransportRequest, TransportResponse};
use super::session::CookieSession;
use crate::config::ClientConfig;
use crate::error::{ClientError, TransportError};

/// Executes a single HTTP call.
///
/// A response with any status code is a success at this level; only a
/// transfer that never produced a status is an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: TransportRequest)
    -> Result<TransportResponse, TransportError>;
}

/// Transport backed by a reqwest client with its own cookie session.
pub struct HttpTransport {
    client: Client,
    default_headers: HeaderMap,
    session: CookieSession,
}

impl HttpTransport {
    /// Builds the transport from the client-wide settings.
    ///
    /// Reads the trusted certificate, if one is configured. No network call is made.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let session = CookieSession::new();

        let mut builder = Client::builder()
            .user_agent(concat!("wsclient/", env!("CARGO_PKG_VERSION")))
            .cookie_provider(session.jar())
            .redirect(Policy::none())
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout);

        if let Some(path) = &config.certificate {
            builder = builder.add_root_certificate(load_certificate(path)?);
        }

        let client = builder.build().map_err(|e| {
            ClientError::Configuration(format!("Failed to build HTTP client: {}", e))
        })?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Ok(Self {
            client,
            default_headers,
            session,
        })
    }

    pub fn session(&self) -> &CookieSession {
        &self.session
    }

    /// Per-call headers win over the defaults with the same name.
    fn merge_headers(&self, extra: HeaderMap) -> HeaderMap {
        let mut merged = self.default_headers.clone();
        let mut last: Option<HeaderName> = None;
        for (name, value) in extra {
            match name {
                Some(name) => {
                    merged.insert(name.clone(), value);
                    last = Some(name);
                }
                None => {
                    if let Some(name) = &last {
                        merged.append(name.clone(), value);
                    }
                }
            }
        }
        merged
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[tracing::instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn execute(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let TransportRequest {
            method,
            url,
            headers,
            body,
            options,
        } = request;

        debug!("{} {}...", method, url);

        let mut headers = self.merge_headers(headers);
        let mut builder = self.client.request(method, &url);

        builder = match body {
            Body::Empty => builder,
            Body::Raw(raw) => builder.body(raw),
            Body::Json(value) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                builder.body(value.to_string())
            }
            Body::Form(fields) => {
                // reqwest sets the multipart content type with its boundary
                headers.remove(CONTENT_TYPE);
                let form = fields
                    .into_iter()
                    .fold(Form::new(), |form, (name, value)| form.text(name, value));
                builder.multipart(form)
            }
        };

        builder = builder.headers(headers);
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            debug!("Transfer to {} failed: {}", url, e);
            TransportError::from(e)
        })?;

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to read response body from {}: {}", url, e);
                String::new()
            }
        };

        debug!("{} answered {} ({} bytes)", url, status, text.len());

        Ok(TransportResponse::new(status, decode_body(&text)))
    }
}

/// Decodes a JSON body. Empty, `null` and non-JSON bodies decode to `None`.
pub fn decode_body(text: &str) -> Option<Value> {
    parse_body(text).unwrap_or_else(|e| {
        warn!("Response body is not JSON: {}", e);
        None
    })
}

fn parse_body(text: &str) -> serde_json::Result<Option<Value>> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<Value>(text)? {
        Value::Null => Ok(None),
        value => Ok(Some(value)),
    }
}

fn load_certificate(path: &Path) -> Result<Certificate, ClientError> {
    let pem = std::fs::read(path).map_err(|e| {
        ClientError::Configuration(format!(
            "Failed to read certificate {}: {}",
            path.display(),
            e
        ))
    })?;
    Certificate::from_pem(&pem).map_err(|e| {
        ClientError::Configuration(format!(
            "Invalid certificate {}: {}",
            path.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RequestOptions;
    use mockito::Matcher;
    use reqwest::{Method, StatusCode};
    use serde_json::json;
    use std::time::Duration;

    fn transport() -> HttpTransport {
        HttpTransport::new(&ClientConfig::new("http://localhost", "id", "secret")).unwrap()
    }

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body(""), None);
        assert_eq!(decode_body("  \n"), None);
        assert_eq!(decode_body("null"), None);
        assert_eq!(decode_body("<html>Bad gateway</html>"), None);
        assert_eq!(decode_body(r#"{"id":"1"}"#), Some(json!({"id": "1"})));
        assert_eq!(decode_body("[1,2]"), Some(json!([1, 2])));
    }

    #[test]
    fn test_only_malformed_bodies_are_decode_failures() {
        assert!(matches!(parse_body(""), Ok(None)));
        assert!(matches!(parse_body("null"), Ok(None)));
        assert!(parse_body("<html>Bad gateway</html>").is_err());
        assert!(parse_body(r#"{"id": "#).is_err());
    }

    #[test]
    fn test_merge_headers_overrides_defaults() {
        let transport = transport();
        let mut extra = HeaderMap::new();
        extra.insert(ACCEPT, HeaderValue::from_static("text/plain"));
        extra.insert("x-trace", HeaderValue::from_static("1"));

        let merged = transport.merge_headers(extra);
        assert_eq!(merged[ACCEPT], "text/plain");
        assert_eq!(merged["x-trace"], "1");
        assert_eq!(merged.get_all(ACCEPT).iter().count(), 1);
    }

    #[test]
    fn test_merge_headers_keeps_defaults() {
        let merged = transport().merge_headers(HeaderMap::new());
        assert_eq!(merged[ACCEPT], "application/json");
    }

    #[test]
    fn test_missing_certificate_is_configuration_error() {
        let config = ClientConfig::new("https://localhost", "id", "secret")
            .with_certificate("/nonexistent/ws-cert.pem");
        let result = HttpTransport::new(&config);
        assert!(matches!(result, Err(ClientError::Configuration(msg)) if msg.contains("ws-cert.pem")));
    }

    #[test]
    fn test_malformed_certificate_is_configuration_error() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "-----BEGIN CERTIFICATE-----").unwrap();
        writeln!(file, "not base64 at all").unwrap();
        writeln!(file, "-----END CERTIFICATE-----").unwrap();

        let config =
            ClientConfig::new("https://localhost", "id", "secret").with_certificate(file.path());
        let result = HttpTransport::new(&config);
        assert!(matches!(result, Err(ClientError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_execute_get_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/videos/1")
            .match_header("accept", "application/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "1"}"#)
            .create_async()
            .await;

        let response = transport()
            .execute(TransportRequest::new(
                Method::GET,
                format!("{}/videos/1", server.url()),
            ))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, Some(json!({"id": "1"})));
    }

    #[tokio::test]
    async fn test_execute_returns_rejections_with_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/videos/99")
            .with_status(404)
            .create_async()
            .await;

        let response = transport()
            .execute(TransportRequest::new(
                Method::GET,
                format!("{}/videos/99", server.url()),
            ))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(response.is_rejected());
        assert_eq!(response.body, None);
    }

    #[tokio::test]
    async fn test_execute_json_body_sets_content_type() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({"grant_type": "client_credentials"})))
            .with_status(200)
            .with_body(r#"{"access_token": "abc"}"#)
            .create_async()
            .await;

        let response = transport()
            .execute(
                TransportRequest::new(Method::POST, format!("{}/token", server.url()))
                    .body(Body::Json(json!({"grant_type": "client_credentials"}))),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.body, Some(json!({"access_token": "abc"})));
    }

    #[tokio::test]
    async fn test_execute_raw_body_is_sent_verbatim() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/videos/1")
            .match_header("content-type", "text/plain")
            .match_body("title=Demo")
            .with_status(204)
            .create_async()
            .await;

        let response = transport()
            .execute(
                TransportRequest::new(Method::PUT, format!("{}/videos/1", server.url()))
                    .header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
                    .body(Body::from("title=Demo")),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert_eq!(response.body, None);
    }

    #[tokio::test]
    async fn test_execute_form_body_is_multipart() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/videos")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data; boundary=".to_string()),
            )
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="title""#.to_string()),
                Matcher::Regex("Demo video".to_string()),
            ]))
            .with_status(201)
            .with_body(r#"{"id": "2"}"#)
            .create_async()
            .await;

        let response = transport()
            .execute(
                TransportRequest::new(Method::POST, format!("{}/videos", server.url()))
                    .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                    .body(Body::form([("title", "Demo video")])),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_execute_keeps_session_cookies() {
        let mut server = mockito::Server::new_async().await;
        let login = server
            .mock("GET", "/first")
            .with_status(200)
            .with_header("set-cookie", "session=abc; Path=/")
            .create_async()
            .await;
        let follow_up = server
            .mock("GET", "/second")
            .match_header("cookie", "session=abc")
            .with_status(200)
            .create_async()
            .await;

        let transport = transport();
        transport
            .execute(TransportRequest::new(Method::GET, format!("{}/first", server.url())))
            .await
            .unwrap();
        transport
            .execute(TransportRequest::new(Method::GET, format!("{}/second", server.url())))
            .await
            .unwrap();

        login.assert_async().await;
        follow_up.assert_async().await;

        let url = url::Url::parse(&server.url()).unwrap();
        assert!(transport.session().cookies_for(&url).is_some());
    }

    #[tokio::test]
    async fn test_execute_does_not_follow_redirects() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/moved")
            .with_status(302)
            .with_header("location", "/elsewhere")
            .create_async()
            .await;
        let elsewhere = server
            .mock("GET", "/elsewhere")
            .expect(0)
            .create_async()
            .await;

        let response = transport()
            .execute(TransportRequest::new(Method::GET, format!("{}/moved", server.url())))
            .await
            .unwrap();

        mock.assert_async().await;
        elsewhere.assert_async().await;
        assert_eq!(response.status, StatusCode::FOUND);
    }

    #[tokio::test]
    async fn test_execute_connection_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = transport()
            .execute(
                TransportRequest::new(Method::GET, format!("http://127.0.0.1:{}/videos", port))
                    .options(RequestOptions {
                        timeout: Some(Duration::from_secs(2)),
                    }),
            )
            .await;

        let err = result.unwrap_err();
        assert!(err.to_string().starts_with("Can't reach the server"));
    }
}
