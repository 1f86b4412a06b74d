//! Turns rejected responses into human-readable diagnostics.

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;

/// `error_description` values the service uses when the bearer token is no longer valid.
///
/// Matched exactly: a change in the service's wording disables expiry detection.
pub const TOKEN_EXPIRED_DESCRIPTIONS: [&str; 2] =
    ["Token not found or expired", "Token already expired"];

/// Error information carried by a response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorPayload {
    /// `{"error": {"code": .., "module": .., "message": ..}}` from a resource endpoint.
    Service {
        code: String,
        module: String,
        message: Option<String>,
    },
    /// `{"error": "..", "error_description": ".."}` from the OAuth2 layer.
    OAuth { error: String, description: String },
    /// No structured error.
    None,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawErrorBody {
    // Tried first: an `error_description` marks an OAuth error whatever the
    // shape of `error`.
    OAuth {
        error: Value,
        error_description: String,
    },
    Service {
        error: RawServiceError,
    },
}

#[derive(Deserialize)]
struct RawServiceError {
    code: Value,
    module: Value,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct RawServiceBody {
    error: RawServiceError,
}

impl ErrorPayload {
    pub fn from_body(body: Option<&Value>) -> Self {
        let Some(body) = body else {
            return ErrorPayload::None;
        };

        match RawErrorBody::deserialize(body) {
            Ok(RawErrorBody::OAuth {
                error,
                error_description,
            }) if !error.is_null() => ErrorPayload::OAuth {
                error: scalar_to_string(&error),
                description: error_description,
            },
            Ok(RawErrorBody::OAuth { .. }) => ErrorPayload::None,
            Ok(RawErrorBody::Service { error }) => error.into(),
            Err(_) => ErrorPayload::None,
        }
    }

    /// The server reports the bearer token as unknown or expired.
    pub fn is_token_expired(&self) -> bool {
        matches!(
            self,
            ErrorPayload::OAuth { description, .. }
                if TOKEN_EXPIRED_DESCRIPTIONS.contains(&description.as_str())
        )
    }
}

impl From<RawServiceError> for ErrorPayload {
    fn from(error: RawServiceError) -> Self {
        ErrorPayload::Service {
            code: scalar_to_string(&error.code),
            module: scalar_to_string(&error.module),
            message: error.message,
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The structured service error in `body`, even when it also carries an
/// `error_description`.
fn service_error(body: Option<&Value>) -> Option<ErrorPayload> {
    RawServiceBody::deserialize(body?).ok().map(|raw| raw.error.into())
}

/// Describes why `method endpoint` was rejected.
///
/// The status codes 403, 401 and 404 are described without looking at the
/// body; any other status falls back to a structured service error in the
/// body, then to a generic message.
pub fn describe(
    status: StatusCode,
    body: Option<&Value>,
    endpoint: &str,
    method: &Method,
) -> String {
    match status {
        StatusCode::FORBIDDEN => format!("Not authorized to access {} {}", method, endpoint),
        StatusCode::UNAUTHORIZED => "Authentication failed, verify credentials".to_string(),
        StatusCode::NOT_FOUND => format!("Resource {} not found", endpoint),
        _ => match service_error(body) {
            Some(ErrorPayload::Service {
                code,
                module,
                message: Some(message),
            }) => format!("Error: {} (code={}, module={})", message, code, module),
            Some(ErrorPayload::Service {
                code,
                module,
                message: None,
            }) => format!("Error (code={}, module={})", code, module),
            _ => format!("Unknown error (http_code={})", status.as_u16()),
        },
    }
}
