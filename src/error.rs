use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use thiserror::Error;

use crate::data_models::ErrorBody;

/// Raised by the upload limiter when a streamed body outgrows its cap.
#[derive(Debug, Error)]
#[error("request body exceeds the {limit}-byte limit")]
pub struct BodyLimitExceeded {
    pub limit: usize,
}

/// Every way a gateway route can fail. All variants render as
/// `{"error": ...}`; only the status code differs.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The backend answered with a non-success status.
    #[error("{message}")]
    Upstream { status: StatusCode, message: String },

    /// The backend could not be reached or the exchange broke mid-flight.
    #[error("{0}")]
    Transport(String),

    /// The backend answered with a success status but a body that is not JSON.
    #[error("backend returned a malformed body: {0}")]
    MalformedBody(String),

    #[error("request body exceeds the {limit}-byte limit")]
    PayloadTooLarge { limit: usize },

    /// The inbound request was refused before anything was forwarded.
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
}

impl GatewayError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        GatewayError::Rejected {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Upstream { status, .. } | GatewayError::Rejected { status, .. } => {
                *status
            }
            GatewayError::Transport(_) | GatewayError::MalformedBody(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Builds a backend failure from its raw reply body.
    pub fn upstream(status: StatusCode, body: &str) -> Self {
        GatewayError::Upstream {
            status,
            message: upstream_message(status, body),
        }
    }

    /// Classifies a `reqwest` failure. The backend URL is stripped so
    /// internal addresses never reach the browser.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if let Some(exceeded) = find_source::<BodyLimitExceeded>(&err) {
            return GatewayError::PayloadTooLarge {
                limit: exceeded.limit,
            };
        }
        if err.is_timeout() {
            return GatewayError::Transport(
                "backend did not respond within the configured timeout".to_string(),
            );
        }

        let err = err.without_url();
        let mut message = err.to_string();
        if let Some(root) = root_cause(&err) {
            let root = root.to_string();
            if !message.contains(&root) {
                message = format!("{message}: {root}");
            }
        }
        GatewayError::Transport(message)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            GatewayError::Upstream { .. } | GatewayError::Rejected { .. } => {
                tracing::warn!(status = status.as_u16(), error = %self, "request failed");
            }
            GatewayError::PayloadTooLarge { limit } => {
                tracing::warn!(limit, "request body over limit");
            }
            GatewayError::Transport(_) | GatewayError::MalformedBody(_) => {
                tracing::error!(status = status.as_u16(), error = %self, "backend unreachable or broken");
            }
        }
        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

/// Pulls a human-readable message out of a backend error body: the `error`
/// (or `message`) string of a JSON object, otherwise the raw text.
pub fn upstream_message(status: StatusCode, body: &str) -> String {
    if body.trim().is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("backend request failed")
            .to_string();
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => ["error", "message"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        Ok(Value::String(text)) => text,
        _ => body.to_string(),
    }
}

fn find_source<'a, T: StdError + 'static>(err: &'a (dyn StdError + 'static)) -> Option<&'a T> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(found) = e.downcast_ref::<T>() {
            return Some(found);
        }
        current = e.source();
    }
    None
}

fn root_cause<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a (dyn StdError + 'static)> {
    let mut current = err.source()?;
    while let Some(next) = current.source() {
        current = next;
    }
    Some(current)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Backend,
    Protocol,
    Validation,
}

/// Failure surfaced by [`crate::client::ApiClient`].
#[derive(Debug, Clone, Error)]
pub enum RequestFailure {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("API error ({status}): {message}")]
    Backend { status: StatusCode, message: String },

    #[error("unexpected response: {message}")]
    Protocol { message: String },

    #[error("invalid request: {message}")]
    Validation { message: String },
}

impl RequestFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            RequestFailure::Network { .. } => FailureKind::Network,
            RequestFailure::Backend { .. } => FailureKind::Backend,
            RequestFailure::Protocol { .. } => FailureKind::Protocol,
            RequestFailure::Validation { .. } => FailureKind::Validation,
        }
    }

    /// Status code the backend answered with, for backend failures.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RequestFailure::Backend { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            RequestFailure::Network { message }
            | RequestFailure::Backend { message, .. }
            | RequestFailure::Protocol { message }
            | RequestFailure::Validation { message } => message,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        RequestFailure::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn network(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else {
            let err = err.without_url();
            match root_cause(&err) {
                Some(root) => format!("{err}: {root}"),
                None => err.to_string(),
            }
        };
        RequestFailure::Network { message }
    }

    /// Interprets a non-success reply: the `error` field of a uniform error
    /// body, any other JSON verbatim, or the raw text.
    pub(crate) fn backend(status: StatusCode, body: &[u8]) -> Self {
        let text = String::from_utf8_lossy(body);
        let message = match serde_json::from_slice::<ErrorBody>(body) {
            Ok(parsed) => parsed.error,
            Err(_) => text.into_owned(),
        };
        RequestFailure::Backend { status, message }
    }

    pub(crate) fn protocol(err: serde_json::Error) -> Self {
        RequestFailure::Protocol {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_message_prefers_error_field() {
        let msg = upstream_message(StatusCode::NOT_FOUND, r#"{"error":"not found"}"#);
        assert_eq!(msg, "not found");

        let msg = upstream_message(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"title is required","code":42}"#,
        );
        assert_eq!(msg, "title is required");
    }

    #[test]
    fn test_upstream_message_falls_back_to_raw_text() {
        assert_eq!(
            upstream_message(StatusCode::BAD_GATEWAY, "upstream exploded\n"),
            "upstream exploded\n"
        );
        assert_eq!(
            upstream_message(StatusCode::CONFLICT, r#"{"code":42}"#),
            r#"{"code":42}"#
        );
        assert_eq!(
            upstream_message(StatusCode::SERVICE_UNAVAILABLE, ""),
            "Service Unavailable"
        );
    }

    #[test]
    fn test_gateway_error_statuses() {
        assert_eq!(
            GatewayError::upstream(StatusCode::NOT_FOUND, "gone").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::Transport("connection refused".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::PayloadTooLarge { limit: 10 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            GatewayError::bad_request("query cannot be empty").to_string(),
            "query cannot be empty"
        );
    }

    #[test]
    fn test_find_source_walks_the_chain() {
        #[derive(Debug, Error)]
        #[error("outer")]
        struct Outer(#[source] BodyLimitExceeded);

        let err = Outer(BodyLimitExceeded { limit: 7 });
        let found = find_source::<BodyLimitExceeded>(&err).unwrap();
        assert_eq!(found.limit, 7);
        assert_eq!(root_cause(&err).unwrap().to_string(), "request body exceeds the 7-byte limit");
    }

    #[test]
    fn test_request_failure_backend_parsing() {
        let failure = RequestFailure::backend(StatusCode::NOT_FOUND, br#"{"error":"not found"}"#);
        assert_eq!(failure.kind(), FailureKind::Backend);
        assert_eq!(failure.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(failure.message(), "not found");
        assert_eq!(failure.to_string(), "API error (404 Not Found): not found");

        let failure = RequestFailure::backend(StatusCode::BAD_GATEWAY, b"bad gateway");
        assert_eq!(failure.message(), "bad gateway");
    }
}
