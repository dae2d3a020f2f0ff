use axum::{
    Json,
    body::Body,
    extract::{
        Path, RawQuery, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    response::Response,
};
use serde_json::Value;

use super::SharedState;
use super::routes::{RouteRule, is_dot_segment};
use crate::error::GatewayError;
use crate::upstream::{OutboundBody, UpstreamCall, request_id};

/// Validates a JSON body before it is forwarded.
pub type BodyCheck = fn(&Value) -> Result<(), String>;

pub async fn forward_read(
    rule: &'static RouteRule,
    State(state): State<SharedState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Response, GatewayError> {
    let query = if rule.forwards_query { query } else { None };

    state
        .upstream
        .call(UpstreamCall {
            method: rule.verb.method(),
            segments: rule.upstream_segments(&state.upstream_prefix, None),
            query,
            body: OutboundBody::Empty,
            request_id: request_id(&headers),
        })
        .await
}

pub async fn forward_by_id(
    rule: &'static RouteRule,
    State(state): State<SharedState>,
    headers: HeaderMap,
    id: Result<Path<String>, PathRejection>,
) -> Result<Response, GatewayError> {
    let Path(id) = id.map_err(|rejection| GatewayError::Rejected {
        status: rejection.status(),
        message: rejection.body_text(),
    })?;
    if id.trim().is_empty() {
        return Err(GatewayError::bad_request("document id cannot be empty"));
    }
    if is_dot_segment(&id) {
        return Err(GatewayError::bad_request(format!(
            "{id:?} is not a valid document id"
        )));
    }

    state
        .upstream
        .call(UpstreamCall {
            method: rule.verb.method(),
            segments: rule.upstream_segments(&state.upstream_prefix, Some(&id)),
            query: None,
            body: OutboundBody::Empty,
            request_id: request_id(&headers),
        })
        .await
}

/// Relays a multipart upload without parsing it, so file payloads reach the
/// backend byte-for-byte.
pub async fn forward_upload(
    rule: &'static RouteRule,
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, GatewayError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .filter(|value| is_multipart(value))
        .cloned()
        .ok_or_else(|| GatewayError::Rejected {
            status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
            message: "expected a multipart/form-data body".to_string(),
        })?;

    let limit = state.upstream.limits().max_upload_bytes;
    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    if content_length.is_some_and(|len| len > limit as u64) {
        return Err(GatewayError::PayloadTooLarge { limit });
    }

    state
        .upstream
        .call(UpstreamCall {
            method: rule.verb.method(),
            segments: rule.upstream_segments(&state.upstream_prefix, None),
            query: None,
            body: OutboundBody::Multipart {
                content_type,
                content_length,
                body,
            },
            request_id: request_id(&headers),
        })
        .await
}

/// Checks the parsed body and forwards it with every field the caller sent.
pub async fn forward_json(
    rule: &'static RouteRule,
    check: BodyCheck,
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let Json(payload) = payload.map_err(|rejection| GatewayError::Rejected {
        status: rejection.status(),
        message: rejection.body_text(),
    })?;
    check(&payload).map_err(GatewayError::bad_request)?;

    state
        .upstream
        .call(UpstreamCall {
            method: rule.verb.method(),
            segments: rule.upstream_segments(&state.upstream_prefix, None),
            query: None,
            body: OutboundBody::json(&payload)?,
            request_id: request_id(&headers),
        })
        .await
}

pub async fn method_not_allowed(uri: Uri) -> GatewayError {
    GatewayError::Rejected {
        status: StatusCode::METHOD_NOT_ALLOWED,
        message: format!("method not allowed on {}", uri.path()),
    }
}

pub async fn not_found(uri: Uri) -> GatewayError {
    GatewayError::Rejected {
        status: StatusCode::NOT_FOUND,
        message: format!("no route for {}", uri.path()),
    }
}

fn is_multipart(value: &HeaderValue) -> bool {
    value
        .to_str()
        .map(|v| {
            v.trim_start()
                .to_ascii_lowercase()
                .starts_with("multipart/form-data")
        })
        .unwrap_or(false)
}
