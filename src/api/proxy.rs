//! Transparent reverse proxy for paths outside the route table.
//!
//! Only the prefix is rewritten. No credential is attached and backend
//! responses, errors included, stream back untouched.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderName, header},
    response::{IntoResponse, Response},
};

use super::SharedState;
use crate::error::GatewayError;
use crate::upstream::limit_stream;

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

pub async fn pass_through(
    State(state): State<SharedState>,
    request: Request,
) -> Result<Response, GatewayError> {
    let (parts, body) = request.into_parts();

    let path = format!("{}{}", state.upstream_prefix, parts.uri.path());
    let url = state.upstream.endpoint().url(&path, parts.uri.query());

    let mut headers = strip_hop_by_hop(&parts.headers);
    headers.remove(header::HOST);

    tracing::debug!(method = %parts.method, path = %path, "pass-through");

    let mut outbound = state
        .upstream
        .http()
        .request(parts.method.clone(), url)
        .headers(headers);
    if has_body(&parts.headers) {
        let limit = state.upstream.limits().max_upload_bytes;
        let stream = limit_stream(body.into_data_stream(), limit);
        outbound = outbound.body(reqwest::Body::wrap_stream(stream));
    }

    let response = outbound
        .send()
        .await
        .map_err(GatewayError::from_transport)?;

    let status = response.status();
    let headers = strip_hop_by_hop(response.headers());
    let body = Body::from_stream(response.bytes_stream());
    Ok((status, headers, body).into_response())
}

fn has_body(headers: &HeaderMap) -> bool {
    if headers.contains_key(header::TRANSFER_ENCODING) {
        return true;
    }
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .is_some_and(|len| len > 0)
}

/// Copies `headers`, dropping hop-by-hop headers and any header the
/// `Connection` header names.
pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let named_by_connection: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if HOP_BY_HOP.contains(name) || named_by_connection.iter().any(|n| n == name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-internal"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert("x-internal", HeaderValue::from_static("1"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));

        let stripped = strip_hop_by_hop(&headers);
        assert_eq!(stripped.len(), 3);
        assert!(stripped.contains_key(header::CONTENT_TYPE));
        assert_eq!(stripped.get_all(header::SET_COOKIE).iter().count(), 2);
        assert!(!stripped.contains_key("x-internal"));
    }

    #[test]
    fn test_has_body() {
        let mut headers = HeaderMap::new();
        assert!(!has_body(&headers));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        assert!(!has_body(&headers));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("12"));
        assert!(has_body(&headers));
    }
}
