use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Method, header},
    response::{IntoResponse, Response},
};
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::time::Instant;

use crate::config::{BackendEndpoint, Limits};
use crate::error::{BodyLimitExceeded, GatewayError};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Body of a credentialed outbound call.
pub enum OutboundBody {
    Empty,
    /// Already serialized JSON.
    Json(Vec<u8>),
    /// A multipart body relayed byte-for-byte under its original content type.
    Multipart {
        content_type: HeaderValue,
        content_length: Option<u64>,
        body: Body,
    },
}

impl OutboundBody {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, GatewayError> {
        serde_json::to_vec(value)
            .map(OutboundBody::Json)
            .map_err(|e| GatewayError::bad_request(format!("cannot encode request body: {e}")))
    }
}

pub struct UpstreamCall {
    pub method: Method,
    /// Backend path segments, unencoded.
    pub segments: Vec<String>,
    pub query: Option<String>,
    pub body: OutboundBody,
    pub request_id: String,
}

/// Outbound HTTP client bound to the backend endpoint.
pub struct Upstream {
    http: reqwest::Client,
    endpoint: BackendEndpoint,
    limits: Limits,
}

impl Upstream {
    pub fn new(endpoint: BackendEndpoint, limits: Limits) -> Result<Self, reqwest::Error> {
        // 3xx replies are relayed to the caller, never followed here
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(limits.upstream_timeout)
            .connect_timeout(limits.connect_timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint,
            limits,
        })
    }

    pub fn endpoint(&self) -> &BackendEndpoint {
        &self.endpoint
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Sends one credentialed request and translates the reply.
    pub async fn call(&self, call: UpstreamCall) -> Result<Response, GatewayError> {
        let url = self.endpoint.segment_url(&call.segments, call.query.as_deref());
        let path = url.path().to_string();

        let mut request = self
            .http
            .request(call.method.clone(), url)
            .bearer_auth(self.endpoint.credential().expose())
            .header(REQUEST_ID_HEADER, &call.request_id);

        request = match call.body {
            OutboundBody::Empty => request,
            OutboundBody::Json(bytes) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(bytes),
            OutboundBody::Multipart {
                content_type,
                content_length,
                body,
            } => {
                let mut request = request.header(header::CONTENT_TYPE, content_type);
                if let Some(len) = content_length {
                    request = request.header(header::CONTENT_LENGTH, len);
                }
                let stream = limit_stream(body.into_data_stream(), self.limits.max_upload_bytes);
                request.body(reqwest::Body::wrap_stream(stream))
            }
        };

        let started = Instant::now();
        let result = match request.send().await {
            Ok(response) => relay(response).await,
            Err(e) => Err(GatewayError::from_transport(e)),
        };

        let status = match &result {
            Ok(response) => response.status(),
            Err(e) => e.status(),
        };
        tracing::info!(
            method = %call.method,
            path = %path,
            request_id = %call.request_id,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "backend call finished"
        );
        result
    }
}

/// Success bodies pass through untouched; failures become `{"error": ...}`
/// at the backend's own status.
async fn relay(response: reqwest::Response) -> Result<Response, GatewayError> {
    let status = response.status();

    if !status.is_success() {
        let text = response.text().await.map_err(GatewayError::from_transport)?;
        return Err(GatewayError::upstream(status, &text));
    }

    let bytes = response.bytes().await.map_err(GatewayError::from_transport)?;
    if bytes.is_empty() {
        return Ok(status.into_response());
    }
    if let Err(e) = serde_json::from_slice::<serde::de::IgnoredAny>(&bytes) {
        return Err(GatewayError::MalformedBody(e.to_string()));
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok((status, headers, bytes).into_response())
}

/// Reuses the caller's request id when it is a sane header value.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| nanoid::nanoid!())
}

/// Passes chunks through until more than `limit` bytes have been seen,
/// then yields [`BodyLimitExceeded`].
pub fn limit_stream<S, B, E>(
    stream: S,
    limit: usize,
) -> impl Stream<Item = Result<B, BoxError>> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + 'static,
    E: Into<BoxError> + 'static,
{
    let mut seen = 0usize;
    stream.map(move |chunk| {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => return Err(e.into()),
        };
        seen = seen.saturating_add(chunk.as_ref().len());
        if seen > limit {
            return Err(BodyLimitExceeded { limit }.into());
        }
        Ok(chunk)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn test_request_id_reuses_inbound_header() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("abc-123"));
        assert_eq!(request_id(&headers), "abc-123");

        let generated = request_id(&HeaderMap::new());
        assert_eq!(generated.len(), 21);
    }

    #[tokio::test]
    async fn test_limit_stream_trips_after_limit() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
            vec![Ok(vec![0u8; 4]), Ok(vec![0u8; 4]), Ok(vec![0u8; 4])];
        let results: Vec<_> = limit_stream(stream::iter(chunks), 10).collect().await;

        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        let err = results[2].as_ref().unwrap_err();
        assert!(err.downcast_ref::<BodyLimitExceeded>().is_some());
    }

    #[tokio::test]
    async fn test_limit_stream_passes_small_bodies() {
        let chunks: Vec<Result<&'static [u8], std::io::Error>> = vec![Ok(&b"hello"[..]), Ok(&b"world"[..])];
        let total: usize = limit_stream(stream::iter(chunks), 10)
            .map(|c| c.unwrap().len())
            .collect::<Vec<_>>()
            .await
            .iter()
            .sum();
        assert_eq!(total, 10);
    }
}
