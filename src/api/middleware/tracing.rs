//! Correlation ids and the per-request `http_request` span.

use axum::{
    extract::Request,
    http::{header::HeaderValue, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

/// The header name for correlation IDs.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// W3C Trace Context header.
const TRACEPARENT_HEADER: &str = "traceparent";

/// Longest client-supplied correlation id that is echoed back.
const MAX_CORRELATION_ID_LEN: usize = 128;

/// Extension that holds the correlation ID for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pick the correlation id for a request: an explicit `X-Correlation-ID`,
/// then the trace id of a well-formed `traceparent`, then a fresh UUID.
pub fn resolve_correlation_id(headers: &HeaderMap) -> CorrelationId {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|id| {
            !id.is_empty()
                && id.len() <= MAX_CORRELATION_ID_LEN
                && id.chars().all(|c| c.is_ascii_graphic())
        })
        .map(|id| CorrelationId(id.to_string()))
        .or_else(|| {
            headers
                .get(TRACEPARENT_HEADER)
                .and_then(|h| h.to_str().ok())
                .and_then(trace_id_from_traceparent)
                .map(CorrelationId)
        })
        .unwrap_or_else(CorrelationId::generate)
}

/// `version-traceid-parentid-flags`; the trace id is 32 lowercase hex digits
/// and not all zeros.
fn trace_id_from_traceparent(traceparent: &str) -> Option<String> {
    let mut parts = traceparent.split('-');
    let _version = parts.next()?;
    let trace_id = parts.next()?;
    let valid = trace_id.len() == 32
        && trace_id.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
        && trace_id.chars().any(|c| c != '0');
    valid.then(|| trace_id.to_string())
}

/// Runs the request inside an `http_request` span and echoes the
/// correlation id on the response.
pub async fn correlation_id_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = resolve_correlation_id(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    request.extensions_mut().insert(correlation_id.clone());

    let span = tracing::info_span!(
        "http_request",
        correlation_id = %correlation_id,
        method = %method,
        path = %path,
    );

    async move {
        let mut response = next.run(request).await;

        if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
            response.headers_mut().insert(CORRELATION_ID_HEADER, value);
        }

        tracing::info!(status = response.status().as_u16(), "Request completed");
        response
    }
    .instrument(span)
    .await
}
