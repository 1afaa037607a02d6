use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::fmt;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub const TRACE_ID_HEADER: &str = "x-trace-id";

const MAX_TRACE_ID_LEN: usize = 64;

/// Correlation id for one request, carried in request extensions and
/// echoed back in the `x-trace-id` response header
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceId(String);

impl TraceId {
    pub fn generate() -> Self {
        TraceId(Uuid::new_v4().to_string())
    }

    /// Accept a client-supplied id only if it is short and log-safe
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let safe = !raw.is_empty()
            && raw.len() <= MAX_TRACE_ID_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        safe.then(|| TraceId(raw.to_string()))
    }

    /// Incoming header if usable, otherwise a fresh id
    pub fn from_headers(headers: &HeaderMap) -> Self {
        match headers.get(TRACE_ID_HEADER).map(|h| h.to_str()) {
            None => Self::generate(),
            Some(Ok(raw)) => Self::parse(raw).unwrap_or_else(|| {
                warn!("Discarding malformed x-trace-id header");
                Self::generate()
            }),
            Some(Err(_)) => Self::generate(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Run each request inside a span keyed by its [`TraceId`] and emit one
/// access-log line when the response is ready
pub async fn trace_requests(mut request: Request, next: Next) -> Response {
    let trace_id = TraceId::from_headers(request.headers());
    let method = request.method().clone();
    // Path only; query strings may carry user input
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let span = info_span!("http_request", trace_id = %trace_id, method = %method, path = %path);
    request.extensions_mut().insert(trace_id.clone());

    let mut response = next.run(request).instrument(span.clone()).await;

    span.in_scope(|| {
        info!(
            event = "HTTP_REQUEST",
            status = response.status().as_u16(),
            latency_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Request completed"
        );
    });

    if let Ok(value) = HeaderValue::from_str(trace_id.as_str()) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}
