//! Request ID middleware.
//!
//! Every request carries an ID that is reused from the `X-Request-Id` header
//! when the caller sends one and generated otherwise. The ID is stored in
//! request extensions, logged, and echoed on the response.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;

/// Header name for request ID propagation.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Request ID stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Axum middleware that assigns a request ID.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        uri = %request.uri(),
    );
    let _ = request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    span.in_scope(|| tracing::debug!("request received"));
    let mut response = next.run(request).instrument(span.clone()).await;
    span.in_scope(|| tracing::debug!(status = response.status().as_u16(), "response sent"));

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        let _ = response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
