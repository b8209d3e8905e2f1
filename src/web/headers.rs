//! Cross-origin isolation response headers
//!
//! The client application runs with SharedArrayBuffer and friends, which
//! browsers only enable in cross-origin isolated contexts. Every response
//! therefore carries COOP and COEP.

use axum::{
    extract::Request,
    http::{header::HeaderValue, HeaderName},
    middleware::Next,
    response::Response,
};

static OPENER_POLICY: HeaderName = HeaderName::from_static("cross-origin-opener-policy");
static EMBEDDER_POLICY: HeaderName = HeaderName::from_static("cross-origin-embedder-policy");

/// Middleware adding the isolation headers to every response
pub async fn isolation_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(OPENER_POLICY.clone(), HeaderValue::from_static("same-origin"));
    headers.insert(
        EMBEDDER_POLICY.clone(),
        HeaderValue::from_static("require-corp"),
    );
    response
}
