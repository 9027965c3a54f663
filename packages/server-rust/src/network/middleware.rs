//! Transport layers around the axum router.
//!
//! Each `.layer()` call wraps everything applied before it, so the last
//! layer applied sees the request first. Body size is enforced by the
//! gateway while it collects the body, where the 413 can carry a request id.

use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;

/// Response headers browser SDK clients must be able to read.
const EXPOSED_HEADERS: [&str; 6] = [
    "x-amzn-requestid",
    "x-amz-request-id",
    "x-amzn-errortype",
    "etag",
    "location",
    "last-modified",
];

/// Wraps `router` in the transport layers. From the inside out: request
/// timeout (408), CORS, gzip compression, request tracing.
#[must_use]
pub fn apply_http_layers<S>(router: Router<S>, config: &NetworkConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(cors_layer(&config.cors_origins))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// `"*"` anywhere in `origins` allows every origin; otherwise only the
/// listed origins that parse as header values.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| o.parse().ok()))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any)
        .expose_headers(EXPOSED_HEADERS.map(HeaderName::from_static))
}
