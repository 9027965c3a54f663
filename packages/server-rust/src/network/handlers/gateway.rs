//! Fallback handler sending API calls through the dispatch pipeline.
//!
//! Every request that is not a health check lands here. The body is
//! collected, the target service is detected from the SigV4 credential
//! scope or the `X-Amz-Target` prefix, and the call is sent through the
//! dispatch pipeline, which refuses it while the server drains.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tower::ServiceExt;
use tracing::debug;

use super::AppState;
use crate::protocol::json::TARGET_HEADER;
use crate::protocol::REQUEST_ID_HEADER;
use crate::service::{
    generate_request_id, CredentialScope, DispatchError, ServiceCall, ServiceRequest,
    ServiceRouter,
};

/// Dispatches one API call.
///
/// Answers 413 when the body exceeds `max_body_bytes`, 404 when no
/// registered service matches, and 503 while the server drains.
pub async fn gateway_handler(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.config.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!(error = %err, "request body rejected");
            return gateway_error(
                StatusCode::PAYLOAD_TOO_LARGE,
                "RequestEntityTooLarge",
                "request body exceeds the configured limit",
            );
        }
    };
    let request = ServiceRequest::from_http(http::Request::from_parts(parts, body));

    let Some(service) = detect_service(&state.router, &request) else {
        debug!(method = %request.method, path = %request.path, "no service matched");
        return gateway_error(
            StatusCode::NOT_FOUND,
            "UnknownService",
            "unable to determine the target service of the request",
        );
    };

    match state.pipeline.clone().oneshot(ServiceCall::new(service, request)).await {
        Ok(response) => {
            let (parts, bytes) = response.into_http().into_parts();
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(err @ DispatchError::UnknownService { .. }) => {
            gateway_error(StatusCode::NOT_FOUND, "UnknownService", &err.to_string())
        }
        Err(err @ DispatchError::ShuttingDown { .. }) => {
            gateway_error(StatusCode::SERVICE_UNAVAILABLE, "ServiceUnavailable", &err.to_string())
        }
    }
}

/// Picks the registered service a request is addressed to.
///
/// The credential scope service wins when it names a registered service,
/// either by id or by endpoint prefix. Otherwise the `X-Amz-Target` prefix
/// is matched against each model's target prefix.
#[must_use]
pub fn detect_service(router: &ServiceRouter, request: &ServiceRequest) -> Option<String> {
    let services = router.services();

    if let Some(scope) = CredentialScope::from_request(request) {
        if services.contains(&scope.service) {
            return Some(scope.service);
        }
        let by_prefix = services.iter().find(|id| {
            router.skeleton(id).is_some_and(|s| {
                s.model().metadata().endpoint_prefix.as_deref() == Some(scope.service.as_str())
            })
        });
        if let Some(id) = by_prefix {
            return Some(id.clone());
        }
    }

    let (prefix, _) = request.header(TARGET_HEADER)?.rsplit_once('.')?;
    services.into_iter().find(|id| {
        router.skeleton(id).is_some_and(|s| {
            s.model().metadata().target_prefix.as_deref() == Some(prefix)
        })
    })
}

/// Error raised by the front itself, carrying a request id like every
/// dispatcher response.
fn gateway_error(status: StatusCode, code: &str, message: &str) -> Response {
    let request_id = generate_request_id();
    let mut response = (status, Json(json!({ "__type": code, "message": message }))).into_response();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}
