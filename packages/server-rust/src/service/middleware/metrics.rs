//! Metrics middleware for dispatched calls.
//!
//! Opens a `dispatch` span per call and records request counters and
//! latency histograms through the `metrics` facade. Without an installed
//! recorder the facade calls are no-ops.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::operation::{ServiceCall, ServiceResponse};

/// Counter of dispatched calls, labelled by `service` and `status`.
pub const REQUESTS_TOTAL: &str = "mockstack_requests_total";

/// Histogram of dispatch latency in seconds, labelled by `service`.
pub const REQUEST_DURATION_SECONDS: &str = "mockstack_request_duration_seconds";

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments calls with a tracing span and metrics.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that records call duration and response status.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<ServiceCall> for MetricsService<S>
where
    S: Service<ServiceCall, Response = ServiceResponse> + Send,
    S::Future: Send + 'static,
    S::Error: std::fmt::Display + Send + 'static,
{
    type Response = ServiceResponse;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<ServiceResponse, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, call: ServiceCall) -> Self::Future {
        let service = call.service_id.clone();
        let span = info_span!(
            "dispatch",
            service = %service,
            method = %call.request.method,
            path = %call.request.path,
            status = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );

        let fut = self.inner.call(call);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                let status = match &result {
                    Ok(response) => response.status.as_u16().to_string(),
                    Err(_) => "rejected".to_string(),
                };

                let span = tracing::Span::current();
                span.record("status", status.as_str());
                span.record("duration_ms", duration_ms);

                match &result {
                    Ok(_) => tracing::info!(service = %service, status = %status, duration_ms, "dispatch complete"),
                    Err(e) => tracing::warn!(service = %service, error = %e, duration_ms, "dispatch failed"),
                }

                metrics::counter!(REQUESTS_TOTAL, "service" => service.clone(), "status" => status)
                    .increment(1);
                metrics::histogram!(REQUEST_DURATION_SECONDS, "service" => service)
                    .record(elapsed.as_secs_f64());

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use http::{Method, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::service::operation::ServiceRequest;

    /// Immediately-completing service answering 204 for "ok" and failing otherwise.
    struct ImmediateService;

    impl Service<ServiceCall> for ImmediateService {
        type Response = ServiceResponse;
        type Error = String;
        type Future = Pin<Box<dyn Future<Output = Result<ServiceResponse, String>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, call: ServiceCall) -> Self::Future {
            Box::pin(async move {
                if call.service_id == "ok" {
                    Ok(ServiceResponse::new(StatusCode::NO_CONTENT))
                } else {
                    Err(format!("unknown service {}", call.service_id))
                }
            })
        }
    }

    #[tokio::test]
    async fn metrics_layer_passes_through_response() {
        let svc = MetricsLayer.layer(ImmediateService);
        let call = ServiceCall::new("ok", ServiceRequest::new(Method::GET, "/"));
        let response = svc.oneshot(call).await.unwrap();
        assert_eq!(response.status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn metrics_layer_passes_through_errors() {
        let svc = MetricsLayer.layer(ImmediateService);
        let call = ServiceCall::new("missing", ServiceRequest::new(Method::GET, "/"));
        assert_eq!(svc.oneshot(call).await.unwrap_err(), "unknown service missing");
    }
}
