//! Admission middleware: refuses calls once the server drains and keeps
//! each admitted call counted until its response is produced.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::{Layer, Service};

use crate::service::lifecycle::CallTracker;
use crate::service::operation::{ServiceCall, ServiceResponse};
use crate::service::router::DispatchError;

#[derive(Debug, Clone)]
pub struct AdmissionLayer {
    tracker: Arc<CallTracker>,
}

impl AdmissionLayer {
    #[must_use]
    pub fn new(tracker: Arc<CallTracker>) -> Self {
        Self { tracker }
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionService {
            inner,
            tracker: Arc::clone(&self.tracker),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdmissionService<S> {
    inner: S,
    tracker: Arc<CallTracker>,
}

impl<S> Service<ServiceCall> for AdmissionService<S>
where
    S: Service<ServiceCall, Response = ServiceResponse, Error = DispatchError>,
    S::Future: Send + 'static,
{
    type Response = ServiceResponse;
    type Error = DispatchError;
    type Future = Pin<Box<dyn Future<Output = Result<ServiceResponse, DispatchError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, call: ServiceCall) -> Self::Future {
        let Some(guard) = self.tracker.admit(&call.service_id) else {
            let service = call.service_id;
            return Box::pin(async move { Err(DispatchError::ShuttingDown { service }) });
        };

        let fut = self.inner.call(call);
        Box::pin(async move {
            let result = fut.await;
            drop(guard);
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::{Method, StatusCode};
    use tokio::sync::oneshot;
    use tower::ServiceExt;

    use super::*;
    use crate::service::operation::ServiceRequest;

    /// Answers 200 once the paired sender fires.
    #[derive(Clone)]
    struct Gate(Arc<tokio::sync::Mutex<Option<oneshot::Receiver<()>>>>);

    impl Service<ServiceCall> for Gate {
        type Response = ServiceResponse;
        type Error = DispatchError;
        type Future = Pin<Box<dyn Future<Output = Result<ServiceResponse, DispatchError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _call: ServiceCall) -> Self::Future {
            let gate = Arc::clone(&self.0);
            Box::pin(async move {
                if let Some(rx) = gate.lock().await.take() {
                    let _ = rx.await;
                }
                Ok(ServiceResponse::new(StatusCode::OK))
            })
        }
    }

    fn call(service: &str) -> ServiceCall {
        ServiceCall::new(service, ServiceRequest::new(Method::POST, "/"))
    }

    #[tokio::test]
    async fn admitted_call_is_counted_until_it_answers() {
        let tracker = Arc::new(CallTracker::new());
        let (tx, rx) = oneshot::channel();
        let service = AdmissionLayer::new(Arc::clone(&tracker))
            .layer(Gate(Arc::new(tokio::sync::Mutex::new(Some(rx)))));

        let pending = tokio::spawn(service.oneshot(call("sqs")));
        while tracker.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(tracker.in_flight_by_service()["sqs"], 1);

        tx.send(()).unwrap();
        let response = pending.await.unwrap().unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn draining_refuses_new_calls_and_waits_for_running_ones() {
        let tracker = Arc::new(CallTracker::new());
        tracker.mark_ready();
        let (tx, rx) = oneshot::channel();
        let service = AdmissionLayer::new(Arc::clone(&tracker))
            .layer(Gate(Arc::new(tokio::sync::Mutex::new(Some(rx)))));

        let running = tokio::spawn(service.clone().oneshot(call("sqs")));
        while tracker.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        tracker.begin_drain();

        let refused = service.oneshot(call("s3")).await.unwrap_err();
        assert_eq!(
            refused,
            DispatchError::ShuttingDown {
                service: "s3".to_string()
            }
        );

        tx.send(()).unwrap();
        assert!(tracker.drain(Duration::from_secs(2)).await);
        assert_eq!(running.await.unwrap().unwrap().status, StatusCode::OK);
    }
}
