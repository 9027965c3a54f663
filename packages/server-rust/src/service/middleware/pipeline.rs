//! Pipeline composition: wraps the service router in the dispatch middleware.

use std::sync::Arc;

use tower::ServiceBuilder;

use super::admission::{AdmissionLayer, AdmissionService};
use super::metrics::{MetricsLayer, MetricsService};
use crate::service::lifecycle::CallTracker;
use crate::service::router::ServiceRouter;

/// The composed dispatch service handed to the HTTP front.
pub type DispatchPipeline = MetricsService<AdmissionService<ServiceRouter>>;

/// Build the dispatch pipeline by wrapping the `ServiceRouter` with middleware layers.
///
/// Metrics sit outermost so refused calls are still counted. The returned
/// service implements `tower::Service<ServiceCall>` and is cheap to clone.
#[must_use]
pub fn build_dispatch_pipeline(router: ServiceRouter, tracker: Arc<CallTracker>) -> DispatchPipeline {
    ServiceBuilder::new()
        .layer(MetricsLayer)
        .layer(AdmissionLayer::new(tracker))
        .service(router)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
