//! Tower middleware layers for the dispatch pipeline.
//!
//! - [`metrics`]: Call timing, counting, and the `dispatch` tracing span
//! - [`admission`]: Refuses calls while draining, counts the rest
//! - [`pipeline`]: Composes the layers over the service router

pub mod admission;
pub mod metrics;
pub mod pipeline;

pub use admission::AdmissionLayer;
pub use metrics::MetricsLayer;
pub use pipeline::{build_dispatch_pipeline, DispatchPipeline};
