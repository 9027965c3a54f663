//! HTTP handler definitions for the mockstack front.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod gateway;
pub mod health;

pub use gateway::{detect_service, gateway_handler};
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::NetworkConfig;
use crate::service::{build_dispatch_pipeline, CallTracker, DispatchPipeline, ServiceRouter};

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references and cheaply clonable services so cloning per
/// request stays cheap.
#[derive(Clone)]
pub struct AppState {
    /// Dispatch pipeline every API call is sent through.
    pub pipeline: DispatchPipeline,
    /// Service table, used for service detection and health reporting.
    pub router: ServiceRouter,
    /// Lifecycle phase and in-flight calls, shared with the pipeline.
    pub calls: Arc<CallTracker>,
    /// Network configuration (bind address, limits).
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Builds the state around `router`, wrapping it in the dispatch pipeline.
    #[must_use]
    pub fn new(
        router: ServiceRouter,
        calls: Arc<CallTracker>,
        config: Arc<NetworkConfig>,
    ) -> Self {
        Self {
            pipeline: build_dispatch_pipeline(router.clone(), Arc::clone(&calls)),
            router,
            calls,
            config,
            start_time: Instant::now(),
        }
    }
}
