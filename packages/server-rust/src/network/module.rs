//! Network module with deferred startup lifecycle.
//!
//! `new()` creates resources, `start()` binds the TCP listener, and
//! `serve()` starts accepting connections. The call tracker is shared with
//! the dispatch pipeline, so draining refuses calls at dispatch time.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    gateway_handler, health_handler, liveness_handler, readiness_handler, AppState,
};
use super::middleware::apply_http_layers;
use crate::service::{CallTracker, ServiceRouter};

/// Maximum time `serve()` waits for in-flight calls after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Manages the HTTP server lifecycle.
///
/// 1. `new()` -- allocates shared state (call tracker)
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- accepts connections until shutdown is signalled
pub struct NetworkModule {
    config: NetworkConfig,
    router: ServiceRouter,
    listener: Option<TcpListener>,
    calls: Arc<CallTracker>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, router: ServiceRouter) -> Self {
        Self {
            config,
            router,
            listener: None,
            calls: Arc::new(CallTracker::new()),
        }
    }

    /// Returns the tracker shared by the health handlers and the pipeline.
    #[must_use]
    pub fn call_tracker(&self) -> Arc<CallTracker> {
        Arc::clone(&self.calls)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /_mockstack/health` -- server state and loaded services
    /// - `GET /_mockstack/health/live` -- liveness check
    /// - `GET /_mockstack/health/ready` -- readiness check
    /// - anything else -- dispatched to a service
    pub fn build_router(&self) -> Router {
        let state = AppState::new(
            self.router.clone(),
            Arc::clone(&self.calls),
            Arc::new(self.config.clone()),
        );

        let routes = Router::new()
            .route("/_mockstack/health", get(health_handler))
            .route("/_mockstack/health/live", get(liveness_handler))
            .route("/_mockstack/health/ready", get(readiness_handler))
            .fallback(gateway_handler);
        apply_http_layers(routes, &self.config).with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which differs from the configured
    /// port when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(
            host = %self.config.host,
            port,
            services = ?self.router.services(),
            "TCP listener bound"
        );

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until the `shutdown` future resolves.
    ///
    /// After the signal the phase moves to Draining, admitted calls get up
    /// to 30 seconds to finish, and the phase moves to Stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server
    /// hits a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();
        let calls = self.calls;

        calls.mark_ready();
        info!("Serving HTTP connections");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        let busy = calls.in_flight_by_service();
        if !busy.is_empty() {
            info!(?busy, "Draining in-flight calls");
        }
        if calls.drain(DRAIN_TIMEOUT).await {
            info!("All calls drained");
        } else {
            warn!(remaining = ?calls.in_flight_by_service(), "Drain timeout expired");
        }
        Ok(())
    }
}
