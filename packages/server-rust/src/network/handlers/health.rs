//! Health, liveness, and readiness endpoint handlers.
//!
//! Served under `/_mockstack/health` so they never collide with a REST
//! service's URI space.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::service::LifecyclePhase;

/// Returns the lifecycle phase, loaded services with their in-flight
/// calls, and uptime as JSON.
///
/// Always returns 200 -- the `state` field in the response body indicates
/// whether the server is accepting calls.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let phase = state.calls.phase();
    let busy = state.calls.in_flight_by_service();
    let uptime_secs = state.start_time.elapsed().as_secs();

    let services: serde_json::Map<String, serde_json::Value> = state
        .router
        .services()
        .into_iter()
        .filter_map(|id| {
            let skeleton = state.router.skeleton(&id)?;
            let entry = json!({
                "protocol": skeleton.model().protocol().as_str(),
                "apiVersion": skeleton.model().metadata().api_version,
                "implemented": skeleton.registry().operations(),
                "inFlight": busy.get(&id).copied().unwrap_or(0),
            });
            Some((id, entry))
        })
        .collect();

    Json(json!({
        "state": phase.as_str(),
        "services": services,
        "in_flight": state.calls.in_flight(),
        "uptime_secs": uptime_secs,
    }))
}

/// Liveness check -- always returns 200 OK.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness check -- returns 200 when ready, 503 otherwise.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.calls.phase() == LifecyclePhase::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkConfig;
    use crate::service::{CallTracker, ServerConfig, ServiceRouter};
    use mockstack_core::{InMemorySpecStore, ServiceModelLoader};
    use std::sync::Arc;

    fn test_state() -> AppState {
        let store = InMemorySpecStore::new().with(
            "tables",
            r#"{"metadata": {"protocol": "json", "apiVersion": "2012-08-10", "targetPrefix": "T"},
                "operations": {"ListTables": {}}, "shapes": {}}"#,
        );
        let mut router = ServiceRouter::new(
            Arc::new(ServiceModelLoader::new(Arc::new(store))),
            Arc::new(ServerConfig::default()),
        );
        router.register_unimplemented("tables").unwrap();
        AppState::new(
            router,
            Arc::new(CallTracker::new()),
            Arc::new(NetworkConfig::default()),
        )
    }

    #[tokio::test]
    async fn health_handler_returns_json_with_all_fields() {
        let state = test_state();
        state.calls.mark_ready();

        let json = health_handler(State(state)).await.0;

        assert_eq!(json["state"], "ready");
        assert_eq!(json["in_flight"], 0);
        assert!(json["uptime_secs"].is_number());
        assert_eq!(json["services"]["tables"]["protocol"], "json");
        assert_eq!(json["services"]["tables"]["apiVersion"], "2012-08-10");
        assert_eq!(json["services"]["tables"]["implemented"], json!([]));
        assert_eq!(json["services"]["tables"]["inFlight"], 0);
    }

    #[tokio::test]
    async fn health_handler_reports_lifecycle_states() {
        let state = test_state();
        assert_eq!(health_handler(State(state.clone())).await.0["state"], "starting");

        state.calls.mark_ready();
        state.calls.begin_drain();
        assert_eq!(health_handler(State(state)).await.0["state"], "draining");
    }

    #[tokio::test]
    async fn health_handler_reports_in_flight_calls_per_service() {
        let state = test_state();
        let _first = state.calls.admit("tables");
        let _second = state.calls.admit("tables");

        let response = health_handler(State(state)).await;
        assert_eq!(response.0["in_flight"], 2);
        assert_eq!(response.0["services"]["tables"]["inFlight"], 2);
    }

    #[tokio::test]
    async fn liveness_handler_always_returns_200() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_handler_tracks_state() {
        let state = test_state();
        assert_eq!(
            readiness_handler(State(state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        state.calls.mark_ready();
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::OK);

        state.calls.begin_drain();
        assert_eq!(
            readiness_handler(State(state)).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
