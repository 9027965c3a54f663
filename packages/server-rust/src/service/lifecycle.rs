//! Serving phase and per-service accounting of calls being dispatched.
//!
//! The front reports the phase to health checks, the admission layer asks
//! the tracker before each dispatch, and shutdown waits on the tracker
//! until every admitted call has produced its response.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;

/// Where the server is in its life. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecyclePhase {
    /// Services registered, listener not yet serving.
    Starting,
    Ready,
    /// New calls are refused; admitted ones run to completion.
    Draining,
    /// No admitted call remains.
    Stopped,
}

impl LifecyclePhase {
    /// Name used in the health document.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }

    #[must_use]
    pub fn accepts_calls(self) -> bool {
        self <= Self::Ready
    }
}

/// Tracks the lifecycle phase and the calls admitted for each service.
#[derive(Debug)]
pub struct CallTracker {
    phase: ArcSwap<LifecyclePhase>,
    by_service: DashMap<String, u64>,
    total: watch::Sender<u64>,
}

impl CallTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: ArcSwap::from_pointee(LifecyclePhase::Starting),
            by_service: DashMap::new(),
            total: watch::Sender::new(0),
        }
    }

    #[must_use]
    pub fn phase(&self) -> LifecyclePhase {
        **self.phase.load()
    }

    pub fn mark_ready(&self) {
        self.advance(LifecyclePhase::Ready);
    }

    /// Stops admitting calls. Calls already admitted keep running.
    pub fn begin_drain(&self) {
        self.advance(LifecyclePhase::Draining);
    }

    /// Admits one call to `service`, or returns `None` once draining.
    ///
    /// The call counts as in flight until the guard is dropped, including
    /// when the handler future unwinds.
    #[must_use]
    pub fn admit(self: &Arc<Self>, service: &str) -> Option<CallGuard> {
        // Count first so a concurrent drain never misses this call.
        *self.by_service.entry(service.to_string()).or_insert(0) += 1;
        self.total.send_modify(|n| *n += 1);
        let guard = CallGuard {
            tracker: Arc::clone(self),
            service: service.to_string(),
        };
        if self.phase().accepts_calls() {
            Some(guard)
        } else {
            None
        }
    }

    /// Calls in flight across all services.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        *self.total.borrow()
    }

    /// Calls in flight per service. Services with none are omitted.
    #[must_use]
    pub fn in_flight_by_service(&self) -> BTreeMap<String, u64> {
        self.by_service
            .iter()
            .filter(|entry| *entry.value() > 0)
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Begins draining and waits up to `timeout` for admitted calls.
    ///
    /// Returns `true` and moves to `Stopped` once none remain; on timeout
    /// returns `false` and stays `Draining`.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.begin_drain();
        let mut idle = self.total.subscribe();
        let drained = tokio::time::timeout(timeout, idle.wait_for(|n| *n == 0))
            .await
            .is_ok_and(|waited| waited.is_ok());
        if drained {
            self.advance(LifecyclePhase::Stopped);
        }
        drained
    }

    fn advance(&self, to: LifecyclePhase) {
        let previous = self.phase.rcu(|current| (**current).max(to));
        if *previous < to {
            debug!(from = previous.as_str(), to = to.as_str(), "lifecycle phase changed");
        }
    }

    fn release(&self, service: &str) {
        if let Some(mut count) = self.by_service.get_mut(service) {
            *count = count.saturating_sub(1);
        }
        self.total.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl Default for CallTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// One admitted call; releases its slot when dropped.
#[derive(Debug)]
pub struct CallGuard {
    tracker: Arc<CallTracker>,
    service: String,
}

impl CallGuard {
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.tracker.release(&self.service);
    }
}
