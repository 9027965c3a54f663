//! Service routing: dispatches `ServiceCall` to the `Skeleton` registered
//! under its service id.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use mockstack_core::{ServiceModelLoader, SpecError};
use tower::Service;
use tracing::info;

use super::config::ServerConfig;
use super::operation::{ServiceCall, ServiceResponse};
use super::registry::{HandlerRegistry, RegistryError, ServiceHandler};
use super::skeleton::Skeleton;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure to register a service.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Failure to dispatch a call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("no service registered under '{service}'")]
    UnknownService { service: String },
    #[error("server is shutting down; call to '{service}' refused")]
    ShuttingDown { service: String },
}

// ---------------------------------------------------------------------------
// ServiceRouter
// ---------------------------------------------------------------------------

/// Routes calls to per-service dispatchers.
///
/// Registration happens before serving; the table is then shared read-only
/// between clones.
#[derive(Clone)]
pub struct ServiceRouter {
    skeletons: Arc<HashMap<String, Arc<Skeleton>>>,
    loader: Arc<ServiceModelLoader>,
    config: Arc<ServerConfig>,
}

impl ServiceRouter {
    #[must_use]
    pub fn new(loader: Arc<ServiceModelLoader>, config: Arc<ServerConfig>) -> Self {
        Self {
            skeletons: Arc::new(HashMap::new()),
            loader,
            config,
        }
    }

    /// Loads the model for `service_id` and registers a service implementation.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError`] when the model cannot be loaded, two handlers
    /// claim one operation, or a handler names an operation the model lacks.
    pub fn register<H: ServiceHandler>(&mut self, service_id: &str, handler: Arc<H>) -> Result<(), RouterError> {
        let registry = HandlerRegistry::from_handler(handler)?;
        self.register_registry(service_id, registry)
    }

    /// Registers a prebuilt registry for `service_id`.
    ///
    /// # Errors
    ///
    /// See [`Self::register`].
    pub fn register_registry(&mut self, service_id: &str, registry: HandlerRegistry) -> Result<(), RouterError> {
        let model = self.loader.load(service_id)?;
        let skeleton = Skeleton::new(model, registry, Arc::clone(&self.config))?;
        info!(
            service = service_id,
            protocol = skeleton.model().protocol().as_str(),
            operations = skeleton.model().operations().count(),
            handlers = skeleton.registry().operations().len(),
            "service registered"
        );
        Arc::make_mut(&mut self.skeletons).insert(service_id.to_string(), Arc::new(skeleton));
        Ok(())
    }

    /// Registers a service whose every operation answers "not implemented".
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Spec`] when the model cannot be loaded.
    pub fn register_unimplemented(&mut self, service_id: &str) -> Result<(), RouterError> {
        self.register_registry(service_id, HandlerRegistry::empty())
    }

    /// Registered service ids, sorted.
    #[must_use]
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.skeletons.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn skeleton(&self, service_id: &str) -> Option<Arc<Skeleton>> {
        self.skeletons.get(service_id).cloned()
    }

    /// Dispatchers of all registered services.
    pub fn skeletons(&self) -> impl Iterator<Item = (&str, &Arc<Skeleton>)> {
        self.skeletons.iter().map(|(id, s)| (id.as_str(), s))
    }
}

impl std::fmt::Debug for ServiceRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRouter")
            .field("services", &self.services())
            .finish_non_exhaustive()
    }
}

impl Service<ServiceCall> for ServiceRouter {
    type Response = ServiceResponse;
    type Error = DispatchError;
    type Future = Pin<Box<dyn Future<Output = Result<ServiceResponse, DispatchError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: ServiceCall) -> Self::Future {
        let skeleton = self.skeletons.get(&call.service_id).cloned();
        Box::pin(async move {
            match skeleton {
                Some(skeleton) => Ok(skeleton.invoke(call.request).await),
                None => Err(DispatchError::UnknownService {
                    service: call.service_id,
                }),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
