//! The dispatcher: resolve, decode, invoke, encode.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use mockstack_core::{OperationModel, ServiceModel};
use tracing::{debug, warn};

use super::classify::OperationResolver;
use super::config::ServerConfig;
use super::context::{generate_request_id, RequestContext};
use super::error_map;
use super::operation::{ServiceRequest, ServiceResponse};
use super::registry::{HandlerRegistry, RegistryError};
use crate::protocol::{check_required, codec_for, ProtocolCodec, WireError};

/// Executes requests for one service model against one handler registry.
///
/// `invoke` never fails: every outcome, including handler panics, is
/// encoded as a protocol response carrying a fresh request id.
pub struct Skeleton {
    resolver: OperationResolver,
    registry: HandlerRegistry,
    codec: &'static dyn ProtocolCodec,
    config: Arc<ServerConfig>,
}

impl Skeleton {
    /// Creates a dispatcher after checking the registry against the model.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownOperation`] when a handler is
    /// registered for an operation the model does not define.
    pub fn new(
        model: Arc<ServiceModel>,
        registry: HandlerRegistry,
        config: Arc<ServerConfig>,
    ) -> Result<Self, RegistryError> {
        registry.validate(&model)?;
        Ok(Self {
            codec: codec_for(model.protocol()),
            resolver: OperationResolver::new(model),
            registry,
            config,
        })
    }

    #[must_use]
    pub fn model(&self) -> &Arc<ServiceModel> {
        self.resolver.model()
    }

    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Dispatches one request.
    pub async fn invoke(&self, request: ServiceRequest) -> ServiceResponse {
        let request_id = generate_request_id();
        let model = self.model();

        let operation = match self.resolver.resolve(&request) {
            Ok(operation) => operation,
            Err(e) => {
                debug!(service = model.name(), error = %e, "operation resolution failed");
                return self.error(None, &error_map::from_resolve(&e), &request_id);
            }
        };

        let input = match self
            .codec
            .parse_request(model, &operation, &request)
            .and_then(|input| match operation.input.as_deref() {
                Some(shape) => check_required(shape, &input).map(|()| input),
                None => Ok(input),
            }) {
            Ok(input) => input,
            Err(e) => {
                debug!(service = model.name(), operation = %operation.name, error = %e, "request decode failed");
                return self.error(Some(&operation), &error_map::from_decode(&e), &request_id);
            }
        };

        let Some(handler) = self.registry.lookup(&operation.name) else {
            debug!(service = model.name(), operation = %operation.name, "no handler registered");
            let error = error_map::not_implemented(model.name(), &operation.name);
            return self.error(Some(&operation), &error, &request_id);
        };

        let ctx = RequestContext::new(
            Arc::clone(model),
            Arc::clone(&operation),
            Arc::new(request),
            request_id.clone(),
            &self.config,
        );

        let outcome = AssertUnwindSafe(handler.call(ctx, input)).catch_unwind().await;
        let output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                let error = error_map::from_operation(model.name(), &operation, e);
                if error.status.is_server_error() {
                    warn!(service = model.name(), operation = %operation.name, code = %error.code, message = %error.message, "handler failed");
                } else {
                    debug!(service = model.name(), operation = %operation.name, code = %error.code, "handler returned error");
                }
                return self.error(Some(&operation), &error, &request_id);
            }
            Err(panic) => {
                let error = error_map::from_panic(panic.as_ref());
                warn!(service = model.name(), operation = %operation.name, message = %error.message, "handler panicked");
                return self.error(Some(&operation), &error, &request_id);
            }
        };

        match self
            .codec
            .serialize_response(model, &operation, &output, &request_id)
        {
            Ok(response) => response,
            Err(e) => {
                warn!(service = model.name(), operation = %operation.name, error = %e, "response encode failed");
                self.error(Some(&operation), &error_map::from_encode(&e), &request_id)
            }
        }
    }

    fn error(
        &self,
        operation: Option<&OperationModel>,
        error: &WireError,
        request_id: &str,
    ) -> ServiceResponse {
        self.codec
            .serialize_error(self.model(), operation, error, request_id)
    }
}

impl std::fmt::Debug for Skeleton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Skeleton")
            .field("service", &self.model().name())
            .field("protocol", &self.codec.protocol())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
