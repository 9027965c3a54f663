//! Handler registry: binds operation names to handler implementations.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use mockstack_core::{ServiceModel, Value};

use super::context::RequestContext;
use super::operation::OperationError;

// ---------------------------------------------------------------------------
// RegistryError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("more than one handler registered for operation '{operation}'")]
    DuplicateHandler { operation: String },
    #[error("handler registered for '{operation}', which service '{service}' does not define")]
    UnknownOperation { service: String, operation: String },
}

// ---------------------------------------------------------------------------
// OperationHandler
// ---------------------------------------------------------------------------

/// Implementation of a single operation.
///
/// Handlers receive the decoded input and return an output value shaped like
/// the operation's output structure.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn call(&self, ctx: RequestContext, input: Value) -> Result<Value, OperationError>;
}

/// Adapter turning an async closure into an [`OperationHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> OperationHandler for FnHandler<F>
where
    F: Fn(RequestContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, OperationError>> + Send + 'static,
{
    async fn call(&self, ctx: RequestContext, input: Value) -> Result<Value, OperationError> {
        (self.0)(ctx, input).await
    }
}

// ---------------------------------------------------------------------------
// ServiceHandler
// ---------------------------------------------------------------------------

/// A service implementation that contributes its operation handlers.
///
/// Implementors usually declare their handlers with [`register_operations!`]:
///
/// ```ignore
/// impl ServiceHandler for Queues {
///     fn register(self: Arc<Self>, builder: &mut HandlerRegistryBuilder) -> Result<(), RegistryError> {
///         register_operations!(self, builder, {
///             "SendMessage" => send_message,
///             "DeleteQueue" => delete_queue,
///         })
///     }
/// }
/// ```
pub trait ServiceHandler: Send + Sync + 'static {
    /// Registers every operation this service implements.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateHandler`] when two handlers claim the
    /// same operation.
    fn register(self: Arc<Self>, builder: &mut HandlerRegistryBuilder) -> Result<(), RegistryError>;
}

/// Registers `"Operation" => method` pairs of a [`ServiceHandler`].
///
/// Each method must be `async fn(&self, RequestContext, Value) -> Result<Value, OperationError>`.
#[macro_export]
macro_rules! register_operations {
    ($service:expr, $builder:expr, { $($operation:literal => $method:ident),* $(,)? }) => {{
        $(
            let service = ::std::sync::Arc::clone(&$service);
            $builder.operation($operation, move |ctx, input| {
                let service = ::std::sync::Arc::clone(&service);
                async move { service.$method(ctx, input).await }
            })?;
        )*
        ::std::result::Result::<(), $crate::service::registry::RegistryError>::Ok(())
    }};
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

/// Collects handlers, rejecting duplicate operation names.
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<String, Arc<dyn OperationHandler>>,
}

impl HandlerRegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an async closure for `operation`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateHandler`] if `operation` is taken.
    pub fn operation<F, Fut>(&mut self, operation: &str, handler: F) -> Result<&mut Self, RegistryError>
    where
        F: Fn(RequestContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, OperationError>> + Send + 'static,
    {
        self.handler(operation, Arc::new(FnHandler(handler)))
    }

    /// Registers a handler object for `operation`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateHandler`] if `operation` is taken.
    pub fn handler(
        &mut self,
        operation: &str,
        handler: Arc<dyn OperationHandler>,
    ) -> Result<&mut Self, RegistryError> {
        if self.handlers.contains_key(operation) {
            return Err(RegistryError::DuplicateHandler {
                operation: operation.to_string(),
            });
        }
        self.handlers.insert(operation.to_string(), handler);
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

/// Immutable operation-name to handler table.
///
/// An operation without an entry is dispatched as "not implemented".
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn OperationHandler>>,
}

impl HandlerRegistry {
    /// A registry with no handlers; every operation is not implemented.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds the registry for a service implementation.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateHandler`] when two handlers claim the
    /// same operation.
    pub fn from_handler<H: ServiceHandler>(handler: Arc<H>) -> Result<Self, RegistryError> {
        let mut builder = HandlerRegistryBuilder::new();
        handler.register(&mut builder)?;
        Ok(builder.build())
    }

    #[must_use]
    pub fn lookup(&self, operation: &str) -> Option<Arc<dyn OperationHandler>> {
        self.handlers.get(operation).cloned()
    }

    /// Registered operation names, sorted.
    #[must_use]
    pub fn operations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Checks that every registered operation exists in `model`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownOperation`] for the first handler
    /// whose operation the model does not define.
    pub fn validate(&self, model: &ServiceModel) -> Result<(), RegistryError> {
        match self
            .operations()
            .into_iter()
            .find(|name| model.operation(name).is_none())
        {
            Some(operation) => Err(RegistryError::UnknownOperation {
                service: model.name().to_string(),
                operation: operation.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("operations", &self.operations())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
