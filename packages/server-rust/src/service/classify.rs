//! Operation resolution: maps a raw `ServiceRequest` to the `OperationModel`
//! it addresses.

use std::sync::Arc;

use http::Method;
use mockstack_core::{OperationModel, Protocol, ServiceModel};

use super::operation::ServiceRequest;
use crate::protocol::json::{target_operation, TARGET_HEADER};
use crate::protocol::query;

// ---------------------------------------------------------------------------
// ResolveError
// ---------------------------------------------------------------------------

/// Why a request could not be mapped to an operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no operation named in request to '{service}'")]
    MissingTarget { service: String },
    #[error("operation '{target}' is not defined for service '{service}'")]
    UnknownOperation { service: String, target: String },
    #[error("method {method} is not allowed for {path}")]
    MethodNotAllowed {
        method: String,
        path: String,
        allowed: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// OperationResolver
// ---------------------------------------------------------------------------

/// Resolves requests against one service model.
///
/// For REST protocols the operations are kept sorted by URI specificity so
/// that the first matching pattern is the most specific one. The sort is
/// stable, so ties keep declaration order.
#[derive(Debug, Clone)]
pub struct OperationResolver {
    model: Arc<ServiceModel>,
    routes: Vec<Arc<OperationModel>>,
}

impl OperationResolver {
    #[must_use]
    pub fn new(model: Arc<ServiceModel>) -> Self {
        let mut routes: Vec<Arc<OperationModel>> = model.operations().cloned().collect();
        routes.sort_by_key(|op| op.http.request_uri.rank());
        Self { model, routes }
    }

    #[must_use]
    pub fn model(&self) -> &Arc<ServiceModel> {
        &self.model
    }

    /// Finds the operation addressed by `request`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the request names no operation, an
    /// unknown one, or matches a REST path under a different method.
    pub fn resolve(&self, request: &ServiceRequest) -> Result<Arc<OperationModel>, ResolveError> {
        match self.model.protocol() {
            Protocol::Query | Protocol::Ec2 => {
                let action = query::action(request).ok_or_else(|| self.missing_target())?;
                self.by_name(&action)
            }
            Protocol::Json => {
                let target = request
                    .header(TARGET_HEADER)
                    .ok_or_else(|| self.missing_target())?;
                let name = target_operation(&self.model, target).ok_or_else(|| {
                    ResolveError::UnknownOperation {
                        service: self.model.name().to_string(),
                        target: target.to_string(),
                    }
                })?;
                self.by_name(name)
            }
            Protocol::RestJson | Protocol::RestXml => self.by_route(request),
        }
    }

    fn missing_target(&self) -> ResolveError {
        ResolveError::MissingTarget {
            service: self.model.name().to_string(),
        }
    }

    fn by_name(&self, name: &str) -> Result<Arc<OperationModel>, ResolveError> {
        self.model
            .operation(name)
            .cloned()
            .ok_or_else(|| ResolveError::UnknownOperation {
                service: self.model.name().to_string(),
                target: name.to_string(),
            })
    }

    fn by_route(&self, request: &ServiceRequest) -> Result<Arc<OperationModel>, ResolveError> {
        let query = request.query.as_deref();
        let mut allowed: Vec<String> = Vec::new();
        for operation in &self.routes {
            if operation.http.request_uri.matches(&request.path, query).is_none() {
                continue;
            }
            if method_matches(&operation.http.method, &request.method) {
                return Ok(Arc::clone(operation));
            }
            if !allowed.contains(&operation.http.method) {
                allowed.push(operation.http.method.clone());
            }
        }

        if allowed.is_empty() {
            Err(ResolveError::UnknownOperation {
                service: self.model.name().to_string(),
                target: format!("{} {}", request.method, request.path),
            })
        } else {
            Err(ResolveError::MethodNotAllowed {
                method: request.method.to_string(),
                path: request.path.clone(),
                allowed,
            })
        }
    }
}

fn method_matches(declared: &str, actual: &Method) -> bool {
    declared.eq_ignore_ascii_case(actual.as_str())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
