//! Specification loading: document format, validation, stores, and the
//! cached service-model loader.

pub mod builder;
pub mod document;
pub mod loader;
pub mod store;

pub use builder::parse_model;
pub use loader::ServiceModelLoader;
pub use store::{DirectorySpecStore, InMemorySpecStore, SpecStore};

use crate::uri::UriPatternError;

/// Errors raised while obtaining a service model. All of them are fatal for
/// the service: a model that fails to load cannot be served.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("no specification registered for service '{0}'")]
    NotFound(String),
    #[error("invalid specification for service '{service}': {violation}")]
    Invalid {
        service: String,
        #[source]
        violation: SpecViolation,
    },
    #[error("failed to read specification for service '{service}': {source}")]
    Store {
        service: String,
        #[source]
        source: anyhow::Error,
    },
}

/// The specific rule an invalid specification breaks.
#[derive(Debug, thiserror::Error)]
pub enum SpecViolation {
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error("unknown protocol '{0}'")]
    UnknownProtocol(String),
    #[error("shape '{shape}' referenced by '{referenced_by}' is not defined")]
    DanglingReference { shape: String, referenced_by: String },
    #[error("shape graph contains a cycle: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },
    #[error("shape '{shape}' has unsupported type '{kind}'")]
    UnknownShapeType { shape: String, kind: String },
    #[error("shape '{shape}' is malformed: {reason}")]
    MalformedShape { shape: String, reason: &'static str },
    #[error("shape '{shape}' names payload member '{member}' which does not exist")]
    MissingPayloadMember { shape: String, member: String },
    #[error("member '{shape}.{member}' has unknown location '{location}'")]
    UnknownLocation {
        shape: String,
        member: String,
        location: String,
    },
    #[error("shape '{shape}' has unknown timestamp format '{format}'")]
    UnknownTimestampFormat { shape: String, format: String },
    #[error("operation '{key}' declares mismatching name '{name}'")]
    NameMismatch { key: String, name: String },
    #[error("operation '{operation}' of a REST service has no http binding")]
    MissingHttpBinding { operation: String },
    #[error("operation '{operation}' has an invalid request URI: {source}")]
    InvalidRequestUri {
        operation: String,
        #[source]
        source: UriPatternError,
    },
    #[error("operation '{operation}' references '{shape}', which is not a structure")]
    NotAStructure { operation: String, shape: String },
}
