//! mockstack core: service models, shapes, request-URI patterns, and
//! specification loading.

pub mod model;
pub mod shape;
pub mod spec;
pub mod uri;
pub mod value;

pub use model::{ErrorShape, HttpBinding, OperationModel, Protocol, ServiceMetadata, ServiceModel};
pub use shape::{
    ListShape, Location, MapShape, Member, Shape, ShapeKind, StructureShape, TimestampFormat,
};
pub use spec::{
    parse_model, DirectorySpecStore, InMemorySpecStore, ServiceModelLoader, SpecError, SpecStore,
    SpecViolation,
};
pub use uri::{QueryRequirement, UriPattern, UriPatternError};
pub use value::Value;
