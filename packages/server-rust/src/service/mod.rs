//! Request dispatch framework.
//!
//! This module implements the per-request pipeline:
//!
//! 1. **Resolution** (`classify`): `ServiceRequest` -> `Result<OperationModel, ResolveError>`
//! 2. **Dispatch** (`skeleton`): decode, invoke the handler, encode
//! 3. **Handlers** (`registry`): operation name -> handler table
//! 4. **Errors** (`error_map`): handler and codec failures -> wire errors
//! 5. **Routing** (`router`): dispatch to a `Skeleton` by service id
//! 6. **Middleware** (`middleware`): Tower layers around the router
//! 7. **Lifecycle** (`lifecycle`): serving phase and in-flight calls per service

pub mod classify;
pub mod config;
pub mod context;
pub mod error_map;
pub mod lifecycle;
pub mod middleware;
pub mod operation;
pub mod registry;
pub mod router;
pub mod skeleton;

// Re-export key types for convenient access.
pub use classify::{OperationResolver, ResolveError};
pub use config::ServerConfig;
pub use context::{generate_request_id, CredentialScope, RequestContext, REQUEST_ID_LENGTH};
pub use lifecycle::{CallGuard, CallTracker, LifecyclePhase};
pub use middleware::{build_dispatch_pipeline, DispatchPipeline};
pub use operation::{
    OperationError, ServiceCall, ServiceException, ServiceRequest, ServiceResponse,
};
pub use registry::{
    HandlerRegistry, HandlerRegistryBuilder, OperationHandler, RegistryError, ServiceHandler,
};
pub use router::{DispatchError, RouterError, ServiceRouter};
pub use skeleton::Skeleton;
