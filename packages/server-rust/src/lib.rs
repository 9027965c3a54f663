//! mockstack server -- protocol codecs, the skeleton dispatcher, the tower
//! dispatch pipeline, and the axum HTTP front.

pub mod network;
pub mod observability;
pub mod protocol;
pub mod service;

pub use network::{NetworkConfig, NetworkModule};
pub use protocol::{DecodeError, EncodeError, ProtocolCodec};
pub use service::{
    HandlerRegistry, OperationError, RequestContext, ServerConfig, ServiceException,
    ServiceHandler, ServiceRouter, Skeleton,
};
