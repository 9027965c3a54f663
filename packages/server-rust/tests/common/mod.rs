//! Shared fixtures: the specification documents under `testdata/specs` and
//! helpers to dispatch requests and decode responses the way a client would.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use mockstack_core::{DirectorySpecStore, ServiceModelLoader, Value};
use mockstack_server::protocol::codec_for;
use mockstack_server::service::{ServiceRequest, ServiceResponse};
use mockstack_server::{ServerConfig, ServiceRouter, Skeleton};

pub fn spec_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata/specs")
}

pub fn loader() -> Arc<ServiceModelLoader> {
    Arc::new(ServiceModelLoader::new(Arc::new(DirectorySpecStore::new(
        spec_dir(),
    ))))
}

pub fn router() -> ServiceRouter {
    ServiceRouter::new(loader(), Arc::new(ServerConfig::default()))
}

/// Builds a client-side request for `operation` from a typed input.
pub fn client_request(skeleton: &Skeleton, operation: &str, input: &Value) -> ServiceRequest {
    let model = skeleton.model();
    let operation = model.operation(operation).expect("operation in model");
    codec_for(model.protocol())
        .serialize_request(model, operation, input)
        .expect("input encodes")
}

/// Decodes a response the way a client of `operation` would.
pub fn parse(skeleton: &Skeleton, operation: &str, response: &ServiceResponse) -> Value {
    let model = skeleton.model();
    let operation = model.operation(operation).expect("operation in model");
    codec_for(model.protocol())
        .parse_response(model, operation, response)
        .expect("response decodes")
}

pub fn request_id(parsed: &Value) -> &str {
    parsed
        .get("ResponseMetadata")
        .and_then(|m| m.get("RequestId"))
        .and_then(Value::as_str)
        .expect("response metadata carries a request id")
}

pub fn error_code(parsed: &Value) -> &str {
    parsed
        .get("Error")
        .and_then(|e| e.get("Code"))
        .and_then(Value::as_str)
        .expect("error code")
}

pub fn error_message(parsed: &Value) -> &str {
    parsed
        .get("Error")
        .and_then(|e| e.get("Message"))
        .and_then(Value::as_str)
        .expect("error message")
}
