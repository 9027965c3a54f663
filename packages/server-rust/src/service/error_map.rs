//! Maps failures at each dispatch boundary to the wire error a client sees.

use std::any::Any;

use http::StatusCode;
use mockstack_core::OperationModel;

use super::classify::ResolveError;
use super::operation::{OperationError, ServiceException};
use crate::protocol::{DecodeError, EncodeError, ErrorDetail, WireError};

/// Code for failures that are not the caller's fault.
pub const INTERNAL_FAILURE: &str = "InternalFailure";

/// Resolution failures: 404 for unknown operations, 405 for a path that
/// exists under another method.
#[must_use]
pub fn from_resolve(error: &ResolveError) -> WireError {
    match error {
        ResolveError::MissingTarget { .. } | ResolveError::UnknownOperation { .. } => {
            WireError::new(StatusCode::NOT_FOUND, "UnknownOperationException", error.to_string())
        }
        ResolveError::MethodNotAllowed { .. } => WireError::new(
            StatusCode::METHOD_NOT_ALLOWED,
            "MethodNotAllowedException",
            error.to_string(),
        ),
    }
}

/// Decode and validation failures are client faults.
#[must_use]
pub fn from_decode(error: &DecodeError) -> WireError {
    let code = match error {
        DecodeError::MissingRequiredField { .. } => "MissingParameter",
        DecodeError::Serialization { .. } | DecodeError::Malformed { .. } => "SerializationException",
    };
    WireError::new(StatusCode::BAD_REQUEST, code, error.to_string())
}

/// The fixed 501 answer for operations without a handler.
#[must_use]
pub fn not_implemented(service: &str, operation: &str) -> WireError {
    WireError::new(
        StatusCode::NOT_IMPLEMENTED,
        INTERNAL_FAILURE,
        format!("API action '{operation}' for service '{service}' not yet implemented"),
    )
}

/// Maps a handler failure. Named errors keep their declared code and status
/// only when `operation` declares them.
#[must_use]
pub fn from_operation(service: &str, operation: &OperationModel, error: OperationError) -> WireError {
    match error {
        OperationError::Service(exception) => from_exception(operation, exception),
        OperationError::Common {
            code,
            message,
            status,
            sender_fault,
        } => WireError {
            status,
            code,
            message,
            sender_fault,
            detail: None,
        },
        OperationError::NotImplemented => not_implemented(service, &operation.name),
        OperationError::Internal(error) => internal(format!("{error:#}")),
    }
}

fn from_exception(operation: &OperationModel, exception: ServiceException) -> WireError {
    let declared = operation
        .declared_error(&exception.code)
        .or_else(|| operation.errors.iter().find(|e| e.code == exception.code));
    let Some(declared) = declared else {
        return internal(exception.message);
    };
    WireError {
        status: StatusCode::from_u16(declared.status).unwrap_or(StatusCode::BAD_REQUEST),
        code: declared.code.clone(),
        message: exception.message,
        sender_fault: declared.sender_fault,
        detail: (!exception.fields.is_empty()).then(|| ErrorDetail {
            shape: declared.shape.clone(),
            fields: exception.fields,
        }),
    }
}

/// A response that could not be encoded.
#[must_use]
pub fn from_encode(error: &EncodeError) -> WireError {
    internal(error.to_string())
}

/// A handler that panicked.
#[must_use]
pub fn from_panic(payload: &(dyn Any + Send)) -> WireError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string());
    internal(message)
}

fn internal(message: impl Into<String>) -> WireError {
    WireError::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_FAILURE, message)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use mockstack_core::{parse_model, Value};

    use super::*;

    fn operation() -> std::sync::Arc<OperationModel> {
        let model = parse_model(
            "sqs",
            r#"{
                "metadata": {"protocol": "query", "apiVersion": "2012-11-05"},
                "operations": {
                    "SendMessage": {"errors": [{"shape": "InvalidMessageContents"}, {"shape": "QueueDoesNotExist"}]}
                },
                "shapes": {
                    "InvalidMessageContents": {
                        "type": "structure",
                        "members": {"message": {"shape": "String"}, "Detail": {"shape": "String"}},
                        "exception": true
                    },
                    "QueueDoesNotExist": {
                        "type": "structure",
                        "members": {},
                        "error": {"code": "AWS.SimpleQueueService.NonExistentQueue", "httpStatusCode": 400},
                        "exception": true
                    },
                    "String": {"type": "string"}
                }
            }"#,
        )
        .unwrap();
        model.operation("SendMessage").unwrap().clone()
    }

    #[test]
    fn declared_exception_keeps_code_status_and_detail() {
        let op = operation();
        let error = ServiceException::new("InvalidMessageContents", "bad body").with_field("Detail", "x");
        let wire = from_operation("sqs", &op, error.into());
        assert_eq!(wire.status, StatusCode::BAD_REQUEST);
        assert_eq!(wire.code, "InvalidMessageContents");
        assert_eq!(wire.message, "bad body");
        assert!(wire.sender_fault);
        assert_eq!(
            wire.detail.map(|d| d.fields),
            Some([("Detail".to_string(), Value::from("x"))].into_iter().collect())
        );
    }

    #[test]
    fn declared_exception_matches_by_wire_code() {
        let op = operation();
        let wire = from_operation(
            "sqs",
            &op,
            OperationError::service("AWS.SimpleQueueService.NonExistentQueue", "gone"),
        );
        assert_eq!(wire.code, "AWS.SimpleQueueService.NonExistentQueue");
        assert_eq!(wire.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn undeclared_exception_is_internal_failure() {
        let op = operation();
        let wire = from_operation("sqs", &op, OperationError::service("Surprise", "boom"));
        assert_eq!(wire.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(wire.code, INTERNAL_FAILURE);
        assert_eq!(wire.message, "boom");
        assert!(!wire.sender_fault);
    }

    #[test]
    fn not_implemented_message_is_fixed() {
        let op = operation();
        let wire = from_operation("sqs", &op, OperationError::NotImplemented);
        assert_eq!(wire.status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(
            wire.message,
            "API action 'SendMessage' for service 'sqs' not yet implemented"
        );
    }

    #[test]
    fn resolution_and_decode_statuses() {
        let unknown = ResolveError::UnknownOperation {
            service: "s".to_string(),
            target: "X".to_string(),
        };
        assert_eq!(from_resolve(&unknown).status, StatusCode::NOT_FOUND);
        let not_allowed = ResolveError::MethodNotAllowed {
            method: "PUT".to_string(),
            path: "/r".to_string(),
            allowed: vec!["GET".to_string()],
        };
        assert_eq!(from_resolve(&not_allowed).status, StatusCode::METHOD_NOT_ALLOWED);

        let missing = DecodeError::MissingRequiredField {
            shape: "SendMessageRequest".to_string(),
            member: "QueueUrl".to_string(),
        };
        let wire = from_decode(&missing);
        assert_eq!((wire.status, wire.code.as_str()), (StatusCode::BAD_REQUEST, "MissingParameter"));
    }

    #[test]
    fn panic_payloads_become_messages() {
        let payload: Box<dyn Any + Send> = Box::new("kaboom");
        assert_eq!(from_panic(payload.as_ref()).message, "kaboom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(from_panic(payload.as_ref()).message, "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(from_panic(payload.as_ref()).status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
