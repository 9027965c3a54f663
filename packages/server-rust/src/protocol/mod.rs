//! Wire protocol codecs.
//!
//! Each protocol family implements [`ProtocolCodec`] over the shared
//! [`Value`] tree. The server side decodes requests and encodes responses and
//! errors; the client side (`serialize_request` / `parse_response`) mirrors it
//! so responses can be verified in tests and round-trips checked.

pub mod json;
pub mod query;
pub mod rest;
pub mod rest_json;
pub mod rest_xml;
pub mod timestamp;
pub mod xml;

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use http::{HeaderName, HeaderValue, StatusCode};
use mockstack_core::{
    OperationModel, Protocol, ServiceModel, Shape, ShapeKind, StructureShape, TimestampFormat,
    Value,
};

use crate::service::operation::{ServiceRequest, ServiceResponse};

pub use json::JsonCodec;
pub use query::QueryCodec;
pub use rest_json::RestJsonCodec;
pub use rest_xml::RestXmlCodec;

/// Header carrying the request id on every response.
pub const REQUEST_ID_HEADER: &str = "x-amzn-requestid";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure to turn wire data into a [`Value`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("missing required parameter '{member}' of '{shape}'")]
    MissingRequiredField { shape: String, member: String },
    #[error("invalid value for '{path}': expected {expected}, {reason}")]
    Serialization {
        path: String,
        expected: &'static str,
        reason: String,
    },
    #[error("malformed {format} document: {reason}")]
    Malformed { format: &'static str, reason: String },
}

impl DecodeError {
    pub(crate) fn serialization(
        path: &str,
        expected: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::Serialization {
            path: path.to_string(),
            expected,
            reason: reason.into(),
        }
    }
}

/// Failure to turn a [`Value`] into wire data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("value for '{path}' does not match shape: expected {expected}, got {actual}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("missing value for URI label '{0}'")]
    MissingLabel(String),
    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },
}

pub(crate) fn mismatch(path: &str, shape: &Shape, value: &Value) -> EncodeError {
    EncodeError::TypeMismatch {
        path: path.to_string(),
        expected: shape.type_name(),
        actual: value.kind(),
    }
}

/// An error ready to be written in a protocol's error format.
#[derive(Debug, Clone, PartialEq)]
pub struct WireError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub sender_fault: bool,
    /// Extra members of a declared error.
    pub detail: Option<ErrorDetail>,
}

/// Extra error members together with the shape describing them.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorDetail {
    pub shape: Arc<Shape>,
    pub fields: BTreeMap<String, Value>,
}

impl WireError {
    #[must_use]
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            sender_fault: status.is_client_error(),
            detail: None,
        }
    }

    /// `Sender` or `Receiver`, as written in XML error documents.
    #[must_use]
    pub fn fault_type(&self) -> &'static str {
        if self.sender_fault {
            "Sender"
        } else {
            "Receiver"
        }
    }

    /// Detail members that are declared on the error shape, excluding the
    /// message which every format writes separately.
    pub(crate) fn detail_members(&self) -> impl Iterator<Item = (&mockstack_core::Member, &Value)> {
        self.detail.iter().flat_map(|detail| {
            detail
                .shape
                .as_structure()
                .into_iter()
                .flat_map(|s| s.members.iter())
                .filter(|m| !m.name.eq_ignore_ascii_case("message"))
                .filter_map(move |m| detail.fields.get(&m.name).map(|v| (m, v)))
        })
    }
}

// ---------------------------------------------------------------------------
// ProtocolCodec
// ---------------------------------------------------------------------------

/// Encoder/decoder pair for one protocol family.
pub trait ProtocolCodec: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Decodes the operation input from a request. Missing required members
    /// are not checked here; see [`check_required`].
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the request does not match the input shape.
    fn parse_request(
        &self,
        service: &ServiceModel,
        operation: &OperationModel,
        request: &ServiceRequest,
    ) -> Result<Value, DecodeError>;

    /// Encodes a handler result.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] when `output` does not match the output shape.
    fn serialize_response(
        &self,
        service: &ServiceModel,
        operation: &OperationModel,
        output: &Value,
        request_id: &str,
    ) -> Result<ServiceResponse, EncodeError>;

    /// Encodes an error. `operation` is `None` when resolution failed.
    fn serialize_error(
        &self,
        service: &ServiceModel,
        operation: Option<&OperationModel>,
        error: &WireError,
        request_id: &str,
    ) -> ServiceResponse;

    /// Client side: builds the request a caller would send.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] when `input` does not match the input shape.
    fn serialize_request(
        &self,
        service: &ServiceModel,
        operation: &OperationModel,
        input: &Value,
    ) -> Result<ServiceRequest, EncodeError>;

    /// Client side: decodes a response into the output members plus
    /// `ResponseMetadata { RequestId, HTTPStatusCode }`, and for error
    /// responses `Error { Code, Message }`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the body cannot be parsed.
    fn parse_response(
        &self,
        service: &ServiceModel,
        operation: &OperationModel,
        response: &ServiceResponse,
    ) -> Result<Value, DecodeError>;
}

static QUERY: QueryCodec = QueryCodec::query();
static EC2: QueryCodec = QueryCodec::ec2();
static JSON: JsonCodec = JsonCodec;
static REST_JSON: RestJsonCodec = RestJsonCodec;
static REST_XML: RestXmlCodec = RestXmlCodec;

/// The codec for a protocol family.
#[must_use]
pub fn codec_for(protocol: Protocol) -> &'static dyn ProtocolCodec {
    match protocol {
        Protocol::Query => &QUERY,
        Protocol::Ec2 => &EC2,
        Protocol::Json => &JSON,
        Protocol::RestJson => &REST_JSON,
        Protocol::RestXml => &REST_XML,
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Verifies that every required member is present, descending into nested
/// structures, lists, and maps.
///
/// # Errors
///
/// Returns [`DecodeError::MissingRequiredField`] for the first absent member.
pub fn check_required(shape: &Shape, value: &Value) -> Result<(), DecodeError> {
    match (&shape.kind, value) {
        (ShapeKind::Structure(structure), Value::Structure(fields)) => {
            for member in &structure.members {
                match fields.get(&member.name) {
                    Some(v) => check_required(&member.shape, v)?,
                    None if member.required => {
                        return Err(DecodeError::MissingRequiredField {
                            shape: shape.name.clone(),
                            member: member.name.clone(),
                        })
                    }
                    None => {}
                }
            }
            Ok(())
        }
        (ShapeKind::List(list), Value::List(items)) => items
            .iter()
            .try_for_each(|item| check_required(&list.member.shape, item)),
        (ShapeKind::Map(map), Value::Map(entries)) => entries
            .values()
            .try_for_each(|item| check_required(&map.value.shape, item)),
        _ => Ok(()),
    }
}

/// Checks a decoded integer against the width of its shape: `integer`
/// members are 32-bit, `long` members 64-bit.
pub(crate) fn integer_in_range(shape: &Shape, n: i64, path: &str) -> Result<Value, DecodeError> {
    if matches!(shape.kind, ShapeKind::Integer) && i32::try_from(n).is_err() {
        return Err(DecodeError::serialization(
            path,
            shape.type_name(),
            format!("{n} does not fit in a 32-bit integer"),
        ));
    }
    Ok(Value::Integer(n))
}

/// Parses a textual scalar (query parameter, header, XML text) for `shape`.
pub(crate) fn scalar_from_text(
    shape: &Shape,
    text: &str,
    format: TimestampFormat,
    path: &str,
) -> Result<Value, DecodeError> {
    let value = match &shape.kind {
        ShapeKind::String => Value::String(text.to_string()),
        ShapeKind::Integer | ShapeKind::Long => {
            let n = text
                .trim()
                .parse::<i64>()
                .map_err(|e| DecodeError::serialization(path, shape.type_name(), e.to_string()))?;
            integer_in_range(shape, n, path)?
        }
        ShapeKind::Float | ShapeKind::Double => {
            Value::Float(parse_float(text.trim()).ok_or_else(|| {
                DecodeError::serialization(path, shape.type_name(), format!("got '{text}'"))
            })?)
        }
        ShapeKind::Boolean => match text.trim() {
            t if t.eq_ignore_ascii_case("true") => Value::Boolean(true),
            t if t.eq_ignore_ascii_case("false") => Value::Boolean(false),
            other => {
                return Err(DecodeError::serialization(
                    path,
                    "boolean",
                    format!("got '{other}'"),
                ))
            }
        },
        ShapeKind::Blob => BASE64
            .decode(text.trim())
            .map(Value::Blob)
            .map_err(|e| DecodeError::serialization(path, "blob", e.to_string()))?,
        ShapeKind::Timestamp { .. } => timestamp::parse(text.trim(), format)
            .map(Value::Timestamp)
            .map_err(|reason| DecodeError::serialization(path, "timestamp", reason))?,
        ShapeKind::Structure(_) | ShapeKind::List(_) | ShapeKind::Map(_) => {
            return Err(DecodeError::serialization(
                path,
                shape.type_name(),
                "got a scalar",
            ))
        }
    };
    Ok(value)
}

/// Renders a scalar value as text for `shape`.
pub(crate) fn scalar_to_text(
    shape: &Shape,
    value: &Value,
    format: TimestampFormat,
    path: &str,
) -> Result<String, EncodeError> {
    let text = match (&shape.kind, value) {
        (ShapeKind::String, Value::String(s)) => s.clone(),
        (ShapeKind::Integer | ShapeKind::Long, Value::Integer(i)) => i.to_string(),
        (ShapeKind::Float | ShapeKind::Double, Value::Float(f)) => format_float(*f),
        (ShapeKind::Float | ShapeKind::Double, Value::Integer(i)) => i.to_string(),
        (ShapeKind::Boolean, Value::Boolean(b)) => b.to_string(),
        (ShapeKind::Blob, Value::Blob(bytes)) => BASE64.encode(bytes),
        (ShapeKind::Blob, Value::String(s)) => BASE64.encode(s.as_bytes()),
        (ShapeKind::Timestamp { .. }, Value::Timestamp(t)) => timestamp::format(t, format),
        _ => return Err(mismatch(path, shape, value)),
    };
    Ok(text)
}

/// Timestamp format of a member, falling back to the location default.
pub(crate) fn timestamp_format(
    member: &mockstack_core::Member,
    default: TimestampFormat,
) -> TimestampFormat {
    member.declared_timestamp_format().unwrap_or(default)
}

pub(crate) fn parse_float(text: &str) -> Option<f64> {
    match text {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        other => other.parse().ok(),
    }
}

pub(crate) fn format_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        value.to_string()
    }
}

/// Joins a parent path and a member name for error messages.
pub(crate) fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

pub(crate) fn structure_fields<'a>(
    shape: &Shape,
    value: &'a Value,
    path: &str,
) -> Result<&'a BTreeMap<String, Value>, EncodeError> {
    value.as_structure().ok_or_else(|| mismatch(path, shape, value))
}

pub(crate) fn body_members(structure: &StructureShape) -> impl Iterator<Item = &mockstack_core::Member> {
    structure.members.iter().filter(|m| m.in_body())
}

pub(crate) fn header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), EncodeError> {
    let invalid = |reason: String| EncodeError::InvalidHeader {
        name: name.to_string(),
        reason,
    };
    let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
    let value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
    Ok((name, value))
}

/// Builds a response with a content type and the request-id header.
pub(crate) fn response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<bytes::Bytes>,
    request_id: &str,
) -> ServiceResponse {
    let mut response = ServiceResponse::new(status);
    response.body = body.into();
    response.headers.insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static(content_type),
    );
    if let Ok(id) = HeaderValue::from_str(request_id) {
        response
            .headers
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), id);
    }
    response
}

/// Adds `ResponseMetadata { RequestId, HTTPStatusCode }` to a parsed response.
pub(crate) fn with_metadata(
    mut fields: BTreeMap<String, Value>,
    request_id: Option<String>,
    status: StatusCode,
) -> Value {
    let mut metadata = BTreeMap::new();
    if let Some(id) = request_id {
        metadata.insert("RequestId".to_string(), Value::String(id));
    }
    metadata.insert(
        "HTTPStatusCode".to_string(),
        Value::Integer(i64::from(status.as_u16())),
    );
    fields.insert("ResponseMetadata".to_string(), Value::Structure(metadata));
    Value::Structure(fields)
}

/// `Error { Code, Message }` entry of a parsed error response.
pub(crate) fn error_entry(code: String, message: String) -> (String, Value) {
    (
        "Error".to_string(),
        Value::structure([
            ("Code", Value::String(code)),
            ("Message", Value::String(message)),
        ]),
    )
}
