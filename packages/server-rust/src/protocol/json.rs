//! JSON protocol (`X-Amz-Target` + JSON body), plus the JSON value
//! conversion shared with REST-JSON.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use http::{Method, StatusCode};
use mockstack_core::{
    Member, OperationModel, Protocol, ServiceModel, Shape, ShapeKind, StructureShape,
    TimestampFormat, Value,
};
use serde_json::{Map as JsonMap, Value as Json};

use super::{
    child_path, error_entry, format_float, integer_in_range, mismatch, parse_float, response, structure_fields,
    timestamp, timestamp_format, with_metadata, DecodeError, EncodeError, ProtocolCodec,
    WireError, REQUEST_ID_HEADER,
};
use crate::service::operation::{ServiceRequest, ServiceResponse};

pub(crate) const TARGET_HEADER: &str = "x-amz-target";

/// Codec for the `json` protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

fn content_type(service: &ServiceModel) -> &'static str {
    match service.metadata().json_version.as_deref() {
        Some("1.1") => "application/x-amz-json-1.1",
        _ => "application/x-amz-json-1.0",
    }
}

/// Operation name from an `X-Amz-Target` value, checking the prefix when the
/// service declares one.
pub(crate) fn target_operation<'a>(service: &ServiceModel, target: &'a str) -> Option<&'a str> {
    let (prefix, operation) = target.rsplit_once('.')?;
    match service.metadata().target_prefix.as_deref() {
        Some(expected) if expected != prefix => None,
        _ => Some(operation),
    }
}

// ---------------------------------------------------------------------------
// Value <-> JSON
// ---------------------------------------------------------------------------

/// Parses a request or response body; an empty body is an empty object.
pub(crate) fn parse_body(body: &[u8]) -> Result<Json, DecodeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Json::Object(JsonMap::new()));
    }
    serde_json::from_slice(body).map_err(|e| DecodeError::Malformed {
        format: "json",
        reason: e.to_string(),
    })
}

/// Decodes the members of `structure` selected by `include` from a JSON object.
pub(crate) fn decode_object(
    structure: &StructureShape,
    object: &JsonMap<String, Json>,
    path: &str,
    include: impl Fn(&Member) -> bool,
) -> Result<BTreeMap<String, Value>, DecodeError> {
    let mut fields = BTreeMap::new();
    for member in structure.members.iter().filter(|m| include(m)) {
        match object.get(member.wire_name()) {
            None | Some(Json::Null) => {}
            Some(json) => {
                let value = decode_json(member, json, &child_path(path, &member.name))?;
                fields.insert(member.name.clone(), value);
            }
        }
    }
    Ok(fields)
}

/// Decodes a JSON value against a member's shape.
pub(crate) fn decode_json(member: &Member, json: &Json, path: &str) -> Result<Value, DecodeError> {
    let shape: &Shape = &member.shape;
    let wrong = || DecodeError::serialization(path, shape.type_name(), format!("got {}", json_kind(json)));
    let value = match (&shape.kind, json) {
        (ShapeKind::String, Json::String(s)) => Value::String(s.clone()),
        (ShapeKind::Integer | ShapeKind::Long, Json::Number(n)) => {
            integer_in_range(shape, n.as_i64().ok_or_else(wrong)?, path)?
        }
        (ShapeKind::Float | ShapeKind::Double, Json::Number(n)) => {
            Value::Float(n.as_f64().ok_or_else(wrong)?)
        }
        (ShapeKind::Float | ShapeKind::Double, Json::String(s)) => {
            Value::Float(parse_float(s).ok_or_else(wrong)?)
        }
        (ShapeKind::Boolean, Json::Bool(b)) => Value::Boolean(*b),
        (ShapeKind::Blob, Json::String(s)) => BASE64
            .decode(s)
            .map(Value::Blob)
            .map_err(|e| DecodeError::serialization(path, "blob", e.to_string()))?,
        (ShapeKind::Timestamp { .. }, Json::Number(n)) => {
            let seconds = n.as_f64().ok_or_else(wrong)?;
            Value::Timestamp(timestamp::from_epoch(seconds).ok_or_else(wrong)?)
        }
        (ShapeKind::Timestamp { .. }, Json::String(s)) => Value::Timestamp(
            timestamp::parse(s, timestamp_format(member, TimestampFormat::UnixTimestamp))
                .map_err(|reason| DecodeError::serialization(path, "timestamp", reason))?,
        ),
        (ShapeKind::Structure(structure), Json::Object(object)) => {
            Value::Structure(decode_object(structure, object, path, |_| true)?)
        }
        (ShapeKind::List(list), Json::Array(items)) => Value::List(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| decode_json(&list.member, item, &format!("{path}[{i}]")))
                .collect::<Result<_, _>>()?,
        ),
        (ShapeKind::Map(map), Json::Object(object)) => {
            let mut entries = BTreeMap::new();
            for (key, item) in object {
                if item.is_null() {
                    continue;
                }
                entries.insert(key.clone(), decode_json(&map.value, item, &child_path(path, key))?);
            }
            Value::Map(entries)
        }
        _ => return Err(wrong()),
    };
    Ok(value)
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

/// Encodes the members of `structure` selected by `include`.
pub(crate) fn encode_object(
    structure: &StructureShape,
    fields: &BTreeMap<String, Value>,
    path: &str,
    include: impl Fn(&Member) -> bool,
) -> Result<JsonMap<String, Json>, EncodeError> {
    let mut object = JsonMap::new();
    for member in structure.members.iter().filter(|m| include(m)) {
        if let Some(value) = fields.get(&member.name) {
            let json = encode_json(member, value, &child_path(path, &member.name))?;
            object.insert(member.wire_name().to_string(), json);
        }
    }
    Ok(object)
}

/// Encodes a value against a member's shape.
pub(crate) fn encode_json(member: &Member, value: &Value, path: &str) -> Result<Json, EncodeError> {
    let shape: &Shape = &member.shape;
    let json = match (&shape.kind, value) {
        (ShapeKind::String, Value::String(s)) => Json::String(s.clone()),
        (ShapeKind::Integer | ShapeKind::Long, Value::Integer(i)) => Json::from(*i),
        (ShapeKind::Float | ShapeKind::Double, Value::Float(f)) => {
            serde_json::Number::from_f64(*f).map_or_else(|| Json::String(format_float(*f)), Json::Number)
        }
        (ShapeKind::Float | ShapeKind::Double, Value::Integer(i)) => Json::from(*i),
        (ShapeKind::Boolean, Value::Boolean(b)) => Json::Bool(*b),
        (ShapeKind::Blob, Value::Blob(bytes)) => Json::String(BASE64.encode(bytes)),
        (ShapeKind::Blob, Value::String(s)) => Json::String(BASE64.encode(s.as_bytes())),
        (ShapeKind::Timestamp { .. }, Value::Timestamp(t)) => {
            match timestamp_format(member, TimestampFormat::UnixTimestamp) {
                TimestampFormat::UnixTimestamp => Json::Number(timestamp::epoch_seconds(t)),
                format => Json::String(timestamp::format(t, format)),
            }
        }
        (ShapeKind::Structure(structure), Value::Structure(fields)) => {
            Json::Object(encode_object(structure, fields, path, |_| true)?)
        }
        (ShapeKind::List(list), Value::List(items)) => Json::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| encode_json(&list.member, item, &format!("{path}[{i}]")))
                .collect::<Result<_, _>>()?,
        ),
        (ShapeKind::Map(map), Value::Map(entries)) => {
            let mut object = JsonMap::new();
            for (key, item) in entries {
                object.insert(key.clone(), encode_json(&map.value, item, &child_path(path, key))?);
            }
            Json::Object(object)
        }
        _ => return Err(mismatch(path, shape, value)),
    };
    Ok(json)
}

/// JSON error body: `{"__type": code, "message": message, ...detail}`.
pub(crate) fn error_body(error: &WireError) -> Vec<u8> {
    let mut object = JsonMap::new();
    object.insert("__type".to_string(), Json::String(error.code.clone()));
    object.insert("message".to_string(), Json::String(error.message.clone()));
    for (member, value) in error.detail_members() {
        if let Ok(json) = encode_json(member, value, &member.name) {
            object.insert(member.wire_name().to_string(), json);
        }
    }
    serde_json::to_vec(&Json::Object(object)).unwrap_or_default()
}

/// Reads `(code, message)` from a JSON error body. The code may carry a
/// namespace (`ns#Code`) or a trailing `:reason`.
pub(crate) fn error_fields(body: &Json, header_code: Option<&str>) -> (String, String) {
    let raw_code = header_code
        .or_else(|| body.get("__type").and_then(Json::as_str))
        .or_else(|| body.get("code").and_then(Json::as_str))
        .unwrap_or_default();
    let code = raw_code.rsplit('#').next().unwrap_or(raw_code);
    let code = code.split(':').next().unwrap_or(code);
    let message = body
        .get("message")
        .or_else(|| body.get("Message"))
        .and_then(Json::as_str)
        .unwrap_or_default();
    (code.to_string(), message.to_string())
}

// ---------------------------------------------------------------------------
// ProtocolCodec
// ---------------------------------------------------------------------------

impl ProtocolCodec for JsonCodec {
    fn protocol(&self) -> Protocol {
        Protocol::Json
    }

    fn parse_request(
        &self,
        _service: &ServiceModel,
        operation: &OperationModel,
        request: &ServiceRequest,
    ) -> Result<Value, DecodeError> {
        let body = parse_body(&request.body)?;
        let Some(structure) = operation.input.as_ref().and_then(|s| s.as_structure()) else {
            return Ok(Value::empty_structure());
        };
        let Json::Object(object) = &body else {
            return Err(DecodeError::serialization(&operation.name, "structure", format!("got {}", json_kind(&body))));
        };
        decode_object(structure, object, "", |_| true).map(Value::Structure)
    }

    fn serialize_response(
        &self,
        service: &ServiceModel,
        operation: &OperationModel,
        output: &Value,
        request_id: &str,
    ) -> Result<ServiceResponse, EncodeError> {
        let object = match operation.output.as_deref() {
            Some(shape) => {
                let fields = structure_fields(shape, output, &operation.name)?;
                match shape.as_structure() {
                    Some(structure) => encode_object(structure, fields, "", |_| true)?,
                    None => JsonMap::new(),
                }
            }
            None => JsonMap::new(),
        };
        let body = serde_json::to_vec(&Json::Object(object)).unwrap_or_default();
        Ok(response(
            StatusCode::from_u16(operation.http.response_code).unwrap_or(StatusCode::OK),
            content_type(service),
            body,
            request_id,
        ))
    }

    fn serialize_error(
        &self,
        service: &ServiceModel,
        _operation: Option<&OperationModel>,
        error: &WireError,
        request_id: &str,
    ) -> ServiceResponse {
        response(error.status, content_type(service), error_body(error), request_id)
    }

    fn serialize_request(
        &self,
        service: &ServiceModel,
        operation: &OperationModel,
        input: &Value,
    ) -> Result<ServiceRequest, EncodeError> {
        let object = match operation.input.as_deref() {
            Some(shape) => {
                let fields = structure_fields(shape, input, &operation.name)?;
                match shape.as_structure() {
                    Some(structure) => encode_object(structure, fields, "", |_| true)?,
                    None => JsonMap::new(),
                }
            }
            None => JsonMap::new(),
        };
        let prefix = service
            .metadata()
            .target_prefix
            .clone()
            .unwrap_or_else(|| service.name().to_string());
        let (target_name, target_value) =
            super::header(TARGET_HEADER, &format!("{prefix}.{}", operation.name))?;
        let (type_name, type_value) = super::header("content-type", content_type(service))?;
        Ok(ServiceRequest::new(Method::POST, "/")
            .with_header(target_name, target_value)
            .with_header(type_name, type_value)
            .with_body(serde_json::to_vec(&Json::Object(object)).unwrap_or_default()))
    }

    fn parse_response(
        &self,
        _service: &ServiceModel,
        operation: &OperationModel,
        response: &ServiceResponse,
    ) -> Result<Value, DecodeError> {
        let body = parse_body(&response.body)?;
        let request_id = response.header(REQUEST_ID_HEADER).map(str::to_string);

        if response.status.as_u16() >= 300 {
            let (code, message) = error_fields(&body, None);
            let fields = BTreeMap::from([error_entry(code, message)]);
            return Ok(with_metadata(fields, request_id, response.status));
        }

        let fields = match (operation.output.as_ref().and_then(|s| s.as_structure()), &body) {
            (Some(structure), Json::Object(object)) => decode_object(structure, object, "", |_| true)?,
            _ => BTreeMap::new(),
        };
        Ok(with_metadata(fields, request_id, response.status))
    }
}
