//! REST-JSON protocol: HTTP bindings plus a JSON document body.

use std::collections::BTreeMap;

use bytes::Bytes;
use http::{HeaderName, HeaderValue, StatusCode};
use mockstack_core::{OperationModel, Protocol, ServiceModel, StructureShape, Value};
use serde_json::Value as Json;

use super::json::{decode_json, decode_object, encode_json, encode_object, error_body, error_fields, parse_body};
use super::rest::{
    decode_request_bindings, decode_response_bindings, encode_request_bindings,
    encode_response_bindings, payload, raw_payload, raw_payload_bytes, Payload,
};
use super::{
    error_entry, header, response, structure_fields, with_metadata, DecodeError, EncodeError,
    ProtocolCodec, WireError, REQUEST_ID_HEADER,
};
use crate::service::operation::{ServiceRequest, ServiceResponse};

/// Header naming the error code on REST-JSON error responses.
pub(crate) const ERROR_TYPE_HEADER: &str = "x-amzn-errortype";

const CONTENT_TYPE: &str = "application/json";

/// Codec for the `rest-json` protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestJsonCodec;

fn decode_body(structure: &StructureShape, body: &Bytes) -> Result<BTreeMap<String, Value>, DecodeError> {
    let mut fields = BTreeMap::new();
    match payload(structure) {
        Payload::Raw(member) => {
            if let Some(value) = raw_payload(member, body)? {
                fields.insert(member.name.clone(), value);
            }
        }
        Payload::Document(member) => {
            if !body.is_empty() {
                let json = parse_body(body)?;
                fields.insert(member.name.clone(), decode_json(member, &json, &member.name)?);
            }
        }
        Payload::Members => match parse_body(body)? {
            Json::Object(object) => fields = decode_object(structure, &object, "", |m| m.in_body())?,
            other => {
                return Err(DecodeError::Malformed {
                    format: "json",
                    reason: format!("expected an object, got {other}"),
                })
            }
        },
    }
    Ok(fields)
}

/// Body bytes and content type for the body-bound part of `fields`.
fn encode_body(
    structure: &StructureShape,
    fields: &BTreeMap<String, Value>,
) -> Result<(Bytes, &'static str), EncodeError> {
    match payload(structure) {
        Payload::Raw(member) => match fields.get(&member.name) {
            Some(value) => {
                let content_type = if matches!(value, Value::String(_)) {
                    "text/plain"
                } else {
                    "application/octet-stream"
                };
                Ok((raw_payload_bytes(member, value)?, content_type))
            }
            None => Ok((Bytes::new(), CONTENT_TYPE)),
        },
        Payload::Document(member) => match fields.get(&member.name) {
            Some(value) => {
                let json = encode_json(member, value, &member.name)?;
                Ok((serde_json::to_vec(&json).unwrap_or_default().into(), CONTENT_TYPE))
            }
            None => Ok((Bytes::from_static(b"{}"), CONTENT_TYPE)),
        },
        Payload::Members => {
            let object = encode_object(structure, fields, "", |m| m.in_body())?;
            Ok((serde_json::to_vec(&Json::Object(object)).unwrap_or_default().into(), CONTENT_TYPE))
        }
    }
}

impl ProtocolCodec for RestJsonCodec {
    fn protocol(&self) -> Protocol {
        Protocol::RestJson
    }

    fn parse_request(
        &self,
        _service: &ServiceModel,
        operation: &OperationModel,
        request: &ServiceRequest,
    ) -> Result<Value, DecodeError> {
        let Some(structure) = operation.input.as_ref().and_then(|s| s.as_structure()) else {
            return Ok(Value::empty_structure());
        };
        let mut fields = decode_body(structure, &request.body)?;
        fields.extend(decode_request_bindings(operation, structure, request)?);
        Ok(Value::Structure(fields))
    }

    fn serialize_response(
        &self,
        _service: &ServiceModel,
        operation: &OperationModel,
        output: &Value,
        request_id: &str,
    ) -> Result<ServiceResponse, EncodeError> {
        let default_status = StatusCode::from_u16(operation.http.response_code).unwrap_or(StatusCode::OK);
        let Some(shape) = operation.output.as_deref() else {
            return Ok(response(default_status, CONTENT_TYPE, Bytes::from_static(b"{}"), request_id));
        };
        let fields = structure_fields(shape, output, &operation.name)?;
        let Some(structure) = shape.as_structure() else {
            return Ok(response(default_status, CONTENT_TYPE, Bytes::from_static(b"{}"), request_id));
        };

        let (body, content_type) = encode_body(structure, fields)?;
        let mut response = response(default_status, content_type, body, request_id);
        if let Some(status) = encode_response_bindings(structure, fields, &mut response)? {
            response.status = status;
        }
        Ok(response)
    }

    fn serialize_error(
        &self,
        _service: &ServiceModel,
        _operation: Option<&OperationModel>,
        error: &WireError,
        request_id: &str,
    ) -> ServiceResponse {
        let mut response = response(error.status, CONTENT_TYPE, error_body(error), request_id);
        if let Ok(code) = HeaderValue::from_str(&error.code) {
            response
                .headers
                .insert(HeaderName::from_static(ERROR_TYPE_HEADER), code);
        }
        response
    }

    fn serialize_request(
        &self,
        _service: &ServiceModel,
        operation: &OperationModel,
        input: &Value,
    ) -> Result<ServiceRequest, EncodeError> {
        let empty = BTreeMap::new();
        let fields = match operation.input.as_deref() {
            Some(shape) => structure_fields(shape, input, &operation.name)?,
            None => &empty,
        };
        let structure = operation.input.as_deref().and_then(|s| s.as_structure());
        let mut request = encode_request_bindings(operation, structure, fields)?;
        if let Some(structure) = structure {
            let (body, content_type) = encode_body(structure, fields)?;
            if !body.is_empty() {
                let (name, value) = header("content-type", content_type)?;
                request.headers.entry(name).or_insert(value);
                request.body = body;
            }
        }
        Ok(request)
    }

    fn parse_response(
        &self,
        _service: &ServiceModel,
        operation: &OperationModel,
        response: &ServiceResponse,
    ) -> Result<Value, DecodeError> {
        let request_id = response.header(REQUEST_ID_HEADER).map(str::to_string);

        if response.status.as_u16() >= 300 {
            let body = parse_body(&response.body)?;
            let (code, message) = error_fields(&body, response.header(ERROR_TYPE_HEADER));
            let fields = BTreeMap::from([error_entry(code, message)]);
            return Ok(with_metadata(fields, request_id, response.status));
        }

        let mut fields = BTreeMap::new();
        if let Some(structure) = operation.output.as_ref().and_then(|s| s.as_structure()) {
            fields = decode_body(structure, &response.body)?;
            fields.extend(decode_response_bindings(structure, response)?);
        }
        Ok(with_metadata(fields, request_id, response.status))
    }
}
