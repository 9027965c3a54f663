//! REST-XML protocol: HTTP bindings plus an XML document body.

use std::collections::BTreeMap;

use bytes::Bytes;
use http::{HeaderName, HeaderValue, StatusCode};
use mockstack_core::{Member, OperationModel, Protocol, ServiceModel, Shape, StructureShape, Value};

use super::rest::{
    decode_request_bindings, decode_response_bindings, encode_request_bindings,
    encode_response_bindings, payload, raw_payload, raw_payload_bytes, Payload,
};
use super::xml::{decode_members, decode_value, encode_members, encode_value, XmlNode};
use super::{
    error_entry, header, response, structure_fields, with_metadata, DecodeError, EncodeError,
    ProtocolCodec, WireError, REQUEST_ID_HEADER,
};
use crate::service::operation::{ServiceRequest, ServiceResponse};

/// Second request-id header written by REST-XML services.
pub(crate) const AMZ_REQUEST_ID_HEADER: &str = "x-amz-request-id";

const CONTENT_TYPE: &str = "application/xml";

/// Codec for the `rest-xml` protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestXmlCodec;

fn namespace(service: &ServiceModel, shape: &Shape) -> String {
    shape
        .xml_namespace
        .clone()
        .unwrap_or_else(|| service.xml_namespace())
}

fn decode_body(structure: &StructureShape, body: &Bytes) -> Result<BTreeMap<String, Value>, DecodeError> {
    let mut fields = BTreeMap::new();
    match payload(structure) {
        Payload::Raw(member) => {
            if let Some(value) = raw_payload(member, body)? {
                fields.insert(member.name.clone(), value);
            }
        }
        Payload::Document(member) => {
            if !is_blank(body) {
                let root = XmlNode::parse(body)?;
                fields.insert(member.name.clone(), decode_value(&root, member, &member.name)?);
            }
        }
        Payload::Members => {
            if !is_blank(body) {
                fields = decode_members(&XmlNode::parse(body)?, structure, "")?;
            }
        }
    }
    Ok(fields)
}

fn is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

fn document_root_name<'a>(member: &'a Member) -> &'a str {
    member
        .location_name
        .as_deref()
        .unwrap_or_else(|| member.shape.xml_root_name())
}

/// Body bytes and content type for the body-bound part of `fields`.
fn encode_body(
    service: &ServiceModel,
    shape: &Shape,
    structure: &StructureShape,
    fields: &BTreeMap<String, Value>,
) -> Result<(Bytes, &'static str), EncodeError> {
    match payload(structure) {
        Payload::Raw(member) => match fields.get(&member.name) {
            Some(value) => Ok((raw_payload_bytes(member, value)?, "application/octet-stream")),
            None => Ok((Bytes::new(), CONTENT_TYPE)),
        },
        Payload::Document(member) => match fields.get(&member.name) {
            Some(value) => {
                let mut root = encode_value(document_root_name(member), member, value, &member.name)?;
                root.attributes
                    .insert(0, ("xmlns".to_string(), namespace(service, &member.shape)));
                Ok((root.to_document().into(), CONTENT_TYPE))
            }
            None => Ok((Bytes::new(), CONTENT_TYPE)),
        },
        Payload::Members => {
            if !structure.members.iter().any(|m| m.in_body() && fields.contains_key(&m.name)) {
                return Ok((Bytes::new(), CONTENT_TYPE));
            }
            let mut root = XmlNode::new(shape.xml_root_name()).with_attribute("xmlns", namespace(service, shape));
            encode_members(&mut root, structure, fields, "")?;
            Ok((root.to_document().into(), CONTENT_TYPE))
        }
    }
}

fn with_amz_request_id(mut response: ServiceResponse, request_id: &str) -> ServiceResponse {
    if let Ok(id) = HeaderValue::from_str(request_id) {
        response
            .headers
            .insert(HeaderName::from_static(AMZ_REQUEST_ID_HEADER), id);
    }
    response
}

impl ProtocolCodec for RestXmlCodec {
    fn protocol(&self) -> Protocol {
        Protocol::RestXml
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
        service: &ServiceModel,
        operation: &OperationModel,
        output: &Value,
        request_id: &str,
    ) -> Result<ServiceResponse, EncodeError> {
        let default_status = StatusCode::from_u16(operation.http.response_code).unwrap_or(StatusCode::OK);
        let shape = operation.output.as_deref();
        let Some((shape, structure)) = shape.and_then(|s| s.as_structure().map(|st| (s, st))) else {
            let response = response(default_status, CONTENT_TYPE, Bytes::new(), request_id);
            return Ok(with_amz_request_id(response, request_id));
        };
        let fields = structure_fields(shape, output, &operation.name)?;

        let (body, content_type) = encode_body(service, shape, structure, fields)?;
        let mut response = response(default_status, content_type, body, request_id);
        if let Some(status) = encode_response_bindings(structure, fields, &mut response)? {
            response.status = status;
        }
        Ok(with_amz_request_id(response, request_id))
    }

    fn serialize_error(
        &self,
        service: &ServiceModel,
        _operation: Option<&OperationModel>,
        error: &WireError,
        request_id: &str,
    ) -> ServiceResponse {
        let mut detail = XmlNode::new("Error")
            .with_child(XmlNode::text("Type", error.fault_type()))
            .with_child(XmlNode::text("Code", error.code.as_str()))
            .with_child(XmlNode::text("Message", error.message.as_str()));
        for (member, value) in error.detail_members() {
            if let Ok(node) = encode_value(member.wire_name(), member, value, &member.name) {
                detail.push(node);
            }
        }
        let root = XmlNode::new("ErrorResponse")
            .with_attribute("xmlns", service.xml_namespace())
            .with_child(detail)
            .with_child(XmlNode::text("RequestId", request_id));
        let response = response(error.status, CONTENT_TYPE, root.to_document(), request_id);
        with_amz_request_id(response, request_id)
    }

    fn serialize_request(
        &self,
        service: &ServiceModel,
        operation: &OperationModel,
        input: &Value,
    ) -> Result<ServiceRequest, EncodeError> {
        let empty = BTreeMap::new();
        let shape = operation.input.as_deref();
        let fields = match shape {
            Some(shape) => structure_fields(shape, input, &operation.name)?,
            None => &empty,
        };
        let structure = shape.and_then(Shape::as_structure);
        let mut request = encode_request_bindings(operation, structure, fields)?;
        if let (Some(shape), Some(structure)) = (shape, structure) {
            let (body, content_type) = encode_body(service, shape, structure, fields)?;
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
        let header_id = response
            .header(REQUEST_ID_HEADER)
            .or_else(|| response.header(AMZ_REQUEST_ID_HEADER))
            .map(str::to_string);

        if response.status.as_u16() >= 300 {
            let (code, message, request_id) = if is_blank(&response.body) {
                (String::new(), String::new(), header_id)
            } else {
                let root = XmlNode::parse(&response.body)?;
                let error = match root.name.as_str() {
                    "ErrorResponse" => root.child("Error"),
                    _ => Some(&root),
                };
                let code = error.and_then(|e| e.child_text("Code")).unwrap_or_default();
                let message = error.and_then(|e| e.child_text("Message")).unwrap_or_default();
                let request_id = root
                    .child_text("RequestId")
                    .map(str::to_string)
                    .or(header_id);
                (code.to_string(), message.to_string(), request_id)
            };
            let fields = BTreeMap::from([error_entry(code, message)]);
            return Ok(with_metadata(fields, request_id, response.status));
        }

        let mut fields = BTreeMap::new();
        if let Some(structure) = operation.output.as_ref().and_then(|s| s.as_structure()) {
            fields = decode_body(structure, &response.body)?;
            fields.extend(decode_response_bindings(structure, response)?);
        }
        Ok(with_metadata(fields, header_id, response.status))
    }
}

#[cfg(test)]
mod tests {
    use http::Method;
    use mockstack_core::parse_model;

    use super::*;

    const BUCKETS: &str = r#"{
        "metadata": {
            "protocol": "rest-xml",
            "apiVersion": "2006-03-01",
            "xmlNamespace": "http://s3.amazonaws.com/doc/2006-03-01/"
        },
        "operations": {
            "ListBuckets": {
                "http": {"method": "GET", "requestUri": "/"},
                "output": {"shape": "ListBucketsOutput"}
            },
            "PutObject": {
                "http": {"method": "PUT", "requestUri": "/{Bucket}/{Key+}"},
                "input": {"shape": "PutObjectRequest"},
                "output": {"shape": "PutObjectOutput"}
            },
            "PutBucketTagging": {
                "http": {"method": "PUT", "requestUri": "/{Bucket}?tagging"},
                "input": {"shape": "PutBucketTaggingRequest"}
            }
        },
        "shapes": {
            "ListBucketsOutput": {
                "type": "structure",
                "locationName": "ListAllMyBucketsResult",
                "members": {
                    "Buckets": {"shape": "Buckets"},
                    "Owner": {"shape": "Owner"}
                }
            },
            "Buckets": {"type": "list", "member": {"shape": "Bucket", "locationName": "Bucket"}},
            "Bucket": {
                "type": "structure",
                "members": {"Name": {"shape": "String"}, "CreationDate": {"shape": "Timestamp"}}
            },
            "Owner": {
                "type": "structure",
                "members": {
                    "ID": {"shape": "String"},
                    "Kind": {"shape": "String", "xmlAttribute": true, "locationName": "kind"}
                }
            },
            "PutObjectRequest": {
                "type": "structure",
                "required": ["Bucket", "Key"],
                "members": {
                    "Bucket": {"shape": "String", "location": "uri", "locationName": "Bucket"},
                    "Key": {"shape": "String", "location": "uri", "locationName": "Key"},
                    "Body": {"shape": "Blob"},
                    "ContentType": {"shape": "String", "location": "header", "locationName": "Content-Type"},
                    "Metadata": {"shape": "Metadata", "location": "headers", "locationName": "x-amz-meta-"}
                },
                "payload": "Body"
            },
            "PutObjectOutput": {
                "type": "structure",
                "members": {"ETag": {"shape": "String", "location": "header", "locationName": "ETag"}}
            },
            "PutBucketTaggingRequest": {
                "type": "structure",
                "required": ["Bucket", "Tagging"],
                "members": {
                    "Bucket": {"shape": "String", "location": "uri", "locationName": "Bucket"},
                    "Tagging": {"shape": "Tagging", "locationName": "Tagging"}
                },
                "payload": "Tagging"
            },
            "Tagging": {"type": "structure", "members": {"TagSet": {"shape": "TagSet"}}},
            "TagSet": {"type": "list", "member": {"shape": "Tag", "locationName": "Tag"}},
            "Tag": {"type": "structure", "members": {"Key": {"shape": "String"}, "Value": {"shape": "String"}}},
            "Metadata": {"type": "map", "key": {"shape": "String"}, "value": {"shape": "String"}},
            "String": {"type": "string"},
            "Blob": {"type": "blob"},
            "Timestamp": {"type": "timestamp"}
        }
    }"#;

    fn model() -> ServiceModel {
        parse_model("s3", BUCKETS).unwrap()
    }

    #[test]
    fn list_output_uses_shape_root_and_namespace() {
        let model = model();
        let op = model.operation("ListBuckets").unwrap();
        let output = Value::structure([
            (
                "Buckets",
                Value::List(vec![Value::structure([("Name", Value::from("logs"))])]),
            ),
            (
                "Owner",
                Value::structure([("ID", Value::from("abc")), ("Kind", Value::from("user"))]),
            ),
        ]);
        let response = RestXmlCodec.serialize_response(&model, op, &output, "RID").unwrap();
        let root = XmlNode::parse(&response.body).unwrap();
        assert_eq!(root.name, "ListAllMyBucketsResult");
        assert_eq!(root.attribute("xmlns"), Some("http://s3.amazonaws.com/doc/2006-03-01/"));
        assert_eq!(
            root.child("Buckets").and_then(|b| b.child("Bucket")).and_then(|b| b.child_text("Name")),
            Some("logs")
        );
        assert_eq!(root.child("Owner").and_then(|o| o.attribute("kind")), Some("user"));
        assert_eq!(response.header("x-amz-request-id"), Some("RID"));
        assert_eq!(response.header("x-amzn-requestid"), Some("RID"));

        let parsed = RestXmlCodec.parse_response(&model, op, &response).unwrap();
        assert_eq!(parsed.get("Owner"), output.get("Owner"));
        assert_eq!(parsed.get("Buckets"), output.get("Buckets"));
    }

    #[test]
    fn raw_payload_with_greedy_key_and_metadata_headers() {
        let model = model();
        let op = model.operation("PutObject").unwrap();
        let request = ServiceRequest::new(Method::PUT, "/my-bucket/photos/2021/cat.jpg")
            .with_header(HeaderName::from_static("content-type"), HeaderValue::from_static("image/jpeg"))
            .with_header(HeaderName::from_static("x-amz-meta-owner"), HeaderValue::from_static("me"))
            .with_body(&b"\xff\xd8binary"[..]);
        let input = RestXmlCodec.parse_request(&model, op, &request).unwrap();
        assert_eq!(input.get("Bucket"), Some(&Value::from("my-bucket")));
        assert_eq!(input.get("Key"), Some(&Value::from("photos/2021/cat.jpg")));
        assert_eq!(input.get("Body"), Some(&Value::Blob(b"\xff\xd8binary".to_vec())));
        assert_eq!(input.get("ContentType"), Some(&Value::from("image/jpeg")));
        assert_eq!(input.get("Metadata"), Some(&Value::map([("owner", Value::from("me"))])));
    }

    #[test]
    fn structure_payload_round_trips_through_client_request() {
        let model = model();
        let op = model.operation("PutBucketTagging").unwrap();
        let input = Value::structure([
            ("Bucket", Value::from("b")),
            (
                "Tagging",
                Value::structure([(
                    "TagSet",
                    Value::List(vec![Value::structure([
                        ("Key", Value::from("env")),
                        ("Value", Value::from("dev")),
                    ])]),
                )]),
            ),
        ]);
        let request = RestXmlCodec.serialize_request(&model, op, &input).unwrap();
        assert_eq!(request.path, "/b");
        assert_eq!(request.query.as_deref(), Some("tagging"));
        assert_eq!(XmlNode::parse(&request.body).unwrap().name, "Tagging");
        assert_eq!(RestXmlCodec.parse_request(&model, op, &request).unwrap(), input);
    }

    #[test]
    fn output_without_body_members_has_empty_body() {
        let model = model();
        let op = model.operation("PutObject").unwrap();
        let output = Value::structure([("ETag", Value::from("\"e\""))]);
        let response = RestXmlCodec.serialize_response(&model, op, &output, "RID").unwrap();
        assert!(response.body.is_empty());
        assert_eq!(response.header("etag"), Some("\"e\""));
    }

    #[test]
    fn error_document_and_bare_error_root() {
        let model = model();
        let error = WireError::new(StatusCode::NOT_FOUND, "NoSuchBucket", "The specified bucket does not exist");
        let response = RestXmlCodec.serialize_error(&model, None, &error, "RID");
        let root = XmlNode::parse(&response.body).unwrap();
        assert_eq!(root.name, "ErrorResponse");
        assert_eq!(root.child("Error").and_then(|e| e.child_text("Type")), Some("Sender"));
        assert_eq!(root.child_text("RequestId"), Some("RID"));

        let op = model.operation("ListBuckets").unwrap();
        let mut bare = ServiceResponse::new(StatusCode::NOT_FOUND);
        bare.body = Bytes::from_static(
            b"<Error><Code>NoSuchKey</Code><Message>gone</Message><RequestId>X1</RequestId></Error>",
        );
        let parsed = RestXmlCodec.parse_response(&model, op, &bare).unwrap();
        assert_eq!(
            parsed.get("Error").and_then(|e| e.get("Code")),
            Some(&Value::from("NoSuchKey"))
        );
        assert_eq!(
            parsed.get("ResponseMetadata").and_then(|m| m.get("RequestId")),
            Some(&Value::from("X1"))
        );
    }
}
