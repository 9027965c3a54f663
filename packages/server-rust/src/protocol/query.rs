//! Query and EC2 protocols: form-encoded requests, XML responses.

use std::collections::{BTreeMap, HashMap};

use http::{Method, StatusCode};
use mockstack_core::{
    Member, OperationModel, Protocol, ServiceModel, Shape, ShapeKind, StructureShape,
    TimestampFormat, Value,
};

use super::xml::{decode_members, encode_members, XmlNode};
use super::{
    error_entry, mismatch, response, scalar_from_text, scalar_to_text,
    structure_fields, timestamp_format, with_metadata, DecodeError, EncodeError, ProtocolCodec,
    WireError, REQUEST_ID_HEADER,
};
use crate::service::operation::{ServiceRequest, ServiceResponse};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";
const XML_CONTENT_TYPE: &str = "text/xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Query,
    Ec2,
}

/// Codec for the `query` and `ec2` protocols.
#[derive(Debug, Clone, Copy)]
pub struct QueryCodec {
    dialect: Dialect,
}

impl QueryCodec {
    #[must_use]
    pub const fn query() -> Self {
        Self {
            dialect: Dialect::Query,
        }
    }

    #[must_use]
    pub const fn ec2() -> Self {
        Self {
            dialect: Dialect::Ec2,
        }
    }

    /// Parameter name of a member in this dialect.
    fn param_name<'a>(&self, member: &'a Member) -> std::borrow::Cow<'a, str> {
        match self.dialect {
            Dialect::Query => member.wire_name().into(),
            Dialect::Ec2 => {
                if let Some(name) = &member.query_name {
                    name.as_str().into()
                } else if let Some(name) = &member.location_name {
                    capitalize(name).into()
                } else {
                    member.name.as_str().into()
                }
            }
        }
    }

    /// Key segment between a list parameter and its index, if any.
    fn list_infix(&self, member: &Member) -> Option<String> {
        let ShapeKind::List(list) = &member.shape.kind else {
            return None;
        };
        if self.dialect == Dialect::Ec2 || member.flattened || list.flattened {
            None
        } else {
            Some(list.member.location_name.clone().unwrap_or_else(|| "member".to_string()))
        }
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Form parameters of a query request: body for POST, URL query otherwise.
/// URL parameters are included for POST too, body values winning.
fn request_params(request: &ServiceRequest) -> HashMap<String, String> {
    let mut params: HashMap<String, String> = request.query_pairs().into_iter().collect();
    if request.method == Method::POST {
        params.extend(request.form_pairs());
    }
    params
}

/// The `Action` parameter of a query request.
pub(crate) fn action(request: &ServiceRequest) -> Option<String> {
    request_params(request).remove("Action")
}

// ---------------------------------------------------------------------------
// Request decoding
// ---------------------------------------------------------------------------

struct Params<'a> {
    codec: QueryCodec,
    values: &'a HashMap<String, String>,
}

impl Params<'_> {
    fn has_prefix(&self, key: &str) -> bool {
        let nested = format!("{key}.");
        self.values.contains_key(key) || self.values.keys().any(|k| k.starts_with(&nested))
    }

    fn structure(&self, structure: &StructureShape, prefix: &str) -> Result<BTreeMap<String, Value>, DecodeError> {
        let mut fields = BTreeMap::new();
        for member in &structure.members {
            let key = format!("{prefix}{}", self.codec.param_name(member));
            if let Some(value) = self.member(member, &key)? {
                fields.insert(member.name.clone(), value);
            }
        }
        Ok(fields)
    }

    fn member(&self, member: &Member, key: &str) -> Result<Option<Value>, DecodeError> {
        self.value(&member.shape, member, key)
    }

    fn value(&self, shape: &Shape, member: &Member, key: &str) -> Result<Option<Value>, DecodeError> {
        match &shape.kind {
            ShapeKind::Structure(structure) => {
                if !self.has_prefix(key) {
                    return Ok(None);
                }
                self.structure(structure, &format!("{key}."))
                    .map(|f| Some(Value::Structure(f)))
            }
            ShapeKind::List(list) => {
                if self.values.get(key).is_some_and(String::is_empty) {
                    return Ok(Some(Value::List(Vec::new())));
                }
                let base = match self.codec.list_infix(member) {
                    Some(infix) => format!("{key}.{infix}"),
                    None => key.to_string(),
                };
                let mut items = Vec::new();
                for index in 1.. {
                    let item_key = format!("{base}.{index}");
                    match self.value(&list.member.shape, &list.member, &item_key)? {
                        Some(item) => items.push(item),
                        None => break,
                    }
                }
                Ok((!items.is_empty()).then_some(Value::List(items)))
            }
            ShapeKind::Map(map) => {
                let flattened = member.flattened || map.flattened;
                let base = if flattened { key.to_string() } else { format!("{key}.entry") };
                let key_name = map.key.location_name.as_deref().unwrap_or("key");
                let value_name = map.value.location_name.as_deref().unwrap_or("value");
                let mut entries = BTreeMap::new();
                for index in 1.. {
                    let Some(entry_key) = self.values.get(&format!("{base}.{index}.{key_name}")) else {
                        break;
                    };
                    let value_key = format!("{base}.{index}.{value_name}");
                    if let Some(value) = self.value(&map.value.shape, &map.value, &value_key)? {
                        entries.insert(entry_key.clone(), value);
                    }
                }
                Ok((!entries.is_empty()).then_some(Value::Map(entries)))
            }
            _ => self
                .values
                .get(key)
                .map(|text| scalar_from_text(shape, text, timestamp_format(member, TimestampFormat::Iso8601), key))
                .transpose(),
        }
    }
}

// ---------------------------------------------------------------------------
// Request encoding (client side)
// ---------------------------------------------------------------------------

impl QueryCodec {
    fn flatten_structure(
        &self,
        structure: &StructureShape,
        fields: &BTreeMap<String, Value>,
        prefix: &str,
        out: &mut Vec<(String, String)>,
    ) -> Result<(), EncodeError> {
        for member in &structure.members {
            if let Some(value) = fields.get(&member.name) {
                let key = format!("{prefix}{}", self.param_name(member));
                self.flatten_value(&member.shape, member, value, &key, out)?;
            }
        }
        Ok(())
    }

    fn flatten_value(
        &self,
        shape: &Shape,
        member: &Member,
        value: &Value,
        key: &str,
        out: &mut Vec<(String, String)>,
    ) -> Result<(), EncodeError> {
        match (&shape.kind, value) {
            (ShapeKind::Structure(structure), Value::Structure(fields)) => {
                self.flatten_structure(structure, fields, &format!("{key}."), out)
            }
            (ShapeKind::List(list), Value::List(items)) => {
                if items.is_empty() {
                    if self.dialect == Dialect::Query {
                        out.push((key.to_string(), String::new()));
                    }
                    return Ok(());
                }
                let base = match self.list_infix(member) {
                    Some(infix) => format!("{key}.{infix}"),
                    None => key.to_string(),
                };
                for (index, item) in items.iter().enumerate() {
                    let item_key = format!("{base}.{}", index + 1);
                    self.flatten_value(&list.member.shape, &list.member, item, &item_key, out)?;
                }
                Ok(())
            }
            (ShapeKind::Map(map), Value::Map(entries)) => {
                let flattened = member.flattened || map.flattened;
                let base = if flattened { key.to_string() } else { format!("{key}.entry") };
                let key_name = map.key.location_name.as_deref().unwrap_or("key");
                let value_name = map.value.location_name.as_deref().unwrap_or("value");
                for (index, (entry_key, item)) in entries.iter().enumerate() {
                    let entry = format!("{base}.{}", index + 1);
                    out.push((format!("{entry}.{key_name}"), entry_key.clone()));
                    self.flatten_value(&map.value.shape, &map.value, item, &format!("{entry}.{value_name}"), out)?;
                }
                Ok(())
            }
            (ShapeKind::Structure(_) | ShapeKind::List(_) | ShapeKind::Map(_), _) => {
                Err(mismatch(key, shape, value))
            }
            _ => {
                let text = scalar_to_text(shape, value, timestamp_format(member, TimestampFormat::Iso8601), key)?;
                out.push((key.to_string(), text));
                Ok(())
            }
        }
    }

    fn response_root(&self, service: &ServiceModel, operation: &OperationModel) -> XmlNode {
        XmlNode::new(format!("{}Response", operation.name))
            .with_attribute("xmlns", service.xml_namespace())
    }
}

// ---------------------------------------------------------------------------
// ProtocolCodec
// ---------------------------------------------------------------------------

impl ProtocolCodec for QueryCodec {
    fn protocol(&self) -> Protocol {
        match self.dialect {
            Dialect::Query => Protocol::Query,
            Dialect::Ec2 => Protocol::Ec2,
        }
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
        let values = request_params(request);
        let params = Params {
            codec: *self,
            values: &values,
        };
        params.structure(structure, "").map(Value::Structure)
    }

    fn serialize_response(
        &self,
        service: &ServiceModel,
        operation: &OperationModel,
        output: &Value,
        request_id: &str,
    ) -> Result<ServiceResponse, EncodeError> {
        let mut root = self.response_root(service, operation);
        let output_shape = operation.output.as_deref();

        match self.dialect {
            Dialect::Query => {
                if let Some(shape) = output_shape {
                    let fields = structure_fields(shape, output, &operation.name)?;
                    let mut result = XmlNode::new(
                        operation
                            .result_wrapper
                            .clone()
                            .unwrap_or_else(|| format!("{}Result", operation.name)),
                    );
                    if let Some(structure) = shape.as_structure() {
                        encode_members(&mut result, structure, fields, "")?;
                    }
                    root.push(result);
                }
                root.push(
                    XmlNode::new("ResponseMetadata").with_child(XmlNode::text("RequestId", request_id)),
                );
            }
            Dialect::Ec2 => {
                root.push(XmlNode::text("requestId", request_id));
                if let Some(shape) = output_shape {
                    let fields = structure_fields(shape, output, &operation.name)?;
                    if let Some(structure) = shape.as_structure() {
                        encode_members(&mut root, structure, fields, "")?;
                    }
                }
            }
        }

        Ok(response(
            StatusCode::from_u16(operation.http.response_code).unwrap_or(StatusCode::OK),
            XML_CONTENT_TYPE,
            root.to_document(),
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
        let mut detail = XmlNode::new("Error");
        if self.dialect == Dialect::Query {
            detail.push(XmlNode::text("Type", error.fault_type()));
        }
        detail.push(XmlNode::text("Code", error.code.as_str()));
        detail.push(XmlNode::text("Message", error.message.as_str()));
        for (member, value) in error.detail_members() {
            // Detail members that fail to encode are dropped; the code and
            // message above are always present.
            if let Ok(node) = super::xml::encode_value(member.wire_name(), member, value, &member.name) {
                detail.push(node);
            }
        }

        let root = match self.dialect {
            Dialect::Query => XmlNode::new("ErrorResponse")
                .with_attribute("xmlns", service.xml_namespace())
                .with_child(detail)
                .with_child(XmlNode::text("RequestId", request_id)),
            Dialect::Ec2 => XmlNode::new("Response")
                .with_child(XmlNode::new("Errors").with_child(detail))
                .with_child(XmlNode::text("RequestID", request_id)),
        };
        response(error.status, XML_CONTENT_TYPE, root.to_document(), request_id)
    }

    fn serialize_request(
        &self,
        service: &ServiceModel,
        operation: &OperationModel,
        input: &Value,
    ) -> Result<ServiceRequest, EncodeError> {
        let mut params = vec![
            ("Action".to_string(), operation.name.clone()),
            ("Version".to_string(), service.metadata().api_version.clone()),
        ];
        if let Some(shape) = operation.input.as_deref() {
            let fields = structure_fields(shape, input, &operation.name)?;
            if let Some(structure) = shape.as_structure() {
                self.flatten_structure(structure, fields, "", &mut params)?;
            }
        }
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        let (name, value) = super::header("content-type", FORM_CONTENT_TYPE)?;
        Ok(ServiceRequest::new(Method::POST, "/")
            .with_header(name, value)
            .with_body(body))
    }

    fn parse_response(
        &self,
        _service: &ServiceModel,
        operation: &OperationModel,
        response: &ServiceResponse,
    ) -> Result<Value, DecodeError> {
        let root = XmlNode::parse(&response.body)?;
        let header_id = response.header(REQUEST_ID_HEADER).map(str::to_string);

        if response.status.as_u16() >= 300 {
            let error = match root.name.as_str() {
                "ErrorResponse" => root.child("Error"),
                "Response" => root.child("Errors").and_then(|e| e.child("Error")),
                _ => Some(&root),
            };
            let code = error.and_then(|e| e.child_text("Code")).unwrap_or_default();
            let message = error.and_then(|e| e.child_text("Message")).unwrap_or_default();
            let request_id = root
                .child_text("RequestId")
                .or_else(|| root.child_text("RequestID"))
                .map(str::to_string)
                .or(header_id);
            let fields = BTreeMap::from([error_entry(code.to_string(), message.to_string())]);
            return Ok(with_metadata(fields, request_id, response.status));
        }

        let mut fields = BTreeMap::new();
        if let Some(structure) = operation.output.as_ref().and_then(|s| s.as_structure()) {
            let container = match self.dialect {
                Dialect::Query => {
                    let wrapper = operation
                        .result_wrapper
                        .clone()
                        .unwrap_or_else(|| format!("{}Result", operation.name));
                    root.child(&wrapper)
                }
                Dialect::Ec2 => Some(&root),
            };
            if let Some(container) = container {
                fields = decode_members(container, structure, "")?;
            }
        }

        let request_id = match self.dialect {
            Dialect::Query => root
                .child("ResponseMetadata")
                .and_then(|m| m.child_text("RequestId")),
            Dialect::Ec2 => root.child_text("requestId"),
        }
        .map(str::to_string)
        .or(header_id);
        Ok(with_metadata(fields, request_id, response.status))
    }
}

#[cfg(test)]
mod tests {
    use mockstack_core::parse_model;
    use proptest::prelude::*;

    use super::*;

    const SQS: &str = r#"{
        "metadata": {"protocol": "query", "apiVersion": "2012-11-05", "endpointPrefix": "sqs"},
        "operations": {
            "SendMessage": {
                "input": {"shape": "SendMessageRequest"},
                "output": {"shape": "SendMessageResult", "resultWrapper": "SendMessageResult"},
                "errors": [{"shape": "QueueDoesNotExist"}]
            },
            "DeleteQueue": {"input": {"shape": "DeleteQueueRequest"}}
        },
        "shapes": {
            "SendMessageRequest": {
                "type": "structure",
                "required": ["QueueUrl", "MessageBody"],
                "members": {
                    "QueueUrl": {"shape": "String"},
                    "MessageBody": {"shape": "String"},
                    "DelaySeconds": {"shape": "Integer"},
                    "Attributes": {"shape": "AttributeMap", "locationName": "Attribute"},
                    "Labels": {"shape": "LabelList"},
                    "Counts": {"shape": "CountList", "locationName": "Count"},
                    "Nested": {"shape": "Nested"}
                }
            },
            "Nested": {"type": "structure", "members": {"Flag": {"shape": "Boolean"}}},
            "AttributeMap": {"type": "map", "key": {"shape": "String", "locationName": "Name"}, "value": {"shape": "String", "locationName": "Value"}, "flattened": true},
            "LabelList": {"type": "list", "member": {"shape": "String"}},
            "CountList": {"type": "list", "member": {"shape": "Integer"}, "flattened": true},
            "SendMessageResult": {
                "type": "structure",
                "members": {"MD5OfMessageBody": {"shape": "String"}, "MessageId": {"shape": "String"}}
            },
            "DeleteQueueRequest": {"type": "structure", "members": {"QueueUrl": {"shape": "String"}}},
            "QueueDoesNotExist": {
                "type": "structure",
                "members": {"message": {"shape": "String"}, "QueueUrl": {"shape": "String"}},
                "error": {"code": "AWS.SimpleQueueService.NonExistentQueue", "httpStatusCode": 400, "senderFault": true},
                "exception": true
            },
            "String": {"type": "string"},
            "Integer": {"type": "integer"},
            "Boolean": {"type": "boolean"}
        }
    }"#;

    const EC2: &str = r#"{
        "metadata": {"protocol": "ec2", "apiVersion": "2016-11-15", "endpointPrefix": "ec2"},
        "operations": {
            "DescribeRegions": {
                "input": {"shape": "DescribeRegionsRequest"},
                "output": {"shape": "DescribeRegionsResult"}
            }
        },
        "shapes": {
            "DescribeRegionsRequest": {
                "type": "structure",
                "members": {
                    "RegionNames": {"shape": "RegionNameList", "locationName": "RegionName"},
                    "AllRegions": {"shape": "Boolean", "locationName": "allRegions"}
                }
            },
            "RegionNameList": {"type": "list", "member": {"shape": "String", "locationName": "RegionName"}},
            "DescribeRegionsResult": {
                "type": "structure",
                "members": {"Regions": {"shape": "RegionList", "locationName": "regionInfo"}}
            },
            "RegionList": {"type": "list", "member": {"shape": "Region", "locationName": "item"}},
            "Region": {
                "type": "structure",
                "members": {"RegionName": {"shape": "String", "locationName": "regionName"}}
            },
            "String": {"type": "string"},
            "Boolean": {"type": "boolean"}
        }
    }"#;

    fn sqs() -> ServiceModel {
        parse_model("sqs", SQS).unwrap()
    }

    fn form(body: &str) -> ServiceRequest {
        ServiceRequest::new(Method::POST, "/").with_body(body.to_string())
    }

    #[test]
    fn action_is_read_from_body_or_url() {
        assert_eq!(action(&form("Action=SendMessage&QueueUrl=x")).as_deref(), Some("SendMessage"));
        let get = ServiceRequest::new(Method::GET, "/?Action=ListQueues");
        assert_eq!(action(&get).as_deref(), Some("ListQueues"));
        assert_eq!(action(&form("QueueUrl=x")), None);
    }

    #[test]
    fn decodes_nested_lists_and_maps() {
        let model = sqs();
        let op = model.operation("SendMessage").unwrap();
        let request = form(
            "Action=SendMessage&QueueUrl=http%3A%2F%2Fq&MessageBody=hi&DelaySeconds=5\
             &Attribute.1.Name=color&Attribute.1.Value=red\
             &Labels.member.1=a&Labels.member.2=b\
             &Count.1=3&Count.2=4&Nested.Flag=true",
        );
        let input = QueryCodec::query().parse_request(&model, op, &request).unwrap();
        assert_eq!(
            input,
            Value::structure([
                ("QueueUrl", Value::from("http://q")),
                ("MessageBody", Value::from("hi")),
                ("DelaySeconds", Value::Integer(5)),
                ("Attributes", Value::map([("color", Value::from("red"))])),
                ("Labels", Value::List(vec!["a".into(), "b".into()])),
                ("Counts", Value::List(vec![Value::Integer(3), Value::Integer(4)])),
                ("Nested", Value::structure([("Flag", Value::Boolean(true))])),
            ])
        );
    }

    #[test]
    fn empty_list_marker_decodes_to_empty_list() {
        let model = sqs();
        let op = model.operation("SendMessage").unwrap();
        let input = QueryCodec::query()
            .parse_request(&model, op, &form("QueueUrl=q&MessageBody=m&Labels="))
            .unwrap();
        assert_eq!(input.get("Labels"), Some(&Value::List(Vec::new())));
    }

    #[test]
    fn bad_integer_is_a_serialization_error() {
        let model = sqs();
        let op = model.operation("SendMessage").unwrap();
        let err = QueryCodec::query()
            .parse_request(&model, op, &form("QueueUrl=q&MessageBody=m&DelaySeconds=soon"))
            .unwrap_err();
        assert!(matches!(err, DecodeError::Serialization { path, .. } if path == "DelaySeconds"));
    }

    #[test]
    fn response_wraps_result_and_metadata() {
        let model = sqs();
        let op = model.operation("SendMessage").unwrap();
        let output = Value::structure([("MessageId", Value::from("m-1"))]);
        let response = QueryCodec::query()
            .serialize_response(&model, op, &output, "REQ1")
            .unwrap();
        let body = std::str::from_utf8(&response.body).unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert!(body.contains(
            "<SendMessageResponse xmlns=\"http://sqs.amazonaws.com/doc/2012-11-05/\">\
             <SendMessageResult><MessageId>m-1</MessageId></SendMessageResult>\
             <ResponseMetadata><RequestId>REQ1</RequestId></ResponseMetadata></SendMessageResponse>"
        ));
        assert_eq!(response.header("x-amzn-RequestId"), Some("REQ1"));
    }

    #[test]
    fn operation_without_output_still_has_metadata() {
        let model = sqs();
        let op = model.operation("DeleteQueue").unwrap();
        let response = QueryCodec::query()
            .serialize_response(&model, op, &Value::empty_structure(), "REQ2")
            .unwrap();
        let parsed = QueryCodec::query().parse_response(&model, op, &response).unwrap();
        assert_eq!(
            parsed,
            Value::structure([(
                "ResponseMetadata",
                Value::structure([
                    ("HTTPStatusCode", Value::Integer(200)),
                    ("RequestId", Value::from("REQ2")),
                ])
            )])
        );
    }

    #[test]
    fn error_document_round_trips() {
        let model = sqs();
        let op = model.operation("SendMessage").unwrap();
        let error = WireError::new(StatusCode::BAD_REQUEST, "AWS.SimpleQueueService.NonExistentQueue", "gone");
        let response = QueryCodec::query().serialize_error(&model, Some(op), &error, "REQ3");
        let body = std::str::from_utf8(&response.body).unwrap();
        assert!(body.contains("<ErrorResponse"));
        assert!(body.contains("<Type>Sender</Type>"));
        assert!(body.contains("<RequestId>REQ3</RequestId>"));

        let parsed = QueryCodec::query().parse_response(&model, op, &response).unwrap();
        let error = parsed.get("Error").unwrap();
        assert_eq!(error.get("Code").and_then(Value::as_str), Some("AWS.SimpleQueueService.NonExistentQueue"));
        assert_eq!(error.get("Message").and_then(Value::as_str), Some("gone"));
        assert_eq!(
            parsed.get("ResponseMetadata").and_then(|m| m.get("HTTPStatusCode")),
            Some(&Value::Integer(400))
        );
    }

    #[test]
    fn ec2_uses_capitalised_location_names_and_bare_indexes() {
        let model = parse_model("ec2", EC2).unwrap();
        let op = model.operation("DescribeRegions").unwrap();
        let codec = QueryCodec::ec2();
        let input = Value::structure([
            ("RegionNames", Value::List(vec!["us-east-1".into(), "eu-west-1".into()])),
            ("AllRegions", Value::Boolean(true)),
        ]);
        let request = codec.serialize_request(&model, op, &input).unwrap();
        let params = request.form_pairs();
        assert!(params.contains(&("RegionName.1".to_string(), "us-east-1".to_string())));
        assert!(params.contains(&("RegionName.2".to_string(), "eu-west-1".to_string())));
        assert!(params.contains(&("AllRegions".to_string(), "true".to_string())));
        assert_eq!(codec.parse_request(&model, op, &request).unwrap(), input);
    }

    #[test]
    fn ec2_response_and_error_shapes() {
        let model = parse_model("ec2", EC2).unwrap();
        let op = model.operation("DescribeRegions").unwrap();
        let codec = QueryCodec::ec2();
        let output = Value::structure([(
            "Regions",
            Value::List(vec![Value::structure([("RegionName", Value::from("us-east-1"))])]),
        )]);
        let response = codec.serialize_response(&model, op, &output, "EC2REQ").unwrap();
        let body = std::str::from_utf8(&response.body).unwrap();
        assert!(body.contains("<requestId>EC2REQ</requestId>"));
        assert!(body.contains("<regionInfo><item><regionName>us-east-1</regionName></item></regionInfo>"));

        let parsed = codec.parse_response(&model, op, &response).unwrap();
        assert_eq!(parsed.get("Regions"), output.get("Regions"));

        let error = WireError::new(StatusCode::BAD_REQUEST, "InvalidParameterValue", "nope");
        let body = codec.serialize_error(&model, Some(op), &error, "EC2ERR").body;
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains("<Response><Errors><Error><Code>InvalidParameterValue</Code>"));
        assert!(text.contains("<RequestID>EC2ERR</RequestID>"));
    }

    proptest! {
        #[test]
        fn query_requests_round_trip(
            url in "[a-z0-9:/._-]{1,30}",
            body in "\\PC{0,40}",
            delay in proptest::option::of(0i64..900),
            labels in proptest::collection::vec("[a-z]{1,5}", 1..4),
        ) {
            let model = sqs();
            let op = model.operation("SendMessage").unwrap();
            let mut fields = vec![
                ("QueueUrl", Value::from(url)),
                ("MessageBody", Value::from(body)),
                ("Labels", Value::List(labels.into_iter().map(Value::from).collect())),
            ];
            if let Some(delay) = delay {
                fields.push(("DelaySeconds", Value::Integer(delay)));
            }
            let input = Value::structure(fields);
            let codec = QueryCodec::query();
            let request = codec.serialize_request(&model, op, &input).unwrap();
            prop_assert_eq!(codec.parse_request(&model, op, &request).unwrap(), input);
        }
    }
}
