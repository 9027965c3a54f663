//! HTTP bindings shared by the REST protocols: URI labels, query string,
//! headers, status code, and payload selection.

use std::collections::BTreeMap;

use bytes::Bytes;
use http::{HeaderName, Method, StatusCode};
use mockstack_core::{
    Location, Member, OperationModel, ShapeKind, StructureShape, TimestampFormat, UriPatternError,
    Value,
};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use super::{
    child_path, header, mismatch, scalar_from_text, scalar_to_text, timestamp_format, DecodeError,
    EncodeError,
};
use crate::service::operation::{ServiceRequest, ServiceResponse};

const QUERY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// How the body of a message maps onto a structure.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Payload<'a> {
    /// A blob or string member carried as the raw body.
    Raw(&'a Member),
    /// A structure member serialized as the whole body document.
    Document(&'a Member),
    /// The body members of the structure itself.
    Members,
}

pub(crate) fn payload(structure: &StructureShape) -> Payload<'_> {
    match structure.payload_member() {
        Some(member) if member.shape.as_structure().is_some() => Payload::Document(member),
        Some(member) => Payload::Raw(member),
        None => Payload::Members,
    }
}

/// Decodes a raw payload member from a body; an empty body leaves it unset.
pub(crate) fn raw_payload(member: &Member, body: &Bytes) -> Result<Option<Value>, DecodeError> {
    if body.is_empty() {
        return Ok(None);
    }
    match member.shape.kind {
        ShapeKind::String => String::from_utf8(body.to_vec())
            .map(|s| Some(Value::String(s)))
            .map_err(|e| DecodeError::serialization(&member.name, "string", e.to_string())),
        _ => Ok(Some(Value::Blob(body.to_vec()))),
    }
}

/// Body bytes for a raw payload value.
pub(crate) fn raw_payload_bytes(member: &Member, value: &Value) -> Result<Bytes, EncodeError> {
    match value {
        Value::Blob(bytes) => Ok(Bytes::copy_from_slice(bytes)),
        Value::String(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
        other => Err(mismatch(&member.name, &member.shape, other)),
    }
}

fn default_format(location: Location) -> TimestampFormat {
    match location {
        Location::Header | Location::Headers => TimestampFormat::Rfc822,
        _ => TimestampFormat::Iso8601,
    }
}

fn text_value(member: &Member, text: &str, path: &str) -> Result<Value, DecodeError> {
    let format = timestamp_format(member, default_format(member.location));
    match &member.shape.kind {
        ShapeKind::List(list) => {
            let item_format = list.member.declared_timestamp_format().unwrap_or(format);
            let dates = matches!(list.member.shape.kind, ShapeKind::Timestamp { .. })
                && item_format == TimestampFormat::Rfc822;
            split_list(text, dates)
                .into_iter()
                .map(|item| scalar_from_text(&list.member.shape, item, item_format, path))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List)
        }
        _ => scalar_from_text(&member.shape, text, format, path),
    }
}

/// Splits a comma-separated header list. RFC 822 dates contain commas of
/// their own, so date lists are split after each `GMT` instead.
fn split_list(text: &str, dates: bool) -> Vec<&str> {
    let items: Vec<&str> = if dates {
        text.split_inclusive("GMT")
            .map(|item| item.trim_start_matches(|c: char| c == ',' || c.is_whitespace()))
            .collect()
    } else {
        text.split(',').collect()
    };
    items.into_iter().map(str::trim).filter(|item| !item.is_empty()).collect()
}

fn value_text(member: &Member, value: &Value, path: &str) -> Result<String, EncodeError> {
    let format = timestamp_format(member, default_format(member.location));
    match (&member.shape.kind, value) {
        (ShapeKind::List(list), Value::List(items)) => items
            .iter()
            .map(|item| scalar_to_text(&list.member.shape, item, format, path))
            .collect::<Result<Vec<_>, _>>()
            .map(|parts| parts.join(", ")),
        _ => scalar_to_text(&member.shape, value, format, path),
    }
}

// ---------------------------------------------------------------------------
// Server side
// ---------------------------------------------------------------------------

/// Decodes the members bound to the URI, query string, and headers.
pub(crate) fn decode_request_bindings(
    operation: &OperationModel,
    structure: &StructureShape,
    request: &ServiceRequest,
) -> Result<BTreeMap<String, Value>, DecodeError> {
    let labels = operation
        .http
        .request_uri
        .matches(&request.path, request.query.as_deref())
        .unwrap_or_default();
    let query = request.query_pairs();
    let mut fields = BTreeMap::new();

    for member in &structure.members {
        let path = member.name.as_str();
        let value = match member.location {
            Location::Uri => labels
                .get(member.wire_name())
                .map(|text| text_value(member, text, path))
                .transpose()?,
            Location::QueryString => query_member(member, structure, &query, path)?,
            Location::Header => request
                .header(member.wire_name())
                .map(|text| text_value(member, text, path))
                .transpose()?,
            Location::Headers => prefixed_headers(member, request.headers.iter(), path)?,
            Location::Body | Location::StatusCode => None,
        };
        if let Some(value) = value {
            fields.insert(member.name.clone(), value);
        }
    }
    Ok(fields)
}

fn query_member(
    member: &Member,
    structure: &StructureShape,
    query: &[(String, String)],
    path: &str,
) -> Result<Option<Value>, DecodeError> {
    let key = member.wire_name();
    let format = timestamp_format(member, TimestampFormat::Iso8601);
    match &member.shape.kind {
        ShapeKind::List(list) => {
            let items: Vec<Value> = query
                .iter()
                .filter(|(k, _)| k == key)
                .map(|(_, v)| scalar_from_text(&list.member.shape, v, format, path))
                .collect::<Result<_, _>>()?;
            Ok((!items.is_empty()).then_some(Value::List(items)))
        }
        ShapeKind::Map(map) => {
            // A map takes every parameter not bound to another member.
            let bound: Vec<&str> = structure
                .members
                .iter()
                .filter(|m| m.location == Location::QueryString && !matches!(m.shape.kind, ShapeKind::Map(_)))
                .map(Member::wire_name)
                .collect();
            let mut entries = BTreeMap::new();
            for (k, v) in query.iter().filter(|(k, _)| !bound.contains(&k.as_str())) {
                let entry_path = child_path(path, k);
                match &map.value.shape.kind {
                    ShapeKind::List(list) => {
                        let item = scalar_from_text(&list.member.shape, v, format, &entry_path)?;
                        if let Value::List(items) = entries
                            .entry(k.clone())
                            .or_insert_with(|| Value::List(Vec::new()))
                        {
                            items.push(item);
                        }
                    }
                    _ => {
                        entries
                            .entry(k.clone())
                            .or_insert(scalar_from_text(&map.value.shape, v, format, &entry_path)?);
                    }
                }
            }
            Ok((!entries.is_empty()).then_some(Value::Map(entries)))
        }
        _ => query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| scalar_from_text(&member.shape, v, format, path))
            .transpose(),
    }
}

fn prefixed_headers<'h>(
    member: &Member,
    headers: impl Iterator<Item = (&'h HeaderName, &'h http::HeaderValue)>,
    path: &str,
) -> Result<Option<Value>, DecodeError> {
    let ShapeKind::Map(map) = &member.shape.kind else {
        return Err(DecodeError::serialization(path, "map", "headers binding on a non-map member"));
    };
    let prefix = member.wire_name().to_ascii_lowercase();
    let mut entries = BTreeMap::new();
    for (name, value) in headers {
        let Some(key) = name.as_str().strip_prefix(&prefix) else {
            continue;
        };
        let Ok(text) = value.to_str() else {
            continue;
        };
        let value = scalar_from_text(&map.value.shape, text, TimestampFormat::Rfc822, &child_path(path, key))?;
        entries.insert(key.to_string(), value);
    }
    Ok((!entries.is_empty()).then_some(Value::Map(entries)))
}

/// Writes header-bound members onto a response and returns the status
/// carried by a `statusCode` member, if any.
pub(crate) fn encode_response_bindings(
    structure: &StructureShape,
    fields: &BTreeMap<String, Value>,
    response: &mut ServiceResponse,
) -> Result<Option<StatusCode>, EncodeError> {
    let mut status = None;
    for member in &structure.members {
        let Some(value) = fields.get(&member.name) else {
            continue;
        };
        match member.location {
            Location::Header => {
                let (name, value) = header(member.wire_name(), &value_text(member, value, &member.name)?)?;
                response.headers.insert(name, value);
            }
            Location::Headers => {
                for (name, value) in header_map(member, value)? {
                    response.headers.insert(name, value);
                }
            }
            Location::StatusCode => {
                let code = value
                    .as_i64()
                    .and_then(|code| u16::try_from(code).ok())
                    .and_then(|code| StatusCode::from_u16(code).ok())
                    .ok_or_else(|| mismatch(&member.name, &member.shape, value))?;
                status = Some(code);
            }
            _ => {}
        }
    }
    Ok(status)
}

fn header_map(member: &Member, value: &Value) -> Result<Vec<(HeaderName, http::HeaderValue)>, EncodeError> {
    let (ShapeKind::Map(map), Value::Map(entries)) = (&member.shape.kind, value) else {
        return Err(mismatch(&member.name, &member.shape, value));
    };
    entries
        .iter()
        .map(|(key, item)| {
            let path = child_path(&member.name, key);
            let text = scalar_to_text(&map.value.shape, item, TimestampFormat::Rfc822, &path)?;
            header(&format!("{}{key}", member.wire_name()), &text)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Builds the method, path, query string, and headers of a client request.
pub(crate) fn encode_request_bindings(
    operation: &OperationModel,
    structure: Option<&StructureShape>,
    fields: &BTreeMap<String, Value>,
) -> Result<ServiceRequest, EncodeError> {
    let mut labels = BTreeMap::new();
    for member in structure.map(|s| s.members.iter()).into_iter().flatten() {
        if member.location != Location::Uri {
            continue;
        }
        if let Some(value) = fields.get(&member.name) {
            labels.insert(member.wire_name(), value_text(member, value, &member.name)?);
        }
    }
    let path = operation
        .http
        .request_uri
        .expand(|label| labels.get(label).cloned())
        .map_err(|e| match e {
            UriPatternError::MissingLabel(label) => EncodeError::MissingLabel(label),
            other => EncodeError::MissingLabel(other.to_string()),
        })?;
    let path = if path.is_empty() { "/".to_string() } else { path };

    let mut query: Vec<(String, String)> = operation
        .http
        .request_uri
        .query_requirements()
        .iter()
        .map(|req| (req.key.clone(), req.value.clone().unwrap_or_default()))
        .collect();
    let mut headers = Vec::new();

    for member in structure.map(|s| s.members.iter()).into_iter().flatten() {
        let Some(value) = fields.get(&member.name) else {
            continue;
        };
        match member.location {
            Location::QueryString => query.extend(query_params(member, value)?),
            Location::Header => headers.push(header(member.wire_name(), &value_text(member, value, &member.name)?)?),
            Location::Headers => headers.extend(header_map(member, value)?),
            _ => {}
        }
    }

    let mut path_and_query = path;
    if !query.is_empty() {
        let encoded: Vec<String> = query
            .iter()
            .map(|(k, v)| {
                let key = utf8_percent_encode(k, QUERY_ESCAPE);
                if v.is_empty() {
                    key.to_string()
                } else {
                    format!("{key}={}", utf8_percent_encode(v, QUERY_ESCAPE))
                }
            })
            .collect();
        path_and_query = format!("{path_and_query}?{}", encoded.join("&"));
    }

    let method = Method::from_bytes(operation.http.method.as_bytes()).unwrap_or(Method::POST);
    let mut request = ServiceRequest::new(method, &path_and_query);
    for (name, value) in headers {
        request.headers.insert(name, value);
    }
    Ok(request)
}

fn query_params(member: &Member, value: &Value) -> Result<Vec<(String, String)>, EncodeError> {
    let format = timestamp_format(member, TimestampFormat::Iso8601);
    let key = member.wire_name().to_string();
    match (&member.shape.kind, value) {
        (ShapeKind::List(list), Value::List(items)) => items
            .iter()
            .map(|item| Ok((key.clone(), scalar_to_text(&list.member.shape, item, format, &member.name)?)))
            .collect(),
        (ShapeKind::Map(map), Value::Map(entries)) => {
            let mut params = Vec::new();
            for (k, item) in entries {
                let path = child_path(&member.name, k);
                match (&map.value.shape.kind, item) {
                    (ShapeKind::List(list), Value::List(items)) => {
                        for item in items {
                            params.push((k.clone(), scalar_to_text(&list.member.shape, item, format, &path)?));
                        }
                    }
                    _ => params.push((k.clone(), scalar_to_text(&map.value.shape, item, format, &path)?)),
                }
            }
            Ok(params)
        }
        _ => Ok(vec![(key, scalar_to_text(&member.shape, value, format, &member.name)?)]),
    }
}

/// Reads header-bound and status-bound members from a response.
pub(crate) fn decode_response_bindings(
    structure: &StructureShape,
    response: &ServiceResponse,
) -> Result<BTreeMap<String, Value>, DecodeError> {
    let mut fields = BTreeMap::new();
    for member in &structure.members {
        let path = member.name.as_str();
        let value = match member.location {
            Location::Header => response
                .header(member.wire_name())
                .map(|text| text_value(member, text, path))
                .transpose()?,
            Location::Headers => prefixed_headers(member, response.headers.iter(), path)?,
            Location::StatusCode => Some(Value::Integer(i64::from(response.status.as_u16()))),
            _ => None,
        };
        if let Some(value) = value {
            fields.insert(member.name.clone(), value);
        }
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use http::HeaderValue;
    use mockstack_core::parse_model;

    use super::*;

    const BINDINGS: &str = r#"{
        "metadata": {"protocol": "rest-json", "apiVersion": "2020-01-01"},
        "operations": {
            "GetThing": {
                "http": {"method": "GET", "requestUri": "/things/{ThingId}/{Path+}?view=full"},
                "input": {"shape": "GetThingInput"},
                "output": {"shape": "GetThingOutput"}
            }
        },
        "shapes": {
            "GetThingInput": {
                "type": "structure",
                "required": ["ThingId"],
                "members": {
                    "ThingId": {"shape": "Integer", "location": "uri", "locationName": "ThingId"},
                    "Path": {"shape": "String", "location": "uri", "locationName": "Path"},
                    "MaxItems": {"shape": "Integer", "location": "querystring", "locationName": "max-items"},
                    "Tags": {"shape": "StringList", "location": "querystring", "locationName": "tag"},
                    "Extra": {"shape": "StringMap", "location": "querystring"},
                    "Since": {"shape": "Timestamp", "location": "header", "locationName": "If-Modified-Since"},
                    "Kinds": {"shape": "StringList", "location": "header", "locationName": "x-kinds"},
                    "Seen": {"shape": "TimestampList", "location": "header", "locationName": "x-seen"},
                    "Meta": {"shape": "StringMap", "location": "headers", "locationName": "x-meta-"}
                }
            },
            "GetThingOutput": {
                "type": "structure",
                "members": {
                    "Status": {"shape": "Integer", "location": "statusCode"},
                    "ETag": {"shape": "String", "location": "header", "locationName": "ETag"},
                    "Body": {"shape": "Blob"}
                },
                "payload": "Body"
            },
            "StringList": {"type": "list", "member": {"shape": "String"}},
            "TimestampList": {"type": "list", "member": {"shape": "Timestamp"}},
            "StringMap": {"type": "map", "key": {"shape": "String"}, "value": {"shape": "String"}},
            "String": {"type": "string"},
            "Integer": {"type": "integer"},
            "Blob": {"type": "blob"},
            "Timestamp": {"type": "timestamp"}
        }
    }"#;

    fn operation() -> std::sync::Arc<OperationModel> {
        let model = parse_model("things", BINDINGS).unwrap();
        model.operation("GetThing").unwrap().clone()
    }

    fn input_structure(op: &OperationModel) -> &StructureShape {
        op.input.as_deref().and_then(|s| s.as_structure()).unwrap()
    }

    #[test]
    fn request_bindings_decode_every_location() {
        let op = operation();
        let request = ServiceRequest::new(
            Method::GET,
            "/things/42/a/b%20c?view=full&max-items=5&tag=x&tag=y&color=red",
        )
        .with_header(
            HeaderName::from_static("if-modified-since"),
            HeaderValue::from_static("Sat, 09 Oct 2021 18:58:15 GMT"),
        )
        .with_header(HeaderName::from_static("x-kinds"), HeaderValue::from_static("a, b"))
        .with_header(HeaderName::from_static("x-meta-owner"), HeaderValue::from_static("me"));

        let fields = decode_request_bindings(&op, input_structure(&op), &request).unwrap();
        assert_eq!(fields["ThingId"], Value::Integer(42));
        assert_eq!(fields["Path"], Value::from("a/b c"));
        assert_eq!(fields["MaxItems"], Value::Integer(5));
        assert_eq!(fields["Tags"], Value::List(vec![Value::from("x"), Value::from("y")]));
        assert_eq!(
            fields["Extra"],
            Value::map([("color", Value::from("red")), ("view", Value::from("full"))])
        );
        assert!(matches!(fields["Since"], Value::Timestamp(_)));
        assert_eq!(fields["Kinds"], Value::List(vec![Value::from("a"), Value::from("b")]));
        assert_eq!(fields["Meta"], Value::map([("owner", Value::from("me"))]));
    }

    #[test]
    fn header_date_lists_keep_their_commas() {
        let op = operation();
        let request = ServiceRequest::new(Method::GET, "/things/1/x?view=full").with_header(
            HeaderName::from_static("x-seen"),
            HeaderValue::from_static("Sat, 09 Oct 2021 18:58:15 GMT, Sun, 10 Oct 2021 07:00:00 GMT"),
        );
        let fields = decode_request_bindings(&op, input_structure(&op), &request).unwrap();
        assert_eq!(
            fields["Seen"],
            Value::List(vec![
                Value::Timestamp(Utc.with_ymd_and_hms(2021, 10, 9, 18, 58, 15).unwrap()),
                Value::Timestamp(Utc.with_ymd_and_hms(2021, 10, 10, 7, 0, 0).unwrap()),
            ])
        );
    }

    #[test]
    fn split_list_handles_plain_and_date_lists() {
        assert_eq!(split_list("a, b,,c ", false), vec!["a", "b", "c"]);
        assert_eq!(
            split_list("Sat, 09 Oct 2021 18:58:15 GMT,Sun, 10 Oct 2021 07:00:00 GMT", true),
            vec!["Sat, 09 Oct 2021 18:58:15 GMT", "Sun, 10 Oct 2021 07:00:00 GMT"]
        );
    }

    #[test]
    fn bad_label_is_a_serialization_error() {
        let op = operation();
        let request = ServiceRequest::new(Method::GET, "/things/abc/x?view=full");
        let err = decode_request_bindings(&op, input_structure(&op), &request).unwrap_err();
        assert!(matches!(err, DecodeError::Serialization { path, .. } if path == "ThingId"));
    }

    #[test]
    fn client_request_expands_labels_and_query() {
        let op = operation();
        let input = Value::structure([
            ("ThingId", Value::Integer(7)),
            ("Path", Value::from("dir/file name")),
            ("Tags", Value::List(vec![Value::from("x")])),
        ]);
        let request =
            encode_request_bindings(&op, Some(input_structure(&op)), input.as_structure().unwrap()).unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.path, "/things/7/dir/file%20name");
        assert_eq!(request.query.as_deref(), Some("view=full&tag=x"));

        let missing = Value::structure([("Path", Value::from("p"))]);
        assert_eq!(
            encode_request_bindings(&op, Some(input_structure(&op)), missing.as_structure().unwrap())
                .unwrap_err(),
            EncodeError::MissingLabel("ThingId".to_string())
        );
    }

    #[test]
    fn response_bindings_round_trip_headers_and_status() {
        let op = operation();
        let output = op.output.as_deref().and_then(|s| s.as_structure()).unwrap();
        let fields = Value::structure([
            ("Status", Value::Integer(206)),
            ("ETag", Value::from("\"abc\"")),
        ]);
        let mut response = ServiceResponse::new(StatusCode::OK);
        let status = encode_response_bindings(output, fields.as_structure().unwrap(), &mut response).unwrap();
        assert_eq!(status, Some(StatusCode::PARTIAL_CONTENT));
        assert_eq!(response.header("etag"), Some("\"abc\""));

        response.status = StatusCode::PARTIAL_CONTENT;
        let decoded = decode_response_bindings(output, &response).unwrap();
        assert_eq!(decoded["Status"], Value::Integer(206));
        assert_eq!(decoded["ETag"], Value::from("\"abc\""));
    }

    #[test]
    fn payload_selection() {
        let op = operation();
        let output = op.output.as_deref().and_then(|s| s.as_structure()).unwrap();
        assert!(matches!(payload(output), Payload::Raw(m) if m.name == "Body"));
        assert!(matches!(payload(input_structure(&op)), Payload::Members));
        let body = output.member("Body").unwrap();
        assert_eq!(raw_payload(body, &Bytes::new()).unwrap(), None);
        assert_eq!(
            raw_payload(body, &Bytes::from_static(b"raw")).unwrap(),
            Some(Value::Blob(b"raw".to_vec()))
        );
    }
}
