//! Turns a [`ServiceDocument`] into a validated [`ServiceModel`].
//!
//! Every shape in the document is resolved into an `Arc<Shape>` tree. A
//! reference to an undefined shape or a reference back into the chain
//! currently being resolved rejects the whole document, so nothing invalid
//! can reach the dispatcher.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::document::{OperationDoc, ServiceDocument, ShapeDoc, ShapeRefDoc};
use super::{SpecError, SpecViolation};
use crate::model::{ErrorShape, HttpBinding, OperationModel, ServiceMetadata, ServiceModel};
use crate::shape::{
    ListShape, Location, MapShape, Member, Shape, ShapeKind, StructureShape, TimestampFormat,
};
use crate::Protocol;

/// Parses and validates a JSON specification document.
///
/// # Errors
///
/// Returns [`SpecError::Invalid`] when the document is malformed or breaks
/// any structural rule (dangling references, cycles, bad bindings).
pub fn parse_model(service_id: &str, document: &str) -> Result<ServiceModel, SpecError> {
    let invalid = |violation| SpecError::Invalid {
        service: service_id.to_string(),
        violation,
    };
    let doc: ServiceDocument =
        serde_json::from_str(document).map_err(|e| invalid(SpecViolation::Malformed(e.to_string())))?;
    build_model(service_id, &doc).map_err(invalid)
}

fn build_model(service_id: &str, doc: &ServiceDocument) -> Result<ServiceModel, SpecViolation> {
    let protocol: Protocol = doc
        .metadata
        .protocol
        .parse()
        .map_err(SpecViolation::UnknownProtocol)?;

    let metadata = ServiceMetadata {
        api_version: doc.metadata.api_version.clone(),
        protocol,
        service_id: doc.metadata.service_id.clone(),
        endpoint_prefix: doc.metadata.endpoint_prefix.clone(),
        target_prefix: doc.metadata.target_prefix.clone(),
        json_version: doc.metadata.json_version.clone(),
        xml_namespace: doc.metadata.xml_namespace.as_ref().map(|ns| ns.uri().to_string()),
    };

    let mut shapes = ShapeResolver::new(&doc.shapes);
    for name in doc.shapes.keys() {
        shapes.resolve(name, name)?;
    }

    let mut operations = Vec::with_capacity(doc.operations.len());
    for (key, op_doc) in &doc.operations {
        operations.push(Arc::new(build_operation(key, op_doc, protocol, &mut shapes)?));
    }

    Ok(ServiceModel::new(service_id, metadata, operations))
}

fn build_operation(
    key: &str,
    doc: &OperationDoc,
    protocol: Protocol,
    shapes: &mut ShapeResolver<'_>,
) -> Result<OperationModel, SpecViolation> {
    if let Some(name) = doc.name.as_deref().filter(|n| *n != key) {
        return Err(SpecViolation::NameMismatch {
            key: key.to_string(),
            name: name.to_string(),
        });
    }

    let http = match &doc.http {
        Some(http) => HttpBinding {
            method: http.method.to_ascii_uppercase(),
            request_uri: http.request_uri.parse().map_err(|source| {
                SpecViolation::InvalidRequestUri {
                    operation: key.to_string(),
                    source,
                }
            })?,
            response_code: http.response_code.unwrap_or(200),
        },
        None if protocol.is_rest() => {
            return Err(SpecViolation::MissingHttpBinding {
                operation: key.to_string(),
            })
        }
        None => HttpBinding {
            method: "POST".to_string(),
            request_uri: "/".parse().map_err(|source| SpecViolation::InvalidRequestUri {
                operation: key.to_string(),
                source,
            })?,
            response_code: 200,
        },
    };

    let structure_ref = |shapes: &mut ShapeResolver<'_>,
                         reference: &ShapeRefDoc|
         -> Result<Arc<Shape>, SpecViolation> {
        let shape = shapes.resolve(&reference.shape, key)?;
        if shape.as_structure().is_none() {
            return Err(SpecViolation::NotAStructure {
                operation: key.to_string(),
                shape: reference.shape.clone(),
            });
        }
        Ok(shape)
    };

    let input = doc
        .input
        .as_ref()
        .map(|r| structure_ref(shapes, r))
        .transpose()?;
    let output = doc
        .output
        .as_ref()
        .map(|r| structure_ref(shapes, r))
        .transpose()?;

    let mut errors = Vec::with_capacity(doc.errors.len());
    for reference in &doc.errors {
        let shape = structure_ref(shapes, reference)?;
        let traits = shapes
            .docs
            .get(&reference.shape)
            .and_then(|d| d.error.as_ref());
        let status = traits.and_then(|t| t.http_status_code).unwrap_or(400);
        errors.push(Arc::new(ErrorShape {
            name: reference.shape.clone(),
            code: traits
                .and_then(|t| t.code.clone())
                .unwrap_or_else(|| reference.shape.clone()),
            status,
            sender_fault: traits
                .and_then(|t| t.sender_fault)
                .unwrap_or(status < 500),
            shape,
        }));
    }

    Ok(OperationModel {
        name: key.to_string(),
        http,
        input,
        output,
        result_wrapper: doc.output.as_ref().and_then(|o| o.result_wrapper.clone()),
        errors,
    })
}

/// Memoising, cycle-detecting resolver from shape names to `Arc<Shape>`.
struct ShapeResolver<'a> {
    docs: &'a BTreeMap<String, ShapeDoc>,
    built: HashMap<String, Arc<Shape>>,
    visiting: Vec<String>,
}

impl<'a> ShapeResolver<'a> {
    fn new(docs: &'a BTreeMap<String, ShapeDoc>) -> Self {
        Self {
            docs,
            built: HashMap::new(),
            visiting: Vec::new(),
        }
    }

    fn resolve(&mut self, name: &str, referenced_by: &str) -> Result<Arc<Shape>, SpecViolation> {
        if let Some(shape) = self.built.get(name) {
            return Ok(Arc::clone(shape));
        }
        if let Some(start) = self.visiting.iter().position(|v| v == name) {
            let mut path = self.visiting[start..].to_vec();
            path.push(name.to_string());
            return Err(SpecViolation::Cycle { path });
        }
        let docs = self.docs;
        let doc = docs
            .get(name)
            .ok_or_else(|| SpecViolation::DanglingReference {
                shape: name.to_string(),
                referenced_by: referenced_by.to_string(),
            })?;

        self.visiting.push(name.to_string());
        let kind = self.kind(name, doc);
        self.visiting.pop();

        let shape = Arc::new(Shape {
            name: name.to_string(),
            kind: kind?,
            location_name: doc.location_name.clone(),
            xml_namespace: doc.xml_namespace.as_ref().map(|ns| ns.uri().to_string()),
        });
        self.built.insert(name.to_string(), Arc::clone(&shape));
        Ok(shape)
    }

    fn kind(&mut self, name: &str, doc: &ShapeDoc) -> Result<ShapeKind, SpecViolation> {
        let kind = match doc.kind.as_str() {
            "string" => ShapeKind::String,
            "integer" => ShapeKind::Integer,
            "long" => ShapeKind::Long,
            "float" => ShapeKind::Float,
            "double" => ShapeKind::Double,
            "boolean" => ShapeKind::Boolean,
            "blob" => ShapeKind::Blob,
            "timestamp" => ShapeKind::Timestamp {
                format: timestamp_format(name, doc.timestamp_format.as_deref())?,
            },
            "structure" => {
                let mut members = Vec::with_capacity(doc.members.len());
                for (member_name, reference) in &doc.members {
                    let required = doc.required.iter().any(|r| r == member_name);
                    members.push(self.member(name, member_name, reference, required)?);
                }
                if let Some(payload) = &doc.payload {
                    if !doc.members.contains_key(payload) {
                        return Err(SpecViolation::MissingPayloadMember {
                            shape: name.to_string(),
                            member: payload.clone(),
                        });
                    }
                }
                ShapeKind::Structure(StructureShape {
                    members,
                    payload: doc.payload.clone(),
                })
            }
            "list" => {
                let reference = doc.member.as_ref().ok_or(SpecViolation::MalformedShape {
                    shape: name.to_string(),
                    reason: "list shape has no member",
                })?;
                ShapeKind::List(ListShape {
                    member: self.member(name, "member", reference, false)?,
                    flattened: doc.flattened,
                })
            }
            "map" => {
                let (Some(key), Some(value)) = (doc.key.as_ref(), doc.value.as_ref()) else {
                    return Err(SpecViolation::MalformedShape {
                        shape: name.to_string(),
                        reason: "map shape needs both key and value",
                    });
                };
                ShapeKind::Map(MapShape {
                    key: self.member(name, "key", key, false)?,
                    value: self.member(name, "value", value, false)?,
                    flattened: doc.flattened,
                })
            }
            other => {
                return Err(SpecViolation::UnknownShapeType {
                    shape: name.to_string(),
                    kind: other.to_string(),
                })
            }
        };
        Ok(kind)
    }

    fn member(
        &mut self,
        owner: &str,
        member_name: &str,
        reference: &ShapeRefDoc,
        required: bool,
    ) -> Result<Member, SpecViolation> {
        let location = match reference.location.as_deref() {
            None => Location::Body,
            Some(spelling) => {
                Location::from_spec(spelling).ok_or_else(|| SpecViolation::UnknownLocation {
                    shape: owner.to_string(),
                    member: member_name.to_string(),
                    location: spelling.to_string(),
                })?
            }
        };
        Ok(Member {
            name: member_name.to_string(),
            shape: self.resolve(&reference.shape, owner)?,
            required,
            location,
            location_name: reference.location_name.clone(),
            query_name: reference.query_name.clone(),
            flattened: reference.flattened,
            xml_attribute: reference.xml_attribute,
            timestamp_format: timestamp_format(owner, reference.timestamp_format.as_deref())?,
        })
    }
}

fn timestamp_format(shape: &str, spelling: Option<&str>) -> Result<Option<TimestampFormat>, SpecViolation> {
    spelling
        .map(|s| {
            TimestampFormat::from_spec(s).ok_or_else(|| SpecViolation::UnknownTimestampFormat {
                shape: shape.to_string(),
                format: s.to_string(),
            })
        })
        .transpose()
}
