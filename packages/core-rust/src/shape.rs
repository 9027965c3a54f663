//! Shape graph: recursive type descriptors for wire data.
//!
//! Shapes are built once by the specification loader and shared through
//! `Arc`. The loader rejects cyclic graphs, so every `Shape` is the root of a
//! finite tree and structural equality (`PartialEq`) is well defined.

use std::sync::Arc;

/// Wire format of a timestamp member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    /// `2021-10-09T18:58:15.000Z`
    Iso8601,
    /// `Sat, 09 Oct 2021 18:58:15 GMT`
    Rfc822,
    /// Seconds since the Unix epoch, possibly fractional.
    UnixTimestamp,
}

impl TimestampFormat {
    /// Parses the specification spelling (`iso8601`, `rfc822`, `unixTimestamp`).
    #[must_use]
    pub fn from_spec(name: &str) -> Option<Self> {
        match name {
            "iso8601" => Some(Self::Iso8601),
            "rfc822" => Some(Self::Rfc822),
            "unixTimestamp" => Some(Self::UnixTimestamp),
            _ => None,
        }
    }
}

/// Where a structure member is bound on the HTTP message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Location {
    /// Serialized in the document body (the only location for query/json).
    #[default]
    Body,
    /// A `{label}` in the request URI.
    Uri,
    /// A query-string parameter.
    QueryString,
    /// A single HTTP header.
    Header,
    /// All headers sharing a prefix, bound to a map.
    Headers,
    /// The HTTP status code of a response.
    StatusCode,
}

impl Location {
    #[must_use]
    pub fn from_spec(name: &str) -> Option<Self> {
        match name {
            "uri" => Some(Self::Uri),
            "querystring" => Some(Self::QueryString),
            "header" => Some(Self::Header),
            "headers" => Some(Self::Headers),
            "statusCode" => Some(Self::StatusCode),
            _ => None,
        }
    }
}

/// A named, typed reference from a structure, list, or map to another shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub shape: Arc<Shape>,
    pub required: bool,
    pub location: Location,
    /// Wire name override (XML element, header name, URI label, query key).
    pub location_name: Option<String>,
    /// EC2 query parameter name override.
    pub query_name: Option<String>,
    pub flattened: bool,
    pub xml_attribute: bool,
    pub timestamp_format: Option<TimestampFormat>,
}

impl Member {
    /// Creates a body-bound, optional member with no overrides.
    #[must_use]
    pub fn new(name: impl Into<String>, shape: Arc<Shape>) -> Self {
        Self {
            name: name.into(),
            shape,
            required: false,
            location: Location::Body,
            location_name: None,
            query_name: None,
            flattened: false,
            xml_attribute: false,
            timestamp_format: None,
        }
    }

    /// Name used on the wire: `locationName` when present, the member name otherwise.
    #[must_use]
    pub fn wire_name(&self) -> &str {
        self.location_name.as_deref().unwrap_or(&self.name)
    }

    /// Whether this member is serialized in the document body.
    #[must_use]
    pub fn in_body(&self) -> bool {
        self.location == Location::Body
    }

    /// Timestamp format declared on the member, falling back to the target shape.
    #[must_use]
    pub fn declared_timestamp_format(&self) -> Option<TimestampFormat> {
        self.timestamp_format.or(match self.shape.kind {
            ShapeKind::Timestamp { format } => format,
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructureShape {
    pub members: Vec<Member>,
    /// Name of the member carried as the whole HTTP payload (REST protocols).
    pub payload: Option<String>,
}

impl StructureShape {
    #[must_use]
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }

    #[must_use]
    pub fn payload_member(&self) -> Option<&Member> {
        self.payload.as_deref().and_then(|name| self.member(name))
    }

    pub fn required_members(&self) -> impl Iterator<Item = &Member> {
        self.members.iter().filter(|m| m.required)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListShape {
    pub member: Member,
    pub flattened: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapShape {
    pub key: Member,
    pub value: Member,
    pub flattened: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShapeKind {
    String,
    Integer,
    Long,
    Float,
    Double,
    Boolean,
    Blob,
    Timestamp { format: Option<TimestampFormat> },
    Structure(StructureShape),
    List(ListShape),
    Map(MapShape),
}

/// A named node in the shape graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub name: String,
    pub kind: ShapeKind,
    /// XML element name override for the shape itself (rest-xml roots).
    pub location_name: Option<String>,
    pub xml_namespace: Option<String>,
}

impl Shape {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ShapeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            location_name: None,
            xml_namespace: None,
        }
    }

    #[must_use]
    pub fn as_structure(&self) -> Option<&StructureShape> {
        match &self.kind {
            ShapeKind::Structure(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the shape is a primitive (neither structure, list, nor map).
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        !matches!(
            self.kind,
            ShapeKind::Structure(_) | ShapeKind::List(_) | ShapeKind::Map(_)
        )
    }

    /// Type name used in codec error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            ShapeKind::String => "string",
            ShapeKind::Integer => "integer",
            ShapeKind::Long => "long",
            ShapeKind::Float => "float",
            ShapeKind::Double => "double",
            ShapeKind::Boolean => "boolean",
            ShapeKind::Blob => "blob",
            ShapeKind::Timestamp { .. } => "timestamp",
            ShapeKind::Structure(_) => "structure",
            ShapeKind::List(_) => "list",
            ShapeKind::Map(_) => "map",
        }
    }

    /// Element name for the shape when it is the root of an XML document.
    #[must_use]
    pub fn xml_root_name(&self) -> &str {
        self.location_name.as_deref().unwrap_or(&self.name)
    }
}
