//! Minimal XML tree plus shape-driven conversion to and from [`Value`].
//!
//! Shared by the query, EC2, and REST-XML codecs. Element names are compared
//! without namespace prefixes.

use std::collections::BTreeMap;

use mockstack_core::{Member, Shape, ShapeKind, StructureShape, TimestampFormat, Value};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

use super::{child_path, mismatch, scalar_from_text, scalar_to_text, timestamp_format, DecodeError, EncodeError};

pub(crate) const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

// ---------------------------------------------------------------------------
// XmlNode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
    pub text: String,
}

impl XmlNode {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Element with only text content.
    #[must_use]
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn push(&mut self, child: XmlNode) {
        self.children.push(child);
    }

    /// First child with the given local name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the named child, if present.
    #[must_use]
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parses a document and returns its root element.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] for ill-formed input or an empty document.
    pub fn parse(input: &[u8]) -> Result<XmlNode, DecodeError> {
        let malformed = |reason: String| DecodeError::Malformed {
            format: "xml",
            reason,
        };
        let text = std::str::from_utf8(input).map_err(|e| malformed(e.to_string()))?;
        let mut reader = Reader::from_str(text);
        let mut stack: Vec<XmlNode> = Vec::new();

        loop {
            match reader.read_event().map_err(|e| malformed(e.to_string()))? {
                Event::Start(start) => {
                    stack.push(element(&start).map_err(malformed)?);
                }
                Event::Empty(start) => {
                    let node = element(&start).map_err(malformed)?;
                    match stack.last_mut() {
                        Some(parent) => parent.push(node),
                        None => return Ok(node),
                    }
                }
                Event::End(_) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| malformed("unbalanced end tag".to_string()))?;
                    match stack.last_mut() {
                        Some(parent) => parent.push(node),
                        None => return Ok(node),
                    }
                }
                Event::Text(text) => {
                    if let Some(node) = stack.last_mut() {
                        let unescaped = text.unescape().map_err(|e| malformed(e.to_string()))?;
                        node.text.push_str(&unescaped);
                    }
                }
                Event::CData(data) => {
                    if let Some(node) = stack.last_mut() {
                        node.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::Eof => return Err(malformed("no root element".to_string())),
                _ => {}
            }
        }
    }

    /// Serializes the element (without declaration).
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.write(&mut out);
        out
    }

    /// Serializes as a complete document with an XML declaration.
    #[must_use]
    pub fn to_document(&self) -> String {
        let mut out = String::from(XML_DECLARATION);
        self.write(&mut out);
        out
    }

    fn write(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }
        if self.children.is_empty() && self.text.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        out.push_str(&escape(self.text.as_str()));
        for child in &self.children {
            child.write(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn local_name(qualified: &[u8]) -> String {
    let name = String::from_utf8_lossy(qualified);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

fn element(start: &quick_xml::events::BytesStart<'_>) -> Result<XmlNode, String> {
    let mut node = XmlNode::new(local_name(start.name().as_ref()));
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| e.to_string())?;
        let value = attribute.unescape_value().map_err(|e| e.to_string())?;
        node.attributes.push((
            String::from_utf8_lossy(attribute.key.as_ref()).into_owned(),
            value.into_owned(),
        ));
    }
    Ok(node)
}

// ---------------------------------------------------------------------------
// Shape-driven encoding
// ---------------------------------------------------------------------------

/// Appends the body members of `fields` to `parent`.
///
/// # Errors
///
/// Returns [`EncodeError`] when a value does not match its member shape.
pub fn encode_members(
    parent: &mut XmlNode,
    structure: &StructureShape,
    fields: &BTreeMap<String, Value>,
    path: &str,
) -> Result<(), EncodeError> {
    for member in structure.members.iter().filter(|m| m.in_body()) {
        let Some(value) = fields.get(&member.name) else {
            continue;
        };
        let member_path = child_path(path, &member.name);
        if member.xml_attribute {
            let text = scalar_to_text(&member.shape, value, timestamp_format(member, TimestampFormat::Iso8601), &member_path)?;
            parent.attributes.push((member.wire_name().to_string(), text));
            continue;
        }
        encode_member(parent, member, value, &member_path)?;
    }
    Ok(())
}

fn encode_member(
    parent: &mut XmlNode,
    member: &Member,
    value: &Value,
    path: &str,
) -> Result<(), EncodeError> {
    let name = member.wire_name();
    match &member.shape.kind {
        ShapeKind::List(list) => {
            let Value::List(items) = value else {
                return Err(mismatch(path, &member.shape, value));
            };
            if member.flattened || list.flattened {
                for item in items {
                    parent.push(encode_value(name, &list.member, item, path)?);
                }
            } else {
                let item_name = list.member.location_name.as_deref().unwrap_or("member");
                let mut wrapper = XmlNode::new(name);
                for item in items {
                    wrapper.push(encode_value(item_name, &list.member, item, path)?);
                }
                parent.push(wrapper);
            }
        }
        ShapeKind::Map(map) => {
            let Value::Map(entries) = value else {
                return Err(mismatch(path, &member.shape, value));
            };
            let key_name = map.key.location_name.as_deref().unwrap_or("key");
            let value_name = map.value.location_name.as_deref().unwrap_or("value");
            let entry = |key: &String, item: &Value, entry_name: &str| -> Result<XmlNode, EncodeError> {
                Ok(XmlNode::new(entry_name)
                    .with_child(XmlNode::text(key_name, key.as_str()))
                    .with_child(encode_value(value_name, &map.value, item, &child_path(path, key))?))
            };
            if member.flattened || map.flattened {
                for (key, item) in entries {
                    parent.push(entry(key, item, name)?);
                }
            } else {
                let mut wrapper = XmlNode::new(name);
                for (key, item) in entries {
                    wrapper.push(entry(key, item, "entry")?);
                }
                parent.push(wrapper);
            }
        }
        _ => parent.push(encode_value(name, member, value, path)?),
    }
    Ok(())
}

/// Encodes one value as an element named `name`.
///
/// # Errors
///
/// Returns [`EncodeError`] when the value does not match the member shape.
pub fn encode_value(
    name: &str,
    member: &Member,
    value: &Value,
    path: &str,
) -> Result<XmlNode, EncodeError> {
    let shape = &member.shape;
    match &shape.kind {
        ShapeKind::Structure(structure) => {
            let Value::Structure(fields) = value else {
                return Err(mismatch(path, shape, value));
            };
            let mut node = XmlNode::new(name);
            encode_members(&mut node, structure, fields, path)?;
            Ok(node)
        }
        ShapeKind::List(_) | ShapeKind::Map(_) => {
            let mut holder = XmlNode::new(name);
            let mut inner = member.clone();
            inner.flattened = false;
            encode_member(&mut holder, &inner, value, path)?;
            Ok(holder.children.pop().unwrap_or_else(|| XmlNode::new(name)))
        }
        _ => Ok(XmlNode::text(
            name,
            scalar_to_text(shape, value, timestamp_format(member, TimestampFormat::Iso8601), path)?,
        )),
    }
}

// ---------------------------------------------------------------------------
// Shape-driven decoding
// ---------------------------------------------------------------------------

/// Reads the body members of `structure` from the children of `node`.
///
/// # Errors
///
/// Returns [`DecodeError`] when element text cannot be coerced.
pub fn decode_members(
    node: &XmlNode,
    structure: &StructureShape,
    path: &str,
) -> Result<BTreeMap<String, Value>, DecodeError> {
    let mut fields = BTreeMap::new();
    for member in structure.members.iter().filter(|m| m.in_body()) {
        let member_path = child_path(path, &member.name);
        if member.xml_attribute {
            if let Some(text) = node.attribute(member.wire_name()) {
                let value = scalar_from_text(&member.shape, text, timestamp_format(member, TimestampFormat::Iso8601), &member_path)?;
                fields.insert(member.name.clone(), value);
            }
            continue;
        }
        if let Some(value) = decode_member(node, member, &member_path)? {
            fields.insert(member.name.clone(), value);
        }
    }
    Ok(fields)
}

fn decode_member(
    parent: &XmlNode,
    member: &Member,
    path: &str,
) -> Result<Option<Value>, DecodeError> {
    let name = member.wire_name();
    match &member.shape.kind {
        ShapeKind::List(list) if member.flattened || list.flattened => {
            let items: Vec<&XmlNode> = parent.children_named(name).collect();
            if items.is_empty() {
                return Ok(None);
            }
            items
                .into_iter()
                .map(|item| decode_value(item, &list.member, path))
                .collect::<Result<Vec<_>, _>>()
                .map(|items| Some(Value::List(items)))
        }
        ShapeKind::Map(map) if member.flattened || map.flattened => {
            let entries: Vec<&XmlNode> = parent.children_named(name).collect();
            if entries.is_empty() {
                return Ok(None);
            }
            decode_map_entries(&entries, map, path).map(|m| Some(Value::Map(m)))
        }
        _ => match parent.child(name) {
            Some(node) => decode_value(node, member, path).map(Some),
            None => Ok(None),
        },
    }
}

/// Decodes an element against a member's shape.
///
/// # Errors
///
/// Returns [`DecodeError`] when element text cannot be coerced.
pub fn decode_value(node: &XmlNode, member: &Member, path: &str) -> Result<Value, DecodeError> {
    let shape: &Shape = &member.shape;
    match &shape.kind {
        ShapeKind::Structure(structure) => {
            decode_members(node, structure, path).map(Value::Structure)
        }
        ShapeKind::List(list) => {
            let item_name = list.member.location_name.as_deref().unwrap_or("member");
            node.children_named(item_name)
                .map(|item| decode_value(item, &list.member, path))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List)
        }
        ShapeKind::Map(map) => {
            let entries: Vec<&XmlNode> = node.children_named("entry").collect();
            decode_map_entries(&entries, map, path).map(Value::Map)
        }
        _ => scalar_from_text(
            shape,
            &node.text,
            timestamp_format(member, TimestampFormat::Iso8601),
            path,
        ),
    }
}

fn decode_map_entries(
    entries: &[&XmlNode],
    map: &mockstack_core::MapShape,
    path: &str,
) -> Result<BTreeMap<String, Value>, DecodeError> {
    let key_name = map.key.location_name.as_deref().unwrap_or("key");
    let value_name = map.value.location_name.as_deref().unwrap_or("value");
    let mut out = BTreeMap::new();
    for entry in entries {
        let Some(key) = entry.child_text(key_name) else {
            continue;
        };
        let value = match entry.child(value_name) {
            Some(node) => decode_value(node, &map.value, &child_path(path, key))?,
            None => continue,
        };
        out.insert(key.to_string(), value);
    }
    Ok(out)
}
