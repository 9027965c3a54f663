//! Serde mirror of the JSON specification document.
//!
//! Field names follow the document's camelCase spelling. Unknown fields
//! (documentation, min/max constraints, enums) are ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDocument {
    pub metadata: MetadataDoc,
    #[serde(default, deserialize_with = "unique_keys")]
    pub operations: BTreeMap<String, OperationDoc>,
    #[serde(default, deserialize_with = "unique_keys")]
    pub shapes: BTreeMap<String, ShapeDoc>,
}

/// Reads an object into a map, failing on a repeated key instead of
/// keeping the last value.
fn unique_keys<'de, D, V>(deserializer: D) -> Result<BTreeMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct UniqueKeys<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for UniqueKeys<V> {
        type Value = BTreeMap<String, V>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an object with unique keys")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut map = BTreeMap::new();
            while let Some(key) = access.next_key::<String>()? {
                if map.contains_key(&key) {
                    return Err(de::Error::custom(format!("duplicate key '{key}'")));
                }
                let value = access.next_value()?;
                map.insert(key, value);
            }
            Ok(map)
        }
    }

    deserializer.deserialize_map(UniqueKeys(PhantomData))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataDoc {
    pub protocol: String,
    pub api_version: String,
    pub service_id: Option<String>,
    pub endpoint_prefix: Option<String>,
    pub target_prefix: Option<String>,
    pub json_version: Option<String>,
    pub xml_namespace: Option<XmlNamespaceDoc>,
}

/// Namespaces appear either as a bare URI or as `{"uri": "..."}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum XmlNamespaceDoc {
    Uri(String),
    Object { uri: String },
}

impl XmlNamespaceDoc {
    #[must_use]
    pub fn uri(&self) -> &str {
        match self {
            Self::Uri(uri) | Self::Object { uri } => uri,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDoc {
    pub name: Option<String>,
    pub http: Option<HttpDoc>,
    pub input: Option<ShapeRefDoc>,
    pub output: Option<ShapeRefDoc>,
    #[serde(default)]
    pub errors: Vec<ShapeRefDoc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpDoc {
    pub method: String,
    #[serde(default = "default_request_uri")]
    pub request_uri: String,
    pub response_code: Option<u16>,
}

fn default_request_uri() -> String {
    "/".to_string()
}

/// A reference to a shape, with the binding traits a member may carry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeRefDoc {
    pub shape: String,
    pub location: Option<String>,
    pub location_name: Option<String>,
    pub query_name: Option<String>,
    #[serde(default)]
    pub flattened: bool,
    #[serde(default)]
    pub xml_attribute: bool,
    pub timestamp_format: Option<String>,
    pub result_wrapper: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeDoc {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub members: BTreeMap<String, ShapeRefDoc>,
    #[serde(default)]
    pub required: Vec<String>,
    pub payload: Option<String>,
    pub member: Option<ShapeRefDoc>,
    pub key: Option<ShapeRefDoc>,
    pub value: Option<ShapeRefDoc>,
    #[serde(default)]
    pub flattened: bool,
    pub location_name: Option<String>,
    pub xml_namespace: Option<XmlNamespaceDoc>,
    pub timestamp_format: Option<String>,
    pub error: Option<ErrorTraitDoc>,
    #[serde(default)]
    pub exception: bool,
    #[serde(default)]
    pub fault: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorTraitDoc {
    pub code: Option<String>,
    pub http_status_code: Option<u16>,
    pub sender_fault: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_document() {
        let doc: ServiceDocument = serde_json::from_str(
            r#"{
                "metadata": {"protocol": "query", "apiVersion": "2012-11-05"},
                "operations": {
                    "DeleteQueue": {
                        "name": "DeleteQueue",
                        "http": {"method": "POST"},
                        "input": {"shape": "DeleteQueueRequest"}
                    }
                },
                "shapes": {
                    "DeleteQueueRequest": {
                        "type": "structure",
                        "required": ["QueueUrl"],
                        "members": {"QueueUrl": {"shape": "String"}},
                        "documentation": "ignored"
                    },
                    "String": {"type": "string"}
                }
            }"#,
        )
        .unwrap();
        let op = &doc.operations["DeleteQueue"];
        assert_eq!(op.http.as_ref().unwrap().request_uri, "/");
        assert_eq!(doc.shapes["DeleteQueueRequest"].required, vec!["QueueUrl"]);
    }

    #[test]
    fn repeated_operation_or_shape_key_is_an_error() {
        let operations = serde_json::from_str::<ServiceDocument>(
            r#"{"metadata": {"protocol": "json", "apiVersion": "1"},
                "operations": {"PutItem": {}, "PutItem": {"name": "PutItem"}}}"#,
        )
        .unwrap_err();
        assert!(operations.to_string().contains("duplicate key 'PutItem'"));

        let shapes = serde_json::from_str::<ServiceDocument>(
            r#"{"metadata": {"protocol": "json", "apiVersion": "1"},
                "shapes": {"S": {"type": "string"}, "S": {"type": "integer"}}}"#,
        )
        .unwrap_err();
        assert!(shapes.to_string().contains("duplicate key 'S'"));
    }

    #[test]
    fn xml_namespace_accepts_both_spellings() {
        let bare: XmlNamespaceDoc = serde_json::from_str(r#""http://ns/""#).unwrap();
        let object: XmlNamespaceDoc = serde_json::from_str(r#"{"uri": "http://ns/"}"#).unwrap();
        assert_eq!(bare.uri(), "http://ns/");
        assert_eq!(object.uri(), "http://ns/");
    }
}
