//! Service and operation models.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::shape::Shape;
use crate::uri::UriPattern;

/// Wire protocol family of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Form-encoded requests, XML responses.
    Query,
    /// Legacy EC2 dialect of the query protocol.
    Ec2,
    /// JSON-RPC style: `X-Amz-Target` header plus JSON body.
    Json,
    RestJson,
    RestXml,
}

impl Protocol {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Ec2 => "ec2",
            Self::Json => "json",
            Self::RestJson => "rest-json",
            Self::RestXml => "rest-xml",
        }
    }

    /// REST protocols route on method + URI instead of an action name.
    #[must_use]
    pub fn is_rest(self) -> bool {
        matches!(self, Self::RestJson | Self::RestXml)
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "query" => Ok(Self::Query),
            "ec2" | "ec2-query" => Ok(Self::Ec2),
            "json" => Ok(Self::Json),
            "rest-json" => Ok(Self::RestJson),
            "rest-xml" => Ok(Self::RestXml),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service-wide metadata from the specification document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMetadata {
    pub api_version: String,
    pub protocol: Protocol,
    pub service_id: Option<String>,
    pub endpoint_prefix: Option<String>,
    /// Prefix of the `X-Amz-Target` header (json protocol).
    pub target_prefix: Option<String>,
    /// `1.0` or `1.1`, selecting the `application/x-amz-json-*` content type.
    pub json_version: Option<String>,
    pub xml_namespace: Option<String>,
}

/// HTTP binding of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpBinding {
    /// Upper-case HTTP method.
    pub method: String,
    pub request_uri: UriPattern,
    /// Status code of a successful response.
    pub response_code: u16,
}

/// An exception an operation declares it may raise.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorShape {
    /// Shape name, which is also the name handlers raise.
    pub name: String,
    /// Code written on the wire; usually equal to `name`.
    pub code: String,
    pub status: u16,
    pub sender_fault: bool,
    pub shape: Arc<Shape>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationModel {
    pub name: String,
    pub http: HttpBinding,
    pub input: Option<Arc<Shape>>,
    pub output: Option<Arc<Shape>>,
    /// Query protocol element wrapping the output members.
    pub result_wrapper: Option<String>,
    pub errors: Vec<Arc<ErrorShape>>,
}

impl OperationModel {
    /// Finds a declared error by shape name or by wire code.
    #[must_use]
    pub fn declared_error(&self, name: &str) -> Option<&Arc<ErrorShape>> {
        self.errors
            .iter()
            .find(|e| e.name == name || e.code == name)
    }
}

/// Immutable description of one service: its protocol and operations.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceModel {
    name: String,
    metadata: ServiceMetadata,
    operations: Vec<Arc<OperationModel>>,
    index: HashMap<String, usize>,
}

impl ServiceModel {
    /// Assembles a model. Operation names must be unique; the loader checks
    /// this before calling.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        metadata: ServiceMetadata,
        operations: Vec<Arc<OperationModel>>,
    ) -> Self {
        let index = operations
            .iter()
            .enumerate()
            .map(|(i, op)| (op.name.clone(), i))
            .collect();
        Self {
            name: name.into(),
            metadata,
            operations,
            index,
        }
    }

    /// Identifier the model was loaded under (e.g. `sqs`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn metadata(&self) -> &ServiceMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.metadata.protocol
    }

    #[must_use]
    pub fn operation(&self, name: &str) -> Option<&Arc<OperationModel>> {
        self.index.get(name).map(|&i| &self.operations[i])
    }

    pub fn operations(&self) -> impl Iterator<Item = &Arc<OperationModel>> {
        self.operations.iter()
    }

    pub fn operation_names(&self) -> impl Iterator<Item = &str> {
        self.operations.iter().map(|op| op.name.as_str())
    }

    /// XML namespace for response documents, derived from the endpoint
    /// prefix and API version when the specification does not declare one.
    #[must_use]
    pub fn xml_namespace(&self) -> String {
        if let Some(ns) = &self.metadata.xml_namespace {
            return ns.clone();
        }
        let prefix = self
            .metadata
            .endpoint_prefix
            .as_deref()
            .unwrap_or(&self.name);
        format!(
            "http://{prefix}.amazonaws.com/doc/{}/",
            self.metadata.api_version
        )
    }
}
