//! Per-invocation request context and identity extraction.

use std::sync::{Arc, LazyLock};

use mockstack_core::{OperationModel, ServiceModel};
use rand::Rng;
use regex::Regex;

use super::config::ServerConfig;
use super::operation::ServiceRequest;

/// Length of every generated request id.
pub const REQUEST_ID_LENGTH: usize = 52;

const REQUEST_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

static CREDENTIAL_SCOPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Credential=([^/,\s]+)/\d{8}/([^/]+)/([^/]+)/aws4_request")
        .expect("credential scope regex is valid")
});

/// Everything a handler knows about the call besides its typed input.
///
/// Built fresh for every invocation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub account_id: String,
    pub region: String,
    pub service: Arc<ServiceModel>,
    pub operation: Arc<OperationModel>,
    pub request: Arc<ServiceRequest>,
    pub request_id: String,
}

impl RequestContext {
    /// Builds a context, deriving account and region from the request's
    /// credential scope.
    #[must_use]
    pub fn new(
        service: Arc<ServiceModel>,
        operation: Arc<OperationModel>,
        request: Arc<ServiceRequest>,
        request_id: String,
        config: &ServerConfig,
    ) -> Self {
        let scope = CredentialScope::from_request(&request);
        let account_id = scope
            .as_ref()
            .and_then(CredentialScope::account_id)
            .unwrap_or(&config.default_account_id)
            .to_string();
        let region = scope
            .as_ref()
            .map_or(config.default_region.as_str(), |s| s.region.as_str())
            .to_string();
        Self {
            account_id,
            region,
            service,
            operation,
            request,
            request_id,
        }
    }

    /// Name the model was loaded under.
    #[must_use]
    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    #[must_use]
    pub fn operation_name(&self) -> &str {
        &self.operation.name
    }
}

/// The `Credential=<key>/<date>/<region>/<service>/aws4_request` part of a
/// SigV4 `Authorization` header. Parsed, never verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialScope {
    pub access_key_id: String,
    pub region: String,
    pub service: String,
}

impl CredentialScope {
    #[must_use]
    pub fn parse(authorization: &str) -> Option<Self> {
        let captures = CREDENTIAL_SCOPE.captures(authorization)?;
        Some(Self {
            access_key_id: captures[1].to_string(),
            region: captures[2].to_string(),
            service: captures[3].to_string(),
        })
    }

    #[must_use]
    pub fn from_request(request: &ServiceRequest) -> Option<Self> {
        request.header("authorization").and_then(Self::parse)
    }

    /// The access key id, when it is itself a 12-digit account id.
    #[must_use]
    pub fn account_id(&self) -> Option<&str> {
        let key = self.access_key_id.as_str();
        (key.len() == 12 && key.bytes().all(|b| b.is_ascii_digit())).then_some(key)
    }
}

/// Generates a fresh request id: [`REQUEST_ID_LENGTH`] upper-case ASCII
/// letters and digits from the thread-local generator.
#[must_use]
pub fn generate_request_id() -> String {
    let mut rng = rand::rng();
    (0..REQUEST_ID_LENGTH)
        .map(|_| char::from(REQUEST_ID_ALPHABET[rng.random_range(0..REQUEST_ID_ALPHABET.len())]))
        .collect()
}
