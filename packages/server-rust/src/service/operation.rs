//! Raw request/response envelopes and handler error types.

use std::collections::BTreeMap;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use mockstack_core::Value;

// ---------------------------------------------------------------------------
// ServiceRequest / ServiceResponse
// ---------------------------------------------------------------------------

/// An HTTP request as delivered to the dispatcher.
///
/// `path` is kept percent-encoded; URI pattern matching decodes it.
#[derive(Debug, Clone)]
pub struct ServiceRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ServiceRequest {
    /// Creates a request from a method and a path with optional query
    /// (`/queue?Action=ListQueues`).
    #[must_use]
    pub fn new(method: Method, path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (path_and_query, None),
        };
        Self {
            method,
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Converts an `http::Request` whose body has already been collected.
    #[must_use]
    pub fn from_http(request: http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            body,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Header value as a string; non-UTF-8 values read as absent.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Decoded `key=value` pairs of the URL query string, in order.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query
            .as_deref()
            .map(|q| form_pairs(q.as_bytes()))
            .unwrap_or_default()
    }

    /// Decoded pairs of a form-encoded body.
    #[must_use]
    pub fn form_pairs(&self) -> Vec<(String, String)> {
        form_pairs(&self.body)
    }
}

fn form_pairs(input: &[u8]) -> Vec<(String, String)> {
    url::form_urlencoded::parse(input)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// A fully encoded HTTP response.
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ServiceResponse {
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Converts into an `http::Response` for the transport layer.
    #[must_use]
    pub fn into_http(self) -> http::Response<Bytes> {
        let mut response = http::Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// A request addressed to one registered service.
#[derive(Debug, Clone)]
pub struct ServiceCall {
    pub service_id: String,
    pub request: ServiceRequest,
}

impl ServiceCall {
    #[must_use]
    pub fn new(service_id: impl Into<String>, request: ServiceRequest) -> Self {
        Self {
            service_id: service_id.into(),
            request,
        }
    }
}

// ---------------------------------------------------------------------------
// Handler errors
// ---------------------------------------------------------------------------

/// A named domain error raised by a handler, e.g. `QueueDoesNotExist`.
///
/// When the operation declares an error with this name (or wire code), the
/// declared code and status are used and `fields` fill the error's extra
/// members. Otherwise the failure is reported as `InternalFailure`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ServiceException {
    pub code: String,
    pub message: String,
    pub fields: BTreeMap<String, Value>,
}

impl ServiceException {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, member: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(member.into(), value.into());
        self
    }
}

/// Failure returned by an operation handler.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error(transparent)]
    Service(#[from] ServiceException),
    /// A wire error given explicitly, independent of the declared errors.
    #[error("{code}: {message}")]
    Common {
        code: String,
        message: String,
        status: StatusCode,
        sender_fault: bool,
    },
    #[error("operation not implemented")]
    NotImplemented,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl OperationError {
    /// Shorthand for a client-fault [`OperationError::Common`] with status 400.
    #[must_use]
    pub fn common(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Common {
            code: code.into(),
            message: message.into(),
            status: StatusCode::BAD_REQUEST,
            sender_fault: true,
        }
    }

    #[must_use]
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service(ServiceException::new(code, message))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
