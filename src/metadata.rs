//! Request descriptors and per-request options.

use crate::fingerprint::Fingerprint;
use crate::pagination::Pagination;
use crate::policy::CachePolicy;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::Value;
use std::collections::HashMap;

/// How the parameter bag is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterEncoding {
    /// Appended to the URL as a query string.
    Query,
    /// Sent as a JSON object body.
    Json,
    /// Sent as an `application/x-www-form-urlencoded` body.
    Form,
}

impl ParameterEncoding {
    /// The encoding used when none is chosen explicitly.
    pub fn default_for(method: &Method) -> Self {
        if *method == Method::GET || *method == Method::DELETE || *method == Method::HEAD {
            ParameterEncoding::Query
        } else {
            ParameterEncoding::Json
        }
    }

    /// Lower-case name, as used in fingerprints.
    pub fn as_str(self) -> &'static str {
        match self {
            ParameterEncoding::Query => "query",
            ParameterEncoding::Json => "json",
            ParameterEncoding::Form => "form",
        }
    }
}

/// A binary request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryBody {
    /// The raw bytes.
    pub bytes: Bytes,
    /// The `Content-Type` sent with the bytes.
    pub content_type: String,
}

/// Everything needed to describe one logical request.
///
/// A descriptor is immutable once handed to the dispatcher. The order in
/// which parameters were inserted never matters, see [`Fingerprint`].
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// The HTTP method (GET, POST, etc.).
    pub method: Method,

    /// The request path (relative to the base URL).
    pub path: String,

    /// The parameter bag.
    pub params: HashMap<String, Value>,

    /// How `params` are encoded.
    pub encoding: ParameterEncoding,

    /// Additional headers for this request.
    pub headers: HeaderMap,

    /// Optional binary payload. When present, parameters are always sent
    /// in the query string.
    pub body: Option<BinaryBody>,
}

impl RequestDescriptor {
    /// Creates a new descriptor with the given method and path.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let encoding = ParameterEncoding::default_for(&method);
        Self {
            method,
            path: path.into(),
            params: HashMap::new(),
            encoding,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Shorthand for a GET descriptor.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Shorthand for a POST descriptor.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Adds a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Adds multiple parameters.
    pub fn with_params(mut self, params: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.params.extend(params);
        self
    }

    /// Adds the `page`/`size` parameters for a paged list request.
    pub fn with_page(mut self, page: u32, size: u32) -> Self {
        self.params.extend(Pagination::page_parameters(page, size));
        self
    }

    /// Overrides the parameter encoding.
    pub fn with_encoding(mut self, encoding: ParameterEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Attaches a binary body.
    pub fn with_body(mut self, bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        self.body = Some(BinaryBody {
            bytes: bytes.into(),
            content_type: content_type.into(),
        });
        self
    }

    /// Adds a header to the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, crate::Error> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| crate::Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| crate::Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Returns the page number carried in the given parameter, if any.
    ///
    /// Accepts both numeric and numeric-string values.
    pub fn page(&self, parameter: &str) -> Option<u64> {
        match self.params.get(parameter)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Derives this request's cache and de-duplication key.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }
}

impl Default for RequestDescriptor {
    fn default() -> Self {
        Self::new(Method::GET, "")
    }
}

/// Options attached to a single dispatch.
///
/// Defaults: no caching ([`CachePolicy::FetchOnly`]), loading indicator on,
/// failure messages on, no success message.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// How the cache and network are combined for this request.
    pub cache_policy: CachePolicy,
    /// Whether loading start/end notifications are emitted.
    pub show_loading: bool,
    /// Whether failures are mirrored to the feedback sink.
    pub show_failure: bool,
    /// Message shown on a successful network response, if any.
    pub success_message: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            cache_policy: CachePolicy::FetchOnly,
            show_loading: true,
            show_failure: true,
            success_message: None,
        }
    }
}

impl RequestOptions {
    /// Options with the given cache policy and all other defaults.
    pub fn cached(policy: CachePolicy) -> Self {
        Self {
            cache_policy: policy,
            ..Default::default()
        }
    }

    /// Disables the loading indicator.
    pub fn quiet(mut self) -> Self {
        self.show_loading = false;
        self
    }

    /// Disables failure messages.
    pub fn without_failure_message(mut self) -> Self {
        self.show_failure = false;
        self
    }

    /// Sets the message shown after a successful network response.
    pub fn with_success_message(mut self, message: impl Into<String>) -> Self {
        self.success_message = Some(message.into());
        self
    }
}
