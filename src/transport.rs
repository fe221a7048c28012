//! The transport collaborator and its default `reqwest` implementation.
//!
//! The dispatcher only needs `send(descriptor) -> raw response`. The
//! [`HttpTransport`] shipped here runs a [`Middleware`] chain around each
//! send, which is where auth headers and request logging plug in.

use crate::metadata::{ParameterEncoding, RequestDescriptor};
use crate::session::Session;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// A response as it came off the wire, before any envelope handling.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The response body.
    pub body: Bytes,
    /// Time from send to the full body being read.
    pub latency: Duration,
}

/// Sends a request and returns its raw response.
///
/// Implementations return `Ok` for every HTTP status they receive; status
/// classification happens in the dispatcher. Dropping the returned future
/// cancels the request.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request`.
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse>;
}

/// A hook around every send made by [`HttpTransport`].
pub trait Middleware: Send + Sync {
    /// Adjusts the outgoing headers. An error aborts the send.
    fn on_request(&self, _request: &RequestDescriptor, _headers: &mut HeaderMap) -> Result<()> {
        Ok(())
    }

    /// Observes the outcome of a send.
    fn on_response(&self, _request: &RequestDescriptor, _result: &Result<RawResponse>) {}
}

/// Adds `Authorization: Bearer <token>` when the session has a token.
pub struct BearerAuth {
    session: Arc<dyn Session>,
}

impl BearerAuth {
    /// Reads tokens from `session`.
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self { session }
    }
}

impl Middleware for BearerAuth {
    fn on_request(&self, _request: &RequestDescriptor, headers: &mut HeaderMap) -> Result<()> {
        if let Some(token) = self.session.token() {
            let value = HeaderValue::try_from(format!("Bearer {}", token)).map_err(|e| {
                Error::ConfigurationError(format!("Invalid bearer token: {}", e))
            })?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(())
    }
}

/// Logs requests and responses at `debug`, pretty-printing JSON bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogger;

impl Middleware for RequestLogger {
    fn on_request(&self, request: &RequestDescriptor, _headers: &mut HeaderMap) -> Result<()> {
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            params = ?request.params,
            "Sending request"
        );
        Ok(())
    }

    fn on_response(&self, request: &RequestDescriptor, result: &Result<RawResponse>) {
        match result {
            Ok(response) => tracing::debug!(
                method = %request.method,
                path = %request.path,
                status = response.status.as_u16(),
                latency_ms = response.latency.as_millis(),
                body = %pretty_body(&response.body),
                "Received response"
            ),
            Err(e) => tracing::debug!(
                method = %request.method,
                path = %request.path,
                error = %e,
                "Request failed"
            ),
        }
    }
}

fn pretty_body(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|json| serde_json::to_string_pretty(&json).ok())
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
}

/// The default transport, built on `reqwest`.
#[derive(Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    base_url: Url,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl HttpTransport {
    /// Creates a transport for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: Url) -> Result<Self> {
        let http_client = reqwest::Client::builder().build().map_err(|e| {
            Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self {
            http_client,
            base_url,
            default_headers: HeaderMap::new(),
            timeout: None,
            middleware: Vec::new(),
        })
    }

    /// Sets headers sent with every request.
    pub fn with_default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = headers;
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Appends a middleware. Middleware runs in insertion order.
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Builds the full URL for `request`, appending query parameters when
    /// they are not sent in the body.
    fn url_for(&self, request: &RequestDescriptor) -> Url {
        let mut url = self.base_url.clone();
        let path = format!(
            "{}/{}",
            self.base_url.path().trim_end_matches('/'),
            request.path.trim_start_matches('/')
        );
        url.set_path(&path);

        if params_in_query(request) && !request.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in sorted_pairs(request) {
                pairs.append_pair(&key, &value);
            }
        }
        url
    }

    async fn execute(&self, request: &RequestDescriptor) -> Result<RawResponse> {
        let url = self.url_for(request);

        let mut headers = self.default_headers.clone();
        for (name, value) in &request.headers {
            headers.insert(name, value.clone());
        }
        for middleware in &self.middleware {
            middleware.on_request(request, &mut headers)?;
        }

        tracing::debug!(method = %request.method, url = %url, "Executing HTTP request");

        let mut builder = self
            .http_client
            .request(request.method.clone(), url)
            .headers(headers);

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, body.content_type.as_str())
                .body(body.bytes.clone());
        } else if !request.params.is_empty() {
            match request.encoding {
                ParameterEncoding::Query => {}
                ParameterEncoding::Json => builder = builder.json(&request.params),
                ParameterEncoding::Form => {
                    builder = builder.form(&sorted_pairs(request));
                }
            }
        }

        let start = Instant::now();
        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(RawResponse {
            status,
            headers,
            body,
            latency: start.elapsed(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse> {
        let result = self.execute(request).await;
        for middleware in &self.middleware {
            middleware.on_response(request, &result);
        }
        result
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

fn params_in_query(request: &RequestDescriptor) -> bool {
    request.body.is_some() || request.encoding == ParameterEncoding::Query
}

/// Parameters as text pairs, key-sorted. Strings are sent bare, everything
/// else as its JSON text.
fn sorted_pairs(request: &RequestDescriptor) -> Vec<(String, String)> {
    let sorted: BTreeMap<&String, &Value> = request.params.iter().collect();
    sorted
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Token(Option<&'static str>);

    impl Session for Token {
        fn token(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
        fn on_forced_logout(&self) {}
    }

    #[test]
    fn test_url_keeps_base_path_and_sorts_query() {
        let transport = HttpTransport::new(Url::parse("https://api.example.com/v2/").unwrap()).unwrap();
        let request = RequestDescriptor::get("/users")
            .with_param("size", 20)
            .with_param("page", 1)
            .with_param("q", "rust lang");

        let url = transport.url_for(&request);
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v2/users?page=1&q=rust+lang&size=20"
        );
    }

    #[test]
    fn test_json_params_stay_out_of_the_url() {
        let transport = HttpTransport::new(Url::parse("https://api.example.com").unwrap()).unwrap();
        let request = RequestDescriptor::post("/users").with_param("name", "Ann");
        assert_eq!(transport.url_for(&request).as_str(), "https://api.example.com/users");
    }

    #[test]
    fn test_bearer_auth() {
        let request = RequestDescriptor::get("/me");

        let mut headers = HeaderMap::new();
        BearerAuth::new(Arc::new(Token(Some("abc"))))
            .on_request(&request, &mut headers)
            .unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer abc");

        let mut headers = HeaderMap::new();
        BearerAuth::new(Arc::new(Token(None)))
            .on_request(&request, &mut headers)
            .unwrap();
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_pretty_body_falls_back_to_text() {
        assert_eq!(pretty_body(b"not json"), "not json");
        assert_eq!(pretty_body(br#"{"a":1}"#), "{\n  \"a\": 1\n}");
    }
}
