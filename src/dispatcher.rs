//! The request dispatcher.
//!
//! [`Dispatcher::dispatch`] fingerprints the request, consults the cache
//! according to the request's [`CachePolicy`](crate::CachePolicy), makes
//! sure at most one network call per fingerprint is outstanding, and
//! delivers decoded results or classified errors on the main context.

use crate::cache::ResponseCache;
use crate::context::{MainContext, SerialQueue};
use crate::decode::{DateStrategy, Decoder, JsonDecoder};
use crate::envelope::{Envelope, EnvelopeConfig};
use crate::fingerprint::Fingerprint;
use crate::inflight::InFlightRegistry;
use crate::metadata::{RequestDescriptor, RequestOptions};
use crate::policy::should_write_cache;
use crate::session::{FeedbackSink, Messages, Session};
use crate::store::{MemoryStore, Store};
use crate::transport::{BearerAuth, HttpTransport, Middleware, RawResponse, RequestLogger, Transport};
use crate::{Error, Response, Result};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use url::Url;

/// Dispatches requests with caching, de-duplication and envelope handling.
///
/// The dispatcher is cheap to clone and meant to be shared app-wide.
///
/// # Examples
///
/// ```no_run
/// use stashline::{CachePolicy, Dispatcher, RequestOptions};
/// use stashline::metadata::RequestDescriptor;
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize)]
/// struct Article {
///     id: u64,
///     title: String,
/// }
///
/// # async fn example() -> Result<(), stashline::Error> {
/// let dispatcher = Dispatcher::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// dispatcher.request::<Article, _, _>(
///     RequestDescriptor::get("/articles").with_page(1, 20),
///     RequestOptions::cached(CachePolicy::ReturnCacheThenFetch),
///     |response| {
///         let source = if response.is_from_cache { "cache" } else { "network" };
///         println!("{} articles from {}", response.items().len(), source);
///     },
///     |error| eprintln!("failed: {}", error),
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    transport: Arc<dyn Transport>,
    cache: ResponseCache,
    in_flight: Arc<InFlightRegistry>,
    main: Arc<dyn MainContext>,
    runtime: Handle,
    session: Option<Arc<dyn Session>>,
    feedback: Option<Arc<dyn FeedbackSink>>,
    envelope: EnvelopeConfig,
    messages: Messages,
    json: JsonDecoder,
    first_page: u64,
    page_parameter: String,
}

impl Dispatcher {
    /// Creates a new `DispatcherBuilder`.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Dispatches a request.
    ///
    /// Depending on the cache policy, `on_success` runs zero, one or two
    /// times (cached result first, network result second). `on_error` runs
    /// at most once per network call. All callbacks run on the main
    /// context.
    ///
    /// If an identical request is already in flight and this one would
    /// need the network, the network step is skipped and this call gets no
    /// network callback.
    pub fn dispatch<T, D, S, E>(
        &self,
        descriptor: RequestDescriptor,
        options: RequestOptions,
        decoder: D,
        on_success: S,
        on_error: E,
    ) -> RequestHandle
    where
        T: Send + 'static,
        D: Decoder<T> + 'static,
        S: Fn(Response<T>) + Send + Sync + 'static,
        E: Fn(Error) + Send + Sync + 'static,
    {
        let fingerprint = descriptor.fingerprint();
        let policy = options.cache_policy;
        let delivery = Arc::new(Delivery {
            inner: Arc::clone(&self.inner),
            options,
            decoder,
            on_success,
            on_error,
            _marker: PhantomData,
        });

        let cached = if policy.reads_cache() {
            self.inner.cache.get(&fingerprint)
        } else {
            None
        };
        let plan = policy.plan(cached.is_some());

        tracing::debug!(
            method = %descriptor.method,
            path = %descriptor.path,
            fingerprint = %fingerprint,
            policy = ?policy,
            cache_hit = cached.is_some(),
            "Dispatching request"
        );

        if let Some(body) = cached.filter(|_| plan.serve_cache) {
            let outcome = self
                .inner
                .interpret(body, None, None, true, &delivery.decoder);
            delivery.deliver(outcome);
        }

        if !plan.fetch {
            return RequestHandle::idle(fingerprint);
        }

        let Some(guard) = self.inner.in_flight.acquire(&fingerprint) else {
            tracing::debug!(fingerprint = %fingerprint, "Identical request already in flight, skipping");
            return RequestHandle::idle(fingerprint);
        };

        let inner = Arc::clone(&self.inner);
        let write_cache = should_write_cache(
            policy,
            descriptor.page(&inner.page_parameter),
            inner.first_page,
        );
        let silent = !plan.deliver_network;
        let key = fingerprint.clone();

        let task = self.inner.runtime.spawn(async move {
            let loading = (delivery.options.show_loading && !silent)
                .then(|| LoadingIndicator::start(Arc::clone(&inner)));

            let result = inner.transport.send(&descriptor).await;
            drop(guard);
            drop(loading);

            let outcome = result.and_then(|raw| inner.check_status(raw)).and_then(|raw| {
                inner.interpret(
                    raw.body,
                    Some(raw.status),
                    Some(raw.latency),
                    false,
                    &delivery.decoder,
                )
            });

            match outcome {
                Ok(response) => {
                    if write_cache {
                        inner.cache.set(&key, response.raw_body.clone());
                    }
                    if silent {
                        tracing::debug!(fingerprint = %key, "Background refresh stored");
                    } else {
                        delivery.deliver(Ok(response));
                    }
                }
                Err(e) => delivery.deliver(Err(e)),
            }
        });

        RequestHandle {
            fingerprint,
            task: Some(task),
        }
    }

    /// Dispatches a request whose payload decodes with serde, using the
    /// dispatcher's date strategy.
    pub fn request<T, S, E>(
        &self,
        descriptor: RequestDescriptor,
        options: RequestOptions,
        on_success: S,
        on_error: E,
    ) -> RequestHandle
    where
        T: DeserializeOwned + Send + 'static,
        S: Fn(Response<T>) + Send + Sync + 'static,
        E: Fn(Error) + Send + Sync + 'static,
    {
        let decoder = self.inner.json.clone();
        self.dispatch(descriptor, options, decoder, on_success, on_error)
    }

    /// Sends a request without caching, de-duplication or payload decoding.
    ///
    /// The envelope code is still checked. Loading, success and failure
    /// feedback follow `options` as for [`dispatch`](Self::dispatch), and an
    /// expired session still triggers the logout hook. The cache policy in
    /// `options` is ignored.
    pub async fn plain(
        &self,
        descriptor: RequestDescriptor,
        options: RequestOptions,
    ) -> Result<RawResponse> {
        let loading = options
            .show_loading
            .then(|| LoadingIndicator::start(Arc::clone(&self.inner)));

        let result = self
            .inner
            .transport
            .send(&descriptor)
            .await
            .and_then(|raw| self.inner.check_status(raw))
            .and_then(|raw| {
                Envelope::parse(&raw.body, &self.inner.envelope)?.check(&self.inner.envelope)?;
                Ok(raw)
            });
        drop(loading);

        let inner = Arc::clone(&self.inner);
        match &result {
            Ok(_) => {
                if let Some(message) = options.success_message {
                    self.inner
                        .main
                        .post(Box::new(move || inner.success_feedback(&message)));
                }
            }
            Err(e) => {
                let logout = e.requires_logout();
                let failure = options
                    .show_failure
                    .then(|| self.inner.messages.for_error(e));
                if logout || failure.is_some() {
                    self.inner.main.post(Box::new(move || {
                        inner.error_feedback(logout, failure.as_deref())
                    }));
                }
            }
        }
        result
    }

    /// Removes the cached response for `descriptor`.
    pub fn remove_cache(&self, descriptor: &RequestDescriptor) {
        self.inner.cache.remove(&descriptor.fingerprint());
    }

    /// Removes every cached response.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Number of requests currently on the network.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }
}

impl DispatcherInner {
    /// Turns a non-2xx status into a transport error.
    fn check_status(&self, raw: RawResponse) -> Result<RawResponse> {
        let status = raw.status;
        tracing::info!(
            status = status.as_u16(),
            latency_ms = raw.latency.as_millis(),
            "Received HTTP response"
        );

        if status.is_success() {
            return Ok(raw);
        }

        let raw_response = String::from_utf8_lossy(&raw.body).into_owned();
        if status.is_client_error() {
            tracing::error!(status = status.as_u16(), response = %raw_response, "Client error (4xx)");
        } else if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), response = %raw_response, "Server error (5xx)");
        }

        Err(Error::HttpError {
            status,
            raw_response,
            headers: Box::new(raw.headers),
        })
    }

    /// Parses the envelope, checks its code and decodes the payload.
    fn interpret<T, D>(
        &self,
        body: Bytes,
        status: Option<StatusCode>,
        latency: Option<Duration>,
        is_from_cache: bool,
        decoder: &D,
    ) -> Result<Response<T>>
    where
        D: Decoder<T> + ?Sized,
    {
        let envelope = Envelope::parse(&body, &self.envelope)?.check(&self.envelope)?;
        let code = envelope.code;
        let message = envelope.message.clone();
        let data = envelope
            .decode(decoder, &self.envelope, &body)
            .inspect_err(|e| {
                tracing::error!(error = %e, raw_response = %String::from_utf8_lossy(&body), "Failed to decode payload");
            })?;

        Ok(Response {
            data,
            code,
            message,
            raw_body: body,
            status,
            latency,
            is_from_cache,
        })
    }

    /// Posts `f` to the main context if there is a feedback sink.
    fn notify(self: &Arc<Self>, f: fn(&dyn FeedbackSink)) {
        if let Some(sink) = self.feedback.clone() {
            self.main.post(Box::new(move || f(sink.as_ref())));
        }
    }

    /// Runs the logout hooks. Must be called on the main context.
    fn force_logout(&self) {
        tracing::warn!("Session expired, forcing logout");
        if let Some(session) = &self.session {
            session.on_forced_logout();
        }
        if let Some(sink) = &self.feedback {
            sink.logout_required();
        }
    }

    /// Shows a success message. Must be called on the main context.
    fn success_feedback(&self, message: &str) {
        if let Some(sink) = &self.feedback {
            sink.show_success(message);
        }
    }

    /// Forces logout if asked to, then shows `failure` if given. Must be
    /// called on the main context.
    fn error_feedback(&self, logout: bool, failure: Option<&str>) {
        if logout {
            self.force_logout();
        }
        if let (Some(sink), Some(message)) = (&self.feedback, failure) {
            sink.show_failure(message);
        }
    }
}

/// Emits `loading_started` on creation and `loading_finished` on drop, so
/// a cancelled request still ends its loading indicator.
struct LoadingIndicator {
    inner: Arc<DispatcherInner>,
}

impl LoadingIndicator {
    fn start(inner: Arc<DispatcherInner>) -> Self {
        inner.notify(|sink| sink.loading_started());
        Self { inner }
    }
}

impl Drop for LoadingIndicator {
    fn drop(&mut self) {
        self.inner.notify(|sink| sink.loading_finished());
    }
}

/// A dispatch's callbacks and options.
struct Delivery<T, D, S, E> {
    inner: Arc<DispatcherInner>,
    options: RequestOptions,
    decoder: D,
    on_success: S,
    on_error: E,
    _marker: PhantomData<fn() -> T>,
}

impl<T, D, S, E> Delivery<T, D, S, E>
where
    T: Send + 'static,
    D: Decoder<T> + 'static,
    S: Fn(Response<T>) + Send + Sync + 'static,
    E: Fn(Error) + Send + Sync + 'static,
{
    fn deliver(self: &Arc<Self>, outcome: Result<Response<T>>) {
        let this = Arc::clone(self);
        self.inner
            .main
            .post(Box::new(move || this.complete(outcome)));
    }

    fn complete(&self, outcome: Result<Response<T>>) {
        match outcome {
            Ok(response) => {
                if let Some(message) = &self.options.success_message {
                    if !response.is_from_cache {
                        self.inner.success_feedback(message);
                    }
                }
                (self.on_success)(response);
            }
            Err(error) => {
                let failure = self
                    .options
                    .show_failure
                    .then(|| self.inner.messages.for_error(&error));
                self.inner
                    .error_feedback(error.requires_logout(), failure.as_deref());
                (self.on_error)(error);
            }
        }
    }
}

/// Handle to a dispatched request.
///
/// Dropping the handle does not cancel the request.
#[derive(Debug)]
pub struct RequestHandle {
    fingerprint: Fingerprint,
    task: Option<JoinHandle<()>>,
}

impl RequestHandle {
    fn idle(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            task: None,
        }
    }

    /// The request's fingerprint.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Whether a network call was started. `false` when the request was
    /// answered from the cache alone or skipped as a duplicate.
    pub fn is_dispatched(&self) -> bool {
        self.task.is_some()
    }

    /// Whether the network call (if any) has completed.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Cancels the network call by dropping the transport future. No
    /// callback is delivered for a cancelled call.
    pub fn cancel(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// Waits for the network call to complete. Callbacks are posted to the
    /// main context by then, but may not have run yet.
    pub async fn join(self) {
        if let Some(task) = self.task {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!(error = %e, "Request task panicked");
                }
            }
        }
    }
}

/// Builder for configuring and creating a [`Dispatcher`].
///
/// # Examples
///
/// ```no_run
/// use stashline::{Dispatcher, envelope::EnvelopeConfig, store::DiskStore};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), stashline::Error> {
/// let dispatcher = Dispatcher::builder()
///     .base_url("https://api.example.com")?
///     .timeout(Duration::from_secs(15))
///     .default_header("User-Agent", "my-app/1.0")?
///     .store(Arc::new(DiskStore::open("/tmp/my-app-cache")?))
///     .envelope(EnvelopeConfig { success_code: 200, ..Default::default() })
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct DispatcherBuilder {
    base_url: Option<Url>,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
    middleware: Vec<Arc<dyn Middleware>>,
    log_requests: bool,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn Store>>,
    session: Option<Arc<dyn Session>>,
    feedback: Option<Arc<dyn FeedbackSink>>,
    main_context: Option<Arc<dyn MainContext>>,
    envelope: EnvelopeConfig,
    messages: Messages,
    dates: DateStrategy,
    first_page: u64,
    page_parameter: String,
}

impl DispatcherBuilder {
    /// Creates a new `DispatcherBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            base_url: None,
            default_headers: HeaderMap::new(),
            timeout: None,
            middleware: Vec::new(),
            log_requests: true,
            transport: None,
            store: None,
            session: None,
            feedback: None,
            main_context: None,
            envelope: EnvelopeConfig::default(),
            messages: Messages::default(),
            dates: DateStrategy::default(),
            first_page: 1,
            page_parameter: "page".to_string(),
        }
    }

    /// Sets the base URL for the default HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Adds a header sent with every request by the default HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the request timeout of the default HTTP transport.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Appends a middleware to the default HTTP transport.
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Whether the default HTTP transport logs requests and responses.
    /// Defaults to `true`.
    pub fn log_requests(mut self, enabled: bool) -> Self {
        self.log_requests = enabled;
        self
    }

    /// Replaces the default HTTP transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the store behind the response cache. Defaults to a
    /// [`MemoryStore`].
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the session. With the default HTTP transport, its token is sent
    /// as a bearer token.
    pub fn session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = Some(session);
        self
    }

    /// Sets the feedback sink.
    pub fn feedback(mut self, feedback: Arc<dyn FeedbackSink>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// Sets the context callbacks are delivered on. Defaults to a new
    /// [`SerialQueue`].
    pub fn main_context(mut self, main_context: Arc<dyn MainContext>) -> Self {
        self.main_context = Some(main_context);
        self
    }

    /// Sets the envelope key names and sentinel codes.
    pub fn envelope(mut self, envelope: EnvelopeConfig) -> Self {
        self.envelope = envelope;
        self
    }

    /// Sets the user-visible fallback messages.
    pub fn messages(mut self, messages: Messages) -> Self {
        self.messages = messages;
        self
    }

    /// Sets the date strategy used by [`Dispatcher::request`].
    pub fn date_strategy(mut self, dates: DateStrategy) -> Self {
        self.dates = dates;
        self
    }

    /// Sets the first page number. Defaults to 1.
    pub fn first_page(mut self, first_page: u64) -> Self {
        self.first_page = first_page;
        self
    }

    /// Sets the parameter holding the page number. Defaults to `"page"`.
    pub fn page_parameter(mut self, name: impl Into<String>) -> Self {
        self.page_parameter = name.into();
        self
    }

    /// Builds the configured `Dispatcher`.
    ///
    /// # Errors
    ///
    /// Returns an error if called outside a Tokio runtime, or if neither a
    /// transport nor a base URL was provided.
    pub fn build(self) -> Result<Dispatcher> {
        let runtime = Handle::try_current().map_err(|e| {
            Error::ConfigurationError(format!("Dispatcher requires a Tokio runtime: {}", e))
        })?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let base_url = self.base_url.ok_or_else(|| {
                    Error::ConfigurationError("Base URL is required".to_string())
                })?;
                let mut http = HttpTransport::new(base_url)?
                    .with_default_headers(self.default_headers)
                    .with_timeout(self.timeout);
                if let Some(session) = &self.session {
                    http = http.with_middleware(Arc::new(BearerAuth::new(Arc::clone(session))));
                }
                for middleware in self.middleware {
                    http = http.with_middleware(middleware);
                }
                if self.log_requests {
                    http = http.with_middleware(Arc::new(RequestLogger));
                }
                Arc::new(http)
            }
        };

        let main = match self.main_context {
            Some(main) => main,
            None => Arc::new(SerialQueue::spawn()?),
        };

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));

        Ok(Dispatcher {
            inner: Arc::new(DispatcherInner {
                transport,
                cache: ResponseCache::new(store),
                in_flight: Arc::new(InFlightRegistry::new()),
                main,
                runtime,
                session: self.session,
                feedback: self.feedback,
                envelope: self.envelope,
                messages: self.messages,
                json: JsonDecoder::with_dates(self.dates),
                first_page: self.first_page,
                page_parameter: self.page_parameter,
            }),
        })
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
