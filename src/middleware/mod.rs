//! Capture-routing middleware.
//!
//! Decides per request whether the bypass service should take over a
//! capture, performs the bypass call, reshapes the result for the host tool,
//! and falls back to the host's own capture function when the service is
//! down or the bypass fails.
//!
//! Routing for one [`BypassMiddleware::capture_with_fallback`] call:
//!
//! 1. Availability probe (`/health`, short timeout). Unreachable → normal path.
//! 2. Detection (`/detect`). Failure degrades to "not protected".
//! 3. Protected → bypass (`/bypass`) and translation. On failure either
//!    propagate (fallback disabled) or continue with the normal path.
//! 4. Normal path: the host capture function, called exactly once.

mod plugin;
mod translate;

pub use plugin::BypassPlugin;
pub use translate::{
    CaptureConfigEcho, CloudflareBypassInfo, DomElements, HostCaptureResult, SCREENSHOT_FORMAT,
};

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use http::Method;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Value, json};
use thiserror::Error;

use crate::client::{ApiEnvelope, BypassResult, DetectionResult, HealthStatus};
use crate::config::{ConfigError, MiddlewareConfig, validate_viewport};
use crate::modules::events::{
    AvailabilityEvent, BypassEvent, CaptureEvent, DetectionEvent, EventDispatcher, EventHandler,
    FallbackEvent, LoggingHandler, MetricsHandler, NormalCaptureEvent,
};
use crate::modules::metrics::{MetricsCollector, RoutingStats};
use crate::transport::{
    ReqwestServiceTransport, ServiceRequest, ServiceTransport, TransportError, endpoint_url,
};

/// Settle delay requested from the service when the caller asked for none.
pub const DEFAULT_WAIT_AFTER_BYPASS_MS: u64 = 3000;

/// Failure of the bypass path, raised by [`BypassMiddleware::capture`].
#[derive(Debug, Error)]
pub enum BypassServiceError {
    #[error("Bypass service error: {0}")]
    Transport(#[from] TransportError),
    #[error("Bypass service error: invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
    #[error("Bypass service error (HTTP {status}): {body}")]
    Status { status: u16, body: String },
    /// The service answered but reported `success: false`.
    #[error("Bypass service error: {body}")]
    Rejected { body: String },
    #[error("Bypass service error: malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    /// Rejected locally before anything was sent.
    #[error("Bypass service error: {0}")]
    InvalidOptions(#[from] ConfigError),
}

/// Error surfaced by [`BypassMiddleware::capture_with_fallback`].
#[derive(Debug, Error)]
pub enum FallbackError<E> {
    /// Only produced when fallback is disabled.
    #[error(transparent)]
    Bypass(BypassServiceError),
    /// The host capture function failed; passed through untouched.
    #[error("host capture failed: {0}")]
    Host(E),
}

/// Errors raised while constructing a middleware.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("transport initialisation failed: {0}")]
    Transport(#[from] TransportError),
}

/// Capture options in the host tool's vocabulary.
///
/// Defaults mirror the host tool: a 1024x768 viewport, no full-page capture
/// and no extra delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureOptions {
    pub full_page: bool,
    pub width: u32,
    pub height: u32,
    /// Seconds to wait before capturing.
    pub delay: u64,
    /// Accepted for interface compatibility; the bypass service never returns HTML.
    pub grab_html: bool,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    /// Bypass timeout in milliseconds, forwarded to the service.
    pub timeout: Option<u64>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            full_page: false,
            width: 1024,
            height: 768,
            delay: 0,
            grab_html: false,
            user_agent: None,
            proxy: None,
            timeout: None,
        }
    }
}

impl CaptureOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_viewport(self.width, self.height)
    }

    pub fn wait_after_bypass_ms(&self) -> u64 {
        if self.delay > 0 {
            self.delay.saturating_mul(1000)
        } else {
            DEFAULT_WAIT_AFTER_BYPASS_MS
        }
    }
}

/// Options sent to `/bypass`, in the service vocabulary.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceCaptureOptions<'a> {
    full_page: bool,
    width: u32,
    height: u32,
    wait_after_bypass: u64,
    screenshot: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_agent: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy: Option<&'a str>,
}

impl<'a> From<&'a CaptureOptions> for ServiceCaptureOptions<'a> {
    fn from(options: &'a CaptureOptions) -> Self {
        Self {
            full_page: options.full_page,
            width: options.width,
            height: options.height,
            wait_after_bypass: options.wait_after_bypass_ms(),
            screenshot: true,
            timeout: options.timeout,
            user_agent: options.user_agent.as_deref(),
            proxy: options.proxy.as_deref(),
        }
    }
}

/// Last known reachability of the bypass service.
///
/// Advisory only: it is overwritten by every availability probe and never
/// consulted as a gate, the probe is always re-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAvailability {
    Unknown,
    Available,
    Unavailable,
}

impl ServiceAvailability {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Available,
            2 => Self::Unavailable,
            _ => Self::Unknown,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Available => 1,
            Self::Unavailable => 2,
        }
    }
}

/// Outcome of [`BypassMiddleware::detect_cloudflare`]. Never an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DetectionOutcome {
    Reported(DetectionResult),
    /// The service could not be asked; reads as "not detected".
    Failed(DetectionFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionFailure {
    pub error: String,
}

impl Serialize for DetectionFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DetectionFailure", 2)?;
        state.serialize_field("cloudflareDetected", &false)?;
        state.serialize_field("error", &self.error)?;
        state.end()
    }
}

impl DetectionOutcome {
    pub fn cloudflare_detected(&self) -> bool {
        match self {
            Self::Reported(result) => result.cloudflare_detected,
            Self::Failed(_) => false,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Reported(_) => None,
            Self::Failed(failure) => Some(&failure.error),
        }
    }

    pub fn result(&self) -> Option<&DetectionResult> {
        match self {
            Self::Reported(result) => Some(result),
            Self::Failed(_) => None,
        }
    }
}

/// Which path produced a [`capture_with_fallback`](BypassMiddleware::capture_with_fallback) result.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome<T> {
    Bypassed(HostCaptureResult),
    Normal(T),
}

impl<T> CaptureOutcome<T> {
    pub fn is_bypassed(&self) -> bool {
        matches!(self, Self::Bypassed(_))
    }

    pub fn bypassed(&self) -> Option<&HostCaptureResult> {
        match self {
            Self::Bypassed(result) => Some(result),
            Self::Normal(_) => None,
        }
    }

    pub fn into_normal(self) -> Option<T> {
        match self {
            Self::Bypassed(_) => None,
            Self::Normal(value) => Some(value),
        }
    }
}

/// Fluent builder for [`BypassMiddleware`].
pub struct BypassMiddlewareBuilder {
    config: MiddlewareConfig,
    transport: Option<Arc<dyn ServiceTransport>>,
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl BypassMiddlewareBuilder {
    pub fn new() -> Self {
        Self {
            config: MiddlewareConfig::default(),
            transport: None,
            handlers: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: MiddlewareConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_service_url(mut self, url: impl Into<String>) -> Self {
        self.config.service_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.config.health_timeout = timeout;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn ServiceTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn disable_auto_detect(mut self) -> Self {
        self.config.auto_detect = false;
        self
    }

    pub fn disable_fallback(mut self) -> Self {
        self.config.fallback_to_normal = false;
        self
    }

    pub fn disable_metrics(mut self) -> Self {
        self.config.enable_metrics = false;
        self
    }

    pub fn build(self) -> Result<BypassMiddleware, MiddlewareError> {
        self.config.validate()?;
        let transport: Arc<dyn ServiceTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestServiceTransport::new()?),
        };

        let metrics = self.config.enable_metrics.then(MetricsCollector::new);
        let mut events = EventDispatcher::new();
        events.register_handler(Arc::new(LoggingHandler));
        if let Some(ref collector) = metrics {
            events.register_handler(Arc::new(MetricsHandler::new(collector.clone())));
        }
        for handler in self.handlers {
            events.register_handler(handler);
        }

        Ok(BypassMiddleware {
            service_url: self.config.normalized_service_url(),
            config: self.config,
            transport,
            events,
            metrics,
            availability: AtomicU8::new(ServiceAvailability::Unknown.as_u8()),
        })
    }
}

impl Default for BypassMiddlewareBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes captures between the bypass service and the host's own capture.
pub struct BypassMiddleware {
    config: MiddlewareConfig,
    service_url: String,
    transport: Arc<dyn ServiceTransport>,
    events: EventDispatcher,
    metrics: Option<MetricsCollector>,
    availability: AtomicU8,
}

impl BypassMiddleware {
    /// Middleware for `service_url` with default settings.
    pub fn new(service_url: impl Into<String>) -> Result<Self, MiddlewareError> {
        Self::builder().with_service_url(service_url).build()
    }

    pub fn builder() -> BypassMiddlewareBuilder {
        BypassMiddlewareBuilder::new()
    }

    pub fn config(&self) -> &MiddlewareConfig {
        &self.config
    }

    pub fn service_availability(&self) -> ServiceAvailability {
        ServiceAvailability::from_u8(self.availability.load(Ordering::Relaxed))
    }

    /// Routing counters, `None` when metrics are disabled.
    pub fn metrics(&self) -> Option<RoutingStats> {
        self.metrics.as_ref().map(MetricsCollector::snapshot)
    }

    /// Liveness probe against `/health` using the short health timeout.
    ///
    /// Never fails. Transport and decode errors are logged and cached as
    /// [`ServiceAvailability::Unavailable`]; a non-2xx answer returns `false`
    /// and leaves the cached value alone.
    pub async fn is_service_available(&self) -> bool {
        let (available, error) = match self.probe_health().await {
            Ok(Some(healthy)) => {
                self.store_availability(if healthy {
                    ServiceAvailability::Available
                } else {
                    ServiceAvailability::Unavailable
                });
                (healthy, None)
            }
            Ok(None) => (false, None),
            Err(err) => {
                self.store_availability(ServiceAvailability::Unavailable);
                (false, Some(err.to_string()))
            }
        };

        self.events.dispatch(CaptureEvent::Availability(AvailabilityEvent {
            service_url: self.service_url.clone(),
            available,
            error,
            timestamp: Utc::now(),
        }));
        available
    }

    /// Ask the service whether `url` is Cloudflare-protected. Never fails.
    pub async fn detect_cloudflare(&self, url: &str) -> DetectionOutcome {
        let outcome = match self.request_detection(url).await {
            Ok(result) => DetectionOutcome::Reported(result),
            Err(err) => DetectionOutcome::Failed(DetectionFailure {
                error: err.to_string(),
            }),
        };

        self.events.dispatch(CaptureEvent::Detection(DetectionEvent {
            url: url.to_string(),
            detected: outcome.cloudflare_detected(),
            indicator: outcome.result().and_then(|r| r.indicator.clone()),
            error: outcome.error().map(str::to_owned),
            timestamp: Utc::now(),
        }));
        outcome
    }

    /// `true` only when auto-detection is on, the service is reachable, and
    /// it positively reports Cloudflare protection for `url`.
    pub async fn needs_bypass(&self, url: &str) -> bool {
        if !self.config.auto_detect {
            return false;
        }

        if !self.is_service_available().await {
            return false;
        }

        self.detect_cloudflare(url).await.cloudflare_detected()
    }

    /// Capture through the bypass service. No fallback happens here.
    pub async fn capture(
        &self,
        url: &str,
        options: &CaptureOptions,
    ) -> Result<HostCaptureResult, BypassServiceError> {
        let started = Instant::now();
        let result = match options.validate() {
            Ok(()) => self.request_bypass(url, options).await,
            Err(err) => Err(err.into()),
        };
        let latency = started.elapsed();

        self.events.dispatch(CaptureEvent::Bypass(BypassEvent {
            url: url.to_string(),
            success: result.is_ok(),
            latency,
            error: result.as_ref().err().map(ToString::to_string),
            timestamp: Utc::now(),
        }));

        result.map(|data| HostCaptureResult::from_bypass(url, options, data))
    }

    /// Capture via the bypass service when needed, otherwise (or on bypass
    /// failure with fallback enabled) via `host_capture`.
    ///
    /// Exactly one of the two paths produces the result. `host_capture` is
    /// invoked at most once and its errors come back as
    /// [`FallbackError::Host`].
    pub async fn capture_with_fallback<F, Fut, T, E>(
        &self,
        url: &str,
        host_capture: F,
        options: &CaptureOptions,
    ) -> Result<CaptureOutcome<T>, FallbackError<E>>
    where
        F: FnOnce(String, CaptureOptions) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.needs_bypass(url).await {
            match self.capture(url, options).await {
                Ok(result) => return Ok(CaptureOutcome::Bypassed(result)),
                Err(err) if !self.config.fallback_to_normal => {
                    return Err(FallbackError::Bypass(err));
                }
                Err(err) => {
                    self.events.dispatch(CaptureEvent::Fallback(FallbackEvent {
                        url: url.to_string(),
                        reason: err.to_string(),
                        timestamp: Utc::now(),
                    }));
                }
            }
        }

        self.events
            .dispatch(CaptureEvent::NormalCapture(NormalCaptureEvent {
                url: url.to_string(),
                timestamp: Utc::now(),
            }));
        host_capture(url.to_string(), options.clone())
            .await
            .map(CaptureOutcome::Normal)
            .map_err(FallbackError::Host)
    }

    /// `Ok(None)` when the service answered with a non-2xx status.
    async fn probe_health(&self) -> Result<Option<bool>, BypassServiceError> {
        let request = self.service_request(
            Method::GET,
            "/health",
            None,
            self.config.health_timeout,
        )?;
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Ok(None);
        }
        let health: HealthStatus = response.decode()?;
        Ok(Some(health.is_healthy()))
    }

    async fn request_detection(&self, url: &str) -> Result<DetectionResult, BypassServiceError> {
        let data = self
            .call_action("/detect", json!({ "url": url }), self.config.timeout)
            .await?;
        Ok(serde_json::from_value(data)?)
    }

    async fn request_bypass(
        &self,
        url: &str,
        options: &CaptureOptions,
    ) -> Result<BypassResult, BypassServiceError> {
        let body = json!({
            "url": url,
            "options": ServiceCaptureOptions::from(options),
        });
        let data = self
            .call_action("/bypass", body, self.config.timeout)
            .await?;
        Ok(serde_json::from_value(data)?)
    }

    /// POST to an action endpoint and unwrap the `{success, data}` envelope.
    async fn call_action(
        &self,
        endpoint: &str,
        body: Value,
        timeout: Duration,
    ) -> Result<Value, BypassServiceError> {
        let request = self.service_request(Method::POST, endpoint, Some(body), timeout)?;
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(BypassServiceError::Status {
                status: response.status,
                body: response.text(),
            });
        }

        let envelope: ApiEnvelope<Value> = response.decode()?;
        if !envelope.success {
            return Err(BypassServiceError::Rejected {
                body: response.text(),
            });
        }
        Ok(envelope.data.unwrap_or(Value::Null))
    }

    fn service_request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        timeout: Duration,
    ) -> Result<ServiceRequest, BypassServiceError> {
        let url = endpoint_url(&self.service_url, endpoint)?;
        Ok(ServiceRequest::new(method, url, timeout).with_body(body))
    }

    fn store_availability(&self, availability: ServiceAvailability) {
        self.availability
            .store(availability.as_u8(), Ordering::Relaxed);
    }
}

impl std::fmt::Debug for BypassMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BypassMiddleware")
            .field("service_url", &self.service_url)
            .field("auto_detect", &self.config.auto_detect)
            .field("fallback_to_normal", &self.config.fallback_to_normal)
            .field("availability", &self.service_availability())
            .finish_non_exhaustive()
    }
}
