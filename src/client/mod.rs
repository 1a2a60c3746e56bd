//! Typed client for the bypass service HTTP API.
//!
//! Every action endpoint (`/detect`, `/bypass`, `/screenshot`, `/stats`)
//! answers with a `{success, data, error}` envelope. The `success` flag is
//! authoritative: a `200 OK` carrying `success: false` is still a failure.

mod types;

pub use types::{BypassOptions, BypassResult, Cookie, DetectionResult, HealthStatus};
pub(crate) use types::ApiEnvelope;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::time::sleep;

use crate::config::{ClientConfig, ConfigError};
use crate::transport::{
    ReqwestServiceTransport, ServiceRequest, ServiceTransport, TransportError, endpoint_url,
};

/// Result alias used by the client.
pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid header '{0}'")]
    InvalidHeader(String),
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Non-2xx answer; `message` comes from the body `error` field when present.
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("detection failed: {0}")]
    Detection(String),
    #[error("bypass failed: {0}")]
    Bypass(String),
    #[error("screenshot failed: {0}")]
    Screenshot(String),
    #[error("stats unavailable: {0}")]
    Stats(String),
    #[error("service not available after {attempts} attempts")]
    ServiceUnavailable { attempts: u32 },
    #[error("invalid screenshot encoding: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Async client for the bypass service.
///
/// Stateless per call: each method issues its own request(s) and nothing is
/// cached between calls.
#[derive(Clone)]
pub struct BypassClient {
    base_url: String,
    timeout: Duration,
    headers: HeaderMap,
    transport: Arc<dyn ServiceTransport>,
}

impl BypassClient {
    /// Client for `base_url` with the default 120 s timeout.
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let config = ClientConfig::builder().base_url(base_url).build()?;
        Self::with_config(config)
    }

    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        let transport = ReqwestServiceTransport::new()?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Build a client on top of an arbitrary transport.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn ServiceTransport>,
    ) -> ClientResult<Self> {
        config.validate()?;
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ClientError::InvalidHeader(name.clone()))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| ClientError::InvalidHeader(name.clone()))?;
            headers.insert(header_name, header_value);
        }

        Ok(Self {
            base_url: config.normalized_base_url(),
            timeout: config.timeout,
            headers,
            transport,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue a single call and return the decoded JSON body.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> ClientResult<Value> {
        let url = endpoint_url(&self.base_url, endpoint)?;
        let request = ServiceRequest::new(method, url, self.timeout)
            .with_headers(self.headers.clone())
            .with_body(body);

        let response = self.transport.send(request).await?;
        let decoded = response.decode::<Value>();

        if !response.is_success() {
            let message = decoded
                .ok()
                .and_then(|body| {
                    body.get("error")
                        .and_then(Value::as_str)
                        .map(str::to_owned)
                })
                .unwrap_or_else(|| format!("HTTP {}", response.status));
            return Err(ClientError::Status {
                status: response.status,
                message,
            });
        }

        Ok(decoded?)
    }

    /// Raw `/health` payload. Errors propagate.
    pub async fn health(&self) -> ClientResult<HealthStatus> {
        let body = self.request(Method::GET, "/health", None).await?;
        Ok(serde_json::from_value(body)?)
    }

    /// `true` iff `/health` reports `status: "healthy"`. Never fails.
    pub async fn is_healthy(&self) -> bool {
        match self.health().await {
            Ok(health) => health.is_healthy(),
            Err(err) => {
                log::debug!("health check against {} failed: {err}", self.base_url);
                false
            }
        }
    }

    /// Poll [`is_healthy`](Self::is_healthy) until it succeeds or
    /// `max_attempts` probes have failed, sleeping `interval` in between.
    pub async fn wait_for_service(
        &self,
        max_attempts: u32,
        interval: Duration,
    ) -> ClientResult<bool> {
        for attempt in 1..=max_attempts {
            if self.is_healthy().await {
                log::info!("bypass service at {} ready after {attempt} attempt(s)", self.base_url);
                return Ok(true);
            }
            if attempt < max_attempts && !interval.is_zero() {
                sleep(interval).await;
            }
        }

        log::warn!(
            "bypass service at {} not available after {max_attempts} attempts",
            self.base_url
        );
        Err(ClientError::ServiceUnavailable {
            attempts: max_attempts,
        })
    }

    pub async fn detect(&self, url: &str) -> ClientResult<DetectionResult> {
        self.action(
            Method::POST,
            "/detect",
            Some(json!({ "url": url })),
            ClientError::Detection,
            "Detection failed",
        )
        .await
    }

    /// Run a bypass and return the service-native result.
    pub async fn bypass(&self, url: &str, options: &BypassOptions) -> ClientResult<BypassResult> {
        options.validate()?;
        self.action(
            Method::POST,
            "/bypass",
            Some(json!({ "url": url, "options": options })),
            ClientError::Bypass,
            "Bypass failed",
        )
        .await
    }

    /// Screenshot with automatic bypass when the service deems it necessary.
    pub async fn screenshot(&self, url: &str, options: &BypassOptions) -> ClientResult<Value> {
        options.validate()?;
        self.action(
            Method::POST,
            "/screenshot",
            Some(json!({ "url": url, "options": options })),
            ClientError::Screenshot,
            "Screenshot failed",
        )
        .await
    }

    pub async fn get_stats(&self) -> ClientResult<Value> {
        self.action(
            Method::GET,
            "/stats",
            None,
            ClientError::Stats,
            "Failed to get stats",
        )
        .await
    }

    /// Decode a base64 screenshot. Line breaks and other ASCII whitespace
    /// inside the payload are ignored.
    pub fn decode_screenshot(data: &str) -> ClientResult<Vec<u8>> {
        let compact: Vec<u8> = data
            .bytes()
            .filter(|byte| !byte.is_ascii_whitespace())
            .collect();
        Ok(BASE64.decode(compact)?)
    }

    pub async fn save_screenshot(data: &str, path: impl AsRef<Path>) -> ClientResult<()> {
        let bytes = Self::decode_screenshot(data)?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn action<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        failure: fn(String) -> ClientError,
        default_message: &str,
    ) -> ClientResult<T> {
        let body = self.request(method, endpoint, body).await?;
        let envelope: ApiEnvelope<Value> = serde_json::from_value(body)?;

        if !envelope.success {
            return Err(failure(
                envelope
                    .error
                    .unwrap_or_else(|| default_message.to_string()),
            ));
        }

        Ok(serde_json::from_value(envelope.data.unwrap_or(Value::Null))?)
    }
}

impl std::fmt::Debug for BypassClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BypassClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
