//! HTTP seam between the library and the bypass service.
//!
//! Both the [`BypassClient`](crate::client::BypassClient) and the
//! [`BypassMiddleware`](crate::middleware::BypassMiddleware) issue their
//! calls through [`ServiceTransport`], so the concrete transport can be
//! swapped (or scripted in tests) without touching the routing logic.

mod reqwest_client;

pub use reqwest_client::ReqwestServiceTransport;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Contract implemented by transports able to reach the bypass service.
///
/// Implementations must send the body as JSON with
/// `Content-Type: application/json` and honour the per-request timeout.
#[async_trait]
pub trait ServiceTransport: Send + Sync {
    async fn send(&self, request: ServiceRequest) -> Result<ServiceResponse, TransportError>;
}

/// Single call to the bypass service.
#[derive(Debug, Clone)]
pub struct ServiceRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl ServiceRequest {
    pub fn new(method: Method, url: Url, timeout: Duration) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }

    /// Path component, handy for logging and for scripted transports.
    pub fn path(&self) -> &str {
        self.url.path()
    }
}

/// Raw response as returned by the transport.
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ServiceResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Convenience constructor serializing `value` as the body.
    pub fn json(status: u16, value: &Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("http transport error: {0}")]
    Other(String),
}

/// Joins an endpoint path onto the service base URL.
///
/// The base is expected without trailing slash, endpoints start with `/`.
pub(crate) fn endpoint_url(base: &str, endpoint: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!("{base}{endpoint}"))
}
