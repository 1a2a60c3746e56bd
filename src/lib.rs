//! # cfbypass-integrations
//!
//! Client and capture middleware for a remote Cloudflare bypass service.
//!
//! The bypass service does the actual challenge solving in a real browser.
//! This crate only talks to it: [`BypassClient`] wraps its HTTP API, and
//! [`BypassMiddleware`] plugs it into an existing screenshot tool, routing a
//! capture through the service only when the target is Cloudflare-protected
//! and falling back to the tool's own capture otherwise.
//!
//! ## Features
//!
//! - Typed async client for `/health`, `/detect`, `/bypass`, `/screenshot`, `/stats`
//! - Bounded wait-for-service polling
//! - Automatic detection and routing with fallback to the host capture
//! - Results reshaped into the host tool's response schema
//! - Routing events and counters through pluggable handlers
//!
//! ## Example
//!
//! ```no_run
//! use cfbypass_integrations::{BypassMiddleware, CaptureOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let middleware = BypassMiddleware::new("http://localhost:3001")?;
//!     let outcome = middleware
//!         .capture_with_fallback(
//!             "https://protected-site.com",
//!             |url, _options| async move {
//!                 // The host tool's regular capture goes here.
//!                 Ok::<_, std::io::Error>(serde_json::json!({ "screenshot": null, "url": url }))
//!             },
//!             &CaptureOptions::default(),
//!         )
//!         .await?;
//!     println!("went through bypass service: {}", outcome.is_bypassed());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod middleware;
pub mod modules;
pub mod transport;

pub use crate::client::{
    BypassClient,
    BypassOptions,
    BypassResult,
    ClientError,
    ClientResult,
    Cookie,
    DetectionResult,
    HealthStatus,
};

pub use crate::config::{ClientConfig, ClientConfigBuilder, ConfigError, MiddlewareConfig};

pub use crate::middleware::{
    BypassMiddleware,
    BypassMiddlewareBuilder,
    BypassPlugin,
    BypassServiceError,
    CaptureConfigEcho,
    CaptureOptions,
    CaptureOutcome,
    CloudflareBypassInfo,
    DetectionFailure,
    DetectionOutcome,
    DomElements,
    FallbackError,
    HostCaptureResult,
    MiddlewareError,
    ServiceAvailability,
};

pub use crate::modules::{
    CaptureEvent,
    EventDispatcher,
    EventHandler,
    LoggingHandler,
    MetricsCollector,
    MetricsHandler,
    RoutingStats,
};

pub use crate::transport::{
    ReqwestServiceTransport,
    ServiceRequest,
    ServiceResponse,
    ServiceTransport,
    TransportError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
