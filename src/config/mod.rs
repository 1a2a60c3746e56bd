//! Settings and configuration module
//!
//! Provides typed configuration for the service client and the capture
//! middleware with:
//! - Builder pattern
//! - JSON loading (durations expressed in seconds)
//! - Validation of service URLs and timeouts

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const DEFAULT_SERVICE_URL: &str = "http://localhost:3001";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid service url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration for [`BypassClient`](crate::client::BypassClient).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Extra headers sent with every request.
    pub headers: HashMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVICE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            headers: HashMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url(&self.base_url)?;
        validate_timeout("timeout", self.timeout)
    }

    /// Base URL with any trailing slash removed.
    pub fn normalized_base_url(&self) -> String {
        self.base_url.trim_end_matches('/').to_string()
    }
}

/// Fluent builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration for [`BypassMiddleware`](crate::middleware::BypassMiddleware).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MiddlewareConfig {
    pub service_url: String,
    /// Timeout applied to detect and bypass calls.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Timeout for the liveness probe, kept short on purpose.
    #[serde(with = "duration_secs")]
    pub health_timeout: Duration,
    pub auto_detect: bool,
    pub fallback_to_normal: bool,
    pub enable_metrics: bool,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            auto_detect: true,
            fallback_to_normal: true,
            enable_metrics: true,
        }
    }
}

impl MiddlewareConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url(&self.service_url)?;
        validate_timeout("timeout", self.timeout)?;
        validate_timeout("health_timeout", self.health_timeout)
    }

    pub fn normalized_service_url(&self) -> String {
        self.service_url.trim_end_matches('/').to_string()
    }
}

fn validate_url(raw: &str) -> Result<(), ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::InvalidUrl {
        url: raw.to_string(),
        source,
    })?;
    Ok(())
}

fn validate_timeout(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::InvalidValue {
            field,
            reason: "must be greater than zero".into(),
        });
    }
    Ok(())
}

/// Both viewport dimensions must be non-zero.
pub(crate) fn validate_viewport(width: u32, height: u32) -> Result<(), ConfigError> {
    if width == 0 {
        return Err(ConfigError::InvalidValue {
            field: "width",
            reason: "viewport width must be greater than zero".into(),
        });
    }
    if height == 0 {
        return Err(ConfigError::InvalidValue {
            field: "height",
            reason: "viewport height must be greater than zero".into(),
        });
    }
    Ok(())
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
