//! Wire types exchanged with the bypass service.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::{ConfigError, validate_viewport};

/// Reads an explicit `null` the same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Envelope wrapping every action endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiEnvelope<T> {
    #[serde(default, deserialize_with = "null_as_default")]
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

/// Result of `/detect`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub cloudflare_detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indicator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
}

/// Cookie captured by the service after a bypass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
    /// Browser-specific attributes the service passes through untouched.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// Service-native result of `/bypass`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BypassResult {
    #[serde(default)]
    pub screenshot: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cookies: Vec<Cookie>,
    #[serde(default)]
    pub final_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cloudflare_detected: bool,
    #[serde(default)]
    pub cloudflare_indicator: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bypass_successful: bool,
    /// Stage name to duration in milliseconds.
    #[serde(default, deserialize_with = "null_as_default")]
    pub timing: HashMap<String, f64>,
}

/// Raw `/health` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Options accepted by `/bypass` and `/screenshot`.
///
/// Defaults target direct API use: 1920x1080 full-page capture in headless
/// mode with a 3 s settle delay after the challenge clears.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BypassOptions {
    pub headless: bool,
    pub screenshot: bool,
    pub full_page: bool,
    pub width: u32,
    pub height: u32,
    /// Milliseconds.
    pub wait_after_bypass: u64,
    /// Bypass timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

impl Default for BypassOptions {
    fn default() -> Self {
        Self {
            headless: true,
            screenshot: true,
            full_page: true,
            width: 1920,
            height: 1080,
            wait_after_bypass: 3000,
            timeout: None,
            user_agent: None,
            proxy: None,
        }
    }
}

impl BypassOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_viewport(self.width, self.height)
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_full_page(mut self, full_page: bool) -> Self {
        self.full_page = full_page;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_screenshot(mut self, screenshot: bool) -> Self {
        self.screenshot = screenshot;
        self
    }

    pub fn with_wait_after_bypass(mut self, millis: u64) -> Self {
        self.wait_after_bypass = millis;
        self
    }

    pub fn with_timeout(mut self, millis: u64) -> Self {
        self.timeout = Some(millis);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }
}
