//! Host-tool response shape and its mapping from the service-native result.
//!
//! Every key the host tool reads is always present, even when the bypass
//! service had nothing to put in it, so callers never special-case results
//! that came through the bypass path. `cookies` is the only optional key.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::CaptureOptions;
use crate::client::{BypassResult, Cookie};

pub const SCREENSHOT_FORMAT: &str = "png";

/// Capture result in the host tool's response schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostCaptureResult {
    pub screenshot: Option<String>,
    pub screenshot_format: String,
    /// Always empty, the bypass service does not record network activity.
    pub network_logs: Vec<Value>,
    pub dom_elements: DomElements,
    pub final_url: String,
    pub capture_config: CaptureConfigEcho,
    pub cloudflare_bypass: CloudflareBypassInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<Vec<Cookie>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomElements {
    pub clickable_elements: Vec<Value>,
    pub forms: Vec<Value>,
    pub scripts: Vec<Value>,
    pub popups: Vec<Value>,
}

/// Echo of the capture parameters the caller asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfigEcho {
    pub full_page: bool,
    pub width: u32,
    pub height: u32,
    pub delay: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudflareBypassInfo {
    pub detected: bool,
    pub indicator: Option<String>,
    pub successful: bool,
    pub timing: HashMap<String, f64>,
}

impl HostCaptureResult {
    pub fn from_bypass(url: &str, options: &CaptureOptions, data: BypassResult) -> Self {
        let cookies = (!data.cookies.is_empty()).then_some(data.cookies);

        Self {
            screenshot: data.screenshot,
            screenshot_format: SCREENSHOT_FORMAT.to_string(),
            network_logs: Vec::new(),
            dom_elements: DomElements::default(),
            final_url: data.final_url.unwrap_or_else(|| url.to_string()),
            capture_config: CaptureConfigEcho {
                full_page: options.full_page,
                width: options.width,
                height: options.height,
                delay: options.delay,
            },
            cloudflare_bypass: CloudflareBypassInfo {
                detected: data.cloudflare_detected,
                indicator: data.cloudflare_indicator,
                successful: data.bypass_successful,
                timing: data.timing,
            },
            cookies,
        }
    }
}
