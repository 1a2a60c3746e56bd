//! Event system for the capture middleware.
//!
//! Provides hooks for metrics, logging, and custom reactions around each
//! routing step (availability probe, detection, bypass, fallback).

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use super::metrics::MetricsCollector;

#[derive(Debug, Clone)]
pub struct AvailabilityEvent {
    pub service_url: String,
    pub available: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub url: String,
    pub detected: bool,
    pub indicator: Option<String>,
    /// Set when the service could not be asked; `detected` is then `false`.
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BypassEvent {
    pub url: String,
    pub success: bool,
    pub latency: Duration,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FallbackEvent {
    pub url: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NormalCaptureEvent {
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum CaptureEvent {
    Availability(AvailabilityEvent),
    Detection(DetectionEvent),
    Bypass(BypassEvent),
    Fallback(FallbackEvent),
    NormalCapture(NormalCaptureEvent),
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &CaptureEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, event: CaptureEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &CaptureEvent) {
        match event {
            CaptureEvent::Availability(check) => match (&check.error, check.available) {
                (Some(error), _) => {
                    log::warn!("Cloudflare bypass service unavailable: {error}");
                }
                (None, false) => {
                    log::debug!("bypass service at {} reported unhealthy", check.service_url);
                }
                (None, true) => {
                    log::debug!("bypass service at {} healthy", check.service_url);
                }
            },
            CaptureEvent::Detection(detection) => match &detection.error {
                Some(error) => {
                    log::error!("Cloudflare detection failed for {}: {error}", detection.url);
                }
                None if detection.detected => {
                    log::info!(
                        "Cloudflare detected for {} ({}), using bypass service",
                        detection.url,
                        detection.indicator.as_deref().unwrap_or("no indicator")
                    );
                }
                None => {
                    log::debug!("no Cloudflare protection detected for {}", detection.url);
                }
            },
            CaptureEvent::Bypass(bypass) => match &bypass.error {
                Some(error) => {
                    log::error!("Cloudflare bypass capture failed for {}: {error}", bypass.url);
                }
                None => {
                    log::info!(
                        "bypass capture for {} completed ({:.2}s)",
                        bypass.url,
                        bypass.latency.as_secs_f64()
                    );
                }
            },
            CaptureEvent::Fallback(fallback) => {
                log::warn!("Bypass failed for {}: {}", fallback.url, fallback.reason);
                log::info!("Falling back to normal capture for {}", fallback.url);
            }
            CaptureEvent::NormalCapture(normal) => {
                log::debug!("normal capture for {}", normal.url);
            }
        }
    }
}

/// Metrics handler that feeds the metrics collector.
#[derive(Clone, Debug)]
pub struct MetricsHandler {
    metrics: MetricsCollector,
}

impl MetricsHandler {
    pub fn new(metrics: MetricsCollector) -> Self {
        Self { metrics }
    }
}

impl EventHandler for MetricsHandler {
    fn handle(&self, event: &CaptureEvent) {
        match event {
            CaptureEvent::Availability(check) => {
                self.metrics.record_availability(check.available);
            }
            CaptureEvent::Detection(detection) => {
                self.metrics
                    .record_detection(detection.detected, detection.error.is_some());
            }
            CaptureEvent::Bypass(bypass) => {
                self.metrics.record_bypass(bypass.success, bypass.latency);
            }
            CaptureEvent::Fallback(_) => self.metrics.record_fallback(),
            CaptureEvent::NormalCapture(_) => self.metrics.record_normal_capture(),
        }
    }
}
