//! Metrics collection utilities.
//!
//! Counts how captures were routed (bypass vs normal path), how often the
//! service was reachable, and keeps a blended bypass latency.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Aggregated routing counters.
#[derive(Debug, Clone)]
pub struct RoutingStats {
    pub started_at: DateTime<Utc>,
    pub availability_checks: u64,
    pub service_unavailable: u64,
    pub detections_protected: u64,
    pub detections_clear: u64,
    pub detection_failures: u64,
    pub bypass_successes: u64,
    pub bypass_failures: u64,
    pub fallbacks: u64,
    pub normal_captures: u64,
    pub average_bypass_latency: Option<Duration>,
}

impl Default for RoutingStats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            availability_checks: 0,
            service_unavailable: 0,
            detections_protected: 0,
            detections_clear: 0,
            detection_failures: 0,
            bypass_successes: 0,
            bypass_failures: 0,
            fallbacks: 0,
            normal_captures: 0,
            average_bypass_latency: None,
        }
    }
}

impl RoutingStats {
    pub fn bypass_attempts(&self) -> u64 {
        self.bypass_successes + self.bypass_failures
    }

    /// Share of bypass attempts that succeeded, `None` before the first one.
    pub fn bypass_success_rate(&self) -> Option<f64> {
        let attempts = self.bypass_attempts();
        (attempts > 0).then(|| self.bypass_successes as f64 / attempts as f64)
    }
}

/// Thread-safe metrics collector used by the middleware.
#[derive(Clone, Debug)]
pub struct MetricsCollector {
    inner: Arc<Mutex<RoutingStats>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RoutingStats::default())),
        }
    }

    pub fn record_availability(&self, available: bool) {
        let mut guard = self.inner.lock().expect("metrics lock poisoned");
        guard.availability_checks += 1;
        if !available {
            guard.service_unavailable += 1;
        }
    }

    pub fn record_detection(&self, detected: bool, failed: bool) {
        let mut guard = self.inner.lock().expect("metrics lock poisoned");
        if failed {
            guard.detection_failures += 1;
        } else if detected {
            guard.detections_protected += 1;
        } else {
            guard.detections_clear += 1;
        }
    }

    pub fn record_bypass(&self, success: bool, latency: Duration) {
        let mut guard = self.inner.lock().expect("metrics lock poisoned");
        if success {
            guard.bypass_successes += 1;
        } else {
            guard.bypass_failures += 1;
        }

        if let Some(avg) = guard.average_bypass_latency {
            let blended = (avg.as_secs_f64() * 0.9) + (latency.as_secs_f64() * 0.1);
            guard.average_bypass_latency = Some(Duration::from_secs_f64(blended));
        } else {
            guard.average_bypass_latency = Some(latency);
        }
    }

    pub fn record_fallback(&self) {
        self.inner.lock().expect("metrics lock poisoned").fallbacks += 1;
    }

    pub fn record_normal_capture(&self) {
        self.inner.lock().expect("metrics lock poisoned").normal_captures += 1;
    }

    pub fn snapshot(&self) -> RoutingStats {
        self.inner.lock().expect("metrics lock poisoned").clone()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_bypass_outcomes() {
        let metrics = MetricsCollector::new();
        metrics.record_bypass(true, Duration::from_secs(4));
        metrics.record_bypass(false, Duration::from_secs(14));
        metrics.record_fallback();

        let stats = metrics.snapshot();
        assert_eq!(stats.bypass_attempts(), 2);
        assert_eq!(stats.bypass_success_rate(), Some(0.5));
        assert_eq!(stats.fallbacks, 1);
        let avg = stats.average_bypass_latency.unwrap();
        assert!(avg > Duration::from_secs(4) && avg < Duration::from_secs(14));
    }

    #[test]
    fn counts_unavailable_probes() {
        let metrics = MetricsCollector::new();
        metrics.record_availability(true);
        metrics.record_availability(false);
        let stats = metrics.snapshot();
        assert_eq!(stats.availability_checks, 2);
        assert_eq!(stats.service_unavailable, 1);
        assert_eq!(stats.bypass_success_rate(), None);
    }
}
