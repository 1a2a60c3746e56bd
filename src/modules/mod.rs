//! Cross-cutting services module
//!
//! Observes the middleware's routing decisions through events and turns
//! them into log lines and counters.

pub mod events;
pub mod metrics;

// Re-export commonly used types
pub use events::{
    AvailabilityEvent, BypassEvent, CaptureEvent, DetectionEvent, EventDispatcher, EventHandler,
    FallbackEvent, LoggingHandler, MetricsHandler, NormalCaptureEvent,
};
pub use metrics::{MetricsCollector, RoutingStats};
