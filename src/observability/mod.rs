//! Observability subsystem
//!
//! - Structured logging (JSON lines on stderr)
//! - Monotonic counters
//! - Begin/complete scopes around long operations
//!
//! Observability is read-only: nothing here changes what a scan or write
//! produces.
//!
//! # Usage
//!
//! ```ignore
//! use chronoscan::observability::{log_event_with_fields, Event, MetricsRegistry};
//!
//! log_event_with_fields(Event::MergePlanBuilt, &[("tasks", "12")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_pages_loaded();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::ObservationScope;

/// Log an event at its own severity
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
