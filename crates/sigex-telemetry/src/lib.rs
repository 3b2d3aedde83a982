//! Prometheus metrics and structured logging for sigex.
//!
//! - Counters and gauges for signal admission, lifecycle transitions,
//!   staleness and session cancellations, and exchange failures
//! - Structured JSON logging with tracing
//! - Text exposition for the ops server's metrics endpoint

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::{render_metrics, Metrics};
