//! Session window monitoring.
//!
//! Trading sessions are fixed intervals in a configured reference
//! timezone. Once a session's grace period after close elapses, pending
//! top-tier entries tagged with that session are cancelled, exactly once
//! per window occurrence.

pub mod monitor;
pub mod window;

pub use monitor::SessionMonitor;
pub use window::{OccurrenceKey, SessionConfig, SessionWindow};
