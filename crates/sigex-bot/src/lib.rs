//! Application wiring for the sigex bot.
//!
//! Assembles the order store, coordinator, poller, session monitor, and
//! the ops HTTP server from a TOML configuration file.

pub mod app;
pub mod config;
pub mod error;
pub mod ops;

pub use app::Application;
pub use config::{AppConfig, OpsConfig};
pub use error::{AppError, AppResult};
