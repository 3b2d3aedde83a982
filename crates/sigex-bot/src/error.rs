//! Application-level error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] sigex_telemetry::TelemetryError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] sigex_lifecycle::LifecycleError),
}

pub type AppResult<T> = Result<T, AppError>;
