//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use sigex_lifecycle::{CoordinatorConfig, PollerConfig};
use sigex_session::SessionConfig;

use crate::error::AppResult;

/// Ops HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpsConfig {
    /// Listen address for signals, state export, metrics, and overrides.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Top-level application configuration, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Admission, sizing, and resolver parameters.
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    /// Reconciliation loop parameters.
    #[serde(default)]
    pub poller: PollerConfig,
    /// Session windows and reference timezone.
    #[serde(default)]
    pub sessions: SessionConfig,
    /// Ops HTTP server.
    #[serde(default)]
    pub ops: OpsConfig,
    /// Order store channel capacity.
    #[serde(default = "default_store_capacity")]
    pub store_capacity: usize,
}

fn default_store_capacity() -> usize {
    256
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            poller: PollerConfig::default(),
            sessions: SessionConfig::default(),
            ops: OpsConfig::default(),
            store_capacity: default_store_capacity(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}
