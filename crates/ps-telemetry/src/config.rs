//! Telemetry configuration.

use serde::Deserialize;
use std::env;

/// Logging configuration. Also the `[telemetry]` section of the node config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Filter directive (trace, debug, info, warn, error, or a full
    /// `EnvFilter` expression).
    pub log_level: String,

    /// Emit one JSON object per line instead of human-readable output.
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// - `PS_LOG_LEVEL` or `RUST_LOG`: log level (default: info)
    /// - `PS_JSON_LOGS`: JSON output (default: false)
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Applies environment overrides on top of `self`.
    pub fn with_env(mut self) -> Self {
        if let Ok(level) = env::var("PS_LOG_LEVEL").or_else(|_| env::var("RUST_LOG")) {
            self.log_level = level;
        }
        if let Ok(json) = env::var("PS_JSON_LOGS") {
            self.json_logs = parse_flag(&json);
        }
        self
    }
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}
