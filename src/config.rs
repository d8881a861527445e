//! Configuration module for probewatch.
//!
//! Loads a JSON configuration file, then applies environment variable
//! overrides.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::probe::{ProbeParameters, DEFAULT_PROBE_TIMEOUT};

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse configuration file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Where history is persisted between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    #[default]
    Json,
    Sqlite,
}

/// Settings that apply to the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// History file path (default: "history.json")
    #[serde(default = "default_history_file")]
    pub history_file: String,
    #[serde(default)]
    pub history_backend: HistoryBackend,
    /// Keep at most this many snapshots per target
    #[serde(default)]
    pub history_retention: Option<usize>,
    /// Bound on every network operation of a probe, in seconds (default: 5.0)
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: f64,
    #[serde(default)]
    pub alert_webhook_url: Option<String>,
    #[serde(default)]
    pub alert_recipients: Vec<String>,
}

fn default_history_file() -> String {
    "history.json".to_string()
}

fn default_probe_timeout() -> f64 {
    5.0
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            history_file: default_history_file(),
            history_backend: HistoryBackend::default(),
            history_retention: None,
            probe_timeout_secs: default_probe_timeout(),
            alert_webhook_url: None,
            alert_recipients: Vec::new(),
        }
    }
}

/// One target of a method group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub target_name: String,
    #[serde(default)]
    pub parameters: ProbeParameters,
}

/// Targets probed with the same method.
///
/// The method stays a string so unknown methods are reported when the batch
/// runs rather than rejecting the whole file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodTests {
    pub method: String,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub tests: Vec<MethodTests>,
}

impl AppConfig {
    /// Load configuration from a JSON file and the environment.
    ///
    /// Environment variables:
    /// - `PROBEWATCH_HISTORY_FILE`: history file path
    /// - `PROBEWATCH_PROBE_TIMEOUT`: probe timeout in seconds
    /// - `PROBEWATCH_ALERT_WEBHOOK`: alert webhook URL
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        let mut cfg = Self::from_json(&data)?;
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(data)?)
    }

    fn apply_env(&mut self) {
        if let Ok(path) = env::var("PROBEWATCH_HISTORY_FILE") {
            self.general.history_file = path;
        }

        if let Ok(timeout_str) = env::var("PROBEWATCH_PROBE_TIMEOUT") {
            if let Ok(timeout) = timeout_str.parse() {
                self.general.probe_timeout_secs = timeout;
            }
        }

        if let Ok(url) = env::var("PROBEWATCH_ALERT_WEBHOOK") {
            self.general.alert_webhook_url = Some(url);
        }
    }

    /// Reject values the probes cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeout = self.general.probe_timeout_secs;
        if !(timeout > 0.0 && Duration::try_from_secs_f64(timeout).is_ok()) {
            return Err(ConfigError::Invalid(format!(
                "probe_timeout_secs must be a positive duration, got {}",
                timeout
            )));
        }

        if self.general.history_retention == Some(0) {
            return Err(ConfigError::Invalid(
                "history_retention must keep at least one snapshot".to_string(),
            ));
        }

        for group in &self.tests {
            for target in &group.targets {
                let params = &target.parameters;
                for (name, value) in [
                    ("latency_threshold", params.latency_threshold),
                    ("bandwidth_threshold", params.bandwidth_threshold),
                ] {
                    if let Some(v) = value {
                        if !(v.is_finite() && v > 0.0) {
                            return Err(ConfigError::Invalid(format!(
                                "{} for {} must be positive, got {}",
                                name, target.target_name, v
                            )));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// The configured timeout, or the default if it is not a valid duration.
    pub fn probe_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.general.probe_timeout_secs).unwrap_or(DEFAULT_PROBE_TIMEOUT)
    }
}
