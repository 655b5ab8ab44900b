use std::time::Duration;

use cellsync_common::Extent;
use cellsync_io::PowerShellConfig;
use serde::Deserialize;

use crate::error::SyncError;
use crate::retry::{AvailabilityWait, RetryPolicy};

pub const ENV_MAX_ATTEMPTS: &str = "CELLSYNC_MAX_ATTEMPTS";
pub const ENV_BACKOFF_BASE_MS: &str = "CELLSYNC_BACKOFF_BASE_MS";
pub const ENV_SERIALIZE_PER_PATH: &str = "CELLSYNC_SERIALIZE_PER_PATH";

/// Engine settings. Every field has a default, so a partial JSON document
/// (or none at all) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub availability_polls: u32,
    pub availability_poll_interval_ms: u64,
    pub availability_settle_ms: u64,
    /// Full-mode clears cover at least this many rows and columns.
    pub full_clear_min_rows: u32,
    pub full_clear_min_cols: u32,
    /// Serialise requests for the same document through this engine.
    pub serialize_per_path: bool,
    pub backup_dir_prefix: String,
    pub powershell: PowerShellConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1000,
            availability_polls: 3,
            availability_poll_interval_ms: 500,
            availability_settle_ms: 1000,
            full_clear_min_rows: 100,
            full_clear_min_cols: 20,
            serialize_per_path: true,
            backup_dir_prefix: "log_".to_string(),
            powershell: PowerShellConfig::default(),
        }
    }
}

impl EngineConfig {
    /// No waiting anywhere; for tests and batch tools that fail fast.
    pub fn immediate() -> Self {
        Self {
            backoff_base_ms: 0,
            availability_poll_interval_ms: 0,
            availability_settle_ms: 0,
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, SyncError> {
        serde_json::from_str(json).map_err(|e| SyncError::invalid(format!("config: {e}")))
    }

    /// Apply `CELLSYNC_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self, SyncError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    pub fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SyncError> {
        if let Some(v) = lookup(ENV_MAX_ATTEMPTS) {
            self.max_attempts = parse_env(ENV_MAX_ATTEMPTS, &v)?;
        }
        if let Some(v) = lookup(ENV_BACKOFF_BASE_MS) {
            self.backoff_base_ms = parse_env(ENV_BACKOFF_BASE_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_SERIALIZE_PER_PATH) {
            self.serialize_per_path = match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(SyncError::invalid(format!(
                        "{ENV_SERIALIZE_PER_PATH}: expected a boolean, got '{v}'"
                    )));
                }
            };
        }
        Ok(self)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.backoff_base_ms))
    }

    pub fn availability(&self) -> AvailabilityWait {
        AvailabilityWait {
            polls: self.availability_polls,
            interval: Duration::from_millis(self.availability_poll_interval_ms),
            settle: Duration::from_millis(self.availability_settle_ms),
        }
    }

    pub fn clear_floor(&self) -> Extent {
        Extent::new(self.full_clear_min_rows, self.full_clear_min_cols)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SyncError> {
    value
        .trim()
        .parse()
        .map_err(|_| SyncError::invalid(format!("{key}: cannot parse '{value}'")))
}
