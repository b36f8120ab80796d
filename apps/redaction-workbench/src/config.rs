//! Workbench configuration
//!
//! Loaded from TOML; every section and field has a default so an empty
//! file is a valid configuration.

use anyhow::Context;
use redaction_core::matches::DEFAULT_THRESHOLD;
use redaction_core::PlanOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkbenchConfig {
    /// Redaction service connection
    #[serde(default)]
    pub service: ServiceConfig,
    /// Review defaults
    #[serde(default)]
    pub review: ReviewConfig,
    /// Job status polling
    #[serde(default)]
    pub polling: PollingConfig,
}

impl WorkbenchConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML is malformed,
    /// or a value is out of range.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(s).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let threshold = self.review.threshold;
        if !(0.0..=100.0).contains(&threshold) {
            anyhow::bail!("review.threshold must be within 0-100, got {}", threshold);
        }
        if self.review.margin < 0.0 || self.review.merge_tolerance < 0.0 {
            anyhow::bail!("review.margin and review.merge_tolerance must not be negative");
        }
        if self.polling.interval_ms == 0 {
            anyhow::bail!("polling.interval_ms must be positive");
        }
        if self.polling.max_failures == 0 {
            anyhow::bail!("polling.max_failures must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the redaction API (default: http://localhost:8080/api)
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in milliseconds (default: 10000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Initial auto-approval threshold in percent (default: 90)
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Quiet period before a threshold edit is applied (default: 300)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Padding around planned rectangles, in points
    #[serde(default)]
    pub margin: f64,
    /// Merge planned rectangles closer than this many points
    #[serde(default)]
    pub merge_tolerance: f64,
    #[serde(default)]
    pub grid_size: Option<f64>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            debounce_ms: default_debounce_ms(),
            margin: 0.0,
            merge_tolerance: 0.0,
            grid_size: None,
        }
    }
}

impl ReviewConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            margin: self.margin,
            merge_tolerance: self.merge_tolerance,
            grid_size: self.grid_size,
        }
    }
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

fn default_debounce_ms() -> u64 {
    300
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between job status requests (default: 1000)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Consecutive status errors before the job is treated as failed
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_failures: default_max_failures(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_max_failures() -> u32 {
    3
}
