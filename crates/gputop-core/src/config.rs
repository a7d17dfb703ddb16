//! Configuration management for gputop
//!
//! Provides a unified configuration system that supports YAML files and
//! environment variable overrides.

use crate::{ResourceNames, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "GPUTOP_CONFIG";

/// Prefix for environment overrides, e.g. `GPUTOP_OBSERVABILITY__LOG_LEVEL`
pub const ENV_PREFIX: &str = "GPUTOP";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Resource and annotation names
    pub resources: ResourceNames,

    /// Accounting pass options
    pub accounting: AccountingConfig,

    /// Snapshot input
    pub snapshot: SnapshotConfig,

    /// Logging configuration
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest)
    /// 2. Configuration file
    /// 3. Defaults (lowest)
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&Self::default())?);

        if let Ok(config_path) = std::env::var(CONFIG_ENV) {
            builder = builder.add_source(config::File::with_name(&config_path).required(false));
        } else {
            for path in &["./gputop.yaml", "/etc/gputop/config.yaml"] {
                builder = builder.add_source(config::File::with_name(path).required(false));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let parsed: Self = builder.build()?.try_deserialize()?;
        parsed.validate()?;

        Ok(parsed)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::File::from(path));

        let parsed: Self = builder.build()?.try_deserialize()?;
        parsed.validate()?;

        Ok(parsed)
    }

    pub fn validate(&self) -> Result<()> {
        self.resources.validate()?;
        self.accounting.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

/// Options for a single accounting pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountingConfig {
    /// Count succeeded, failed and deleting pods as well
    pub include_completed_pods: bool,

    /// Restrict pods to one namespace
    pub namespace: Option<String>,

    /// Restrict the report to these nodes; empty means all
    pub nodes: Vec<String>,
}

impl AccountingConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref ns) = self.namespace {
            if ns.trim().is_empty() {
                return Err(crate::Error::config("accounting.namespace cannot be blank"));
            }
        }
        if self.nodes.iter().any(|n| n.trim().is_empty()) {
            return Err(crate::Error::config("accounting.nodes cannot contain blank names"));
        }
        Ok(())
    }

    /// Whether a node passes the configured node filter
    pub fn selects_node(&self, name: &str) -> bool {
        self.nodes.is_empty() || self.nodes.iter().any(|n| n == name)
    }
}

/// Where the presentation layer reads snapshots from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Default snapshot file
    pub path: Option<PathBuf>,
}

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,

    /// Log format (json or text)
    pub log_format: String,
}

impl ObservabilityConfig {
    pub fn validate(&self) -> Result<()> {
        match self.log_format.as_str() {
            "text" | "json" => {}
            other => {
                return Err(crate::Error::config(format!(
                    "Unknown log format '{}', expected text or json",
                    other
                )))
            }
        }
        if self.log_level.trim().is_empty() {
            return Err(crate::Error::config("Log level cannot be empty"));
        }
        Ok(())
    }

    pub fn is_json(&self) -> bool {
        self.log_format == "json"
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}
