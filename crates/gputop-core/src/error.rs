//! Error handling for gputop
//!
//! Provides the shared error type and result alias used by the snapshot model,
//! the cluster source boundary and configuration loading.

/// Result type alias for gputop operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for gputop
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    InvalidConfiguration(String),

    /// Listing nodes or pods from the cluster failed
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Snapshot content is structurally invalid
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration parsing errors
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create an upstream fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create an invalid snapshot error
    pub fn invalid_snapshot(msg: impl Into<String>) -> Self {
        Self::InvalidSnapshot(msg.into())
    }

    /// Only upstream fetches are worth retrying, and only by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Fetch(_))
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::InvalidConfiguration(_) => "configuration",
            Error::Fetch(_) => "fetch",
            Error::InvalidSnapshot(_) => "invalid_snapshot",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::fetch("nodes is forbidden");
        assert!(matches!(err, Error::Fetch(_)));
        assert_eq!(err.to_string(), "Fetch error: nodes is forbidden");
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(Error::config("test").category(), "configuration");
        assert_eq!(Error::fetch("test").category(), "fetch");
        assert_eq!(Error::invalid_snapshot("test").category(), "invalid_snapshot");
    }

    #[test]
    fn test_only_fetch_is_retryable() {
        assert!(Error::fetch("timeout").is_retryable());
        assert!(!Error::config("bad").is_retryable());
        assert!(!Error::invalid_snapshot("empty node name").is_retryable());
    }
}
