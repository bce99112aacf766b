//! Error types for configuration loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating a configuration layer.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config document is not valid JSON for the configuration surface.
    #[error("invalid config in {origin}: {source}")]
    Parse {
        /// File path or `"inline"`.
        origin: String,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A numeric value is outside its accepted range.
    #[error("invalid config value for `{field}`: {value}. Expected range: {expected}")]
    OutOfRange {
        /// Configuration key (JSON name).
        field: &'static str,
        /// Rejected value.
        value: u64,
        /// Human-readable accepted range.
        expected: &'static str,
    },
}

impl ConfigError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a parse error.
    pub fn parse(origin: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Parse {
            origin: origin.into(),
            source,
        }
    }
}
