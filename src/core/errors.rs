//! IMR-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, ReaperError>;

/// Top-level error type for the image reaper.
#[derive(Debug, Error)]
pub enum ReaperError {
    #[error("[IMR-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[IMR-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[IMR-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[IMR-2001] cannot connect to runtime daemon at {host}: {details}")]
    Connect { host: String, details: String },

    #[error("[IMR-2101] cannot list {what}: {details}")]
    Enumeration {
        what: &'static str,
        details: String,
    },

    #[error("[IMR-2102] cannot inspect container {container}: {details}")]
    Inspect { container: String, details: String },

    #[error("[IMR-2201] cannot remove image {image}: {details}")]
    Removal { image: String, details: String },

    #[error("[IMR-2901] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[IMR-3001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[IMR-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl ReaperError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "IMR-1001",
            Self::MissingConfig { .. } => "IMR-1002",
            Self::ConfigParse { .. } => "IMR-1003",
            Self::Connect { .. } => "IMR-2001",
            Self::Enumeration { .. } => "IMR-2101",
            Self::Inspect { .. } => "IMR-2102",
            Self::Removal { .. } => "IMR-2201",
            Self::Serialization { .. } => "IMR-2901",
            Self::Io { .. } => "IMR-3001",
            Self::Runtime { .. } => "IMR-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// Enumeration, inspection, and removal failures are all steady-state
    /// conditions the sweep loop recovers from on a later pass. Startup
    /// connection failure and configuration errors are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Enumeration { .. }
                | Self::Inspect { .. }
                | Self::Removal { .. }
                | Self::Io { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for ReaperError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for ReaperError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
