//! Error types for the schema repository

use thiserror::Error;

use crate::package::conflict::ConflictReport;

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Schema repository errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema '{location}': {reason}")]
    Load { location: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid bundle {path}: {}", errors.join("; "))]
    InvalidBundle { path: String, errors: Vec<String> },

    #[error("Unsupported bundle format version {found} (supported: {supported})")]
    UnsupportedFormat { found: String, supported: String },

    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Merge(#[from] PackageMergeError),

    #[error(transparent)]
    Remap(#[from] RemapError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Semver error: {0}")]
    Semver(#[from] semver::Error),
}

impl SchemaError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Raised when an `error`-strategy package takes part in a conflict.
///
/// Carries the whole report so every conflict is visible at once.
#[derive(Error, Debug)]
#[error("Package merge aborted: {symbol} is declared by {}", packages.join(", "))]
pub struct PackageMergeError {
    /// The first conflicting symbol that touched an `error` source
    pub symbol: String,
    /// Every package contributing that symbol
    pub packages: Vec<String>,
    /// Full detection result
    pub report: ConflictReport,
}

/// Invalid prefix remap request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemapError {
    #[error("Namespace prefix '{prefix}' does not exist")]
    UnknownPrefix { prefix: String },

    #[error("New prefix for '{prefix}' must not be empty")]
    EmptyPrefix { prefix: String },

    #[error("Prefix '{prefix}' would be used by more than one namespace: {}", uris.join(", "))]
    PrefixConflict { prefix: String, uris: Vec<String> },
}

impl RemapError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownPrefix { .. } => "unknown_prefix",
            Self::EmptyPrefix { .. } => "empty_prefix",
            Self::PrefixConflict { .. } => "prefix_conflict",
        }
    }
}
