//! Error types for nnfplace
//!
//! This module defines the common error types used throughout the system.

use thiserror::Error;

/// Common result type for nnfplace operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for nnfplace
#[derive(Debug, Error)]
pub enum Error {
    // Placement errors
    #[error("inventory from {source_name} does not contain any storage nodes that can be assigned")]
    NoInventory { source_name: String },

    #[error("incomplete: {0}")]
    Incomplete(String),

    #[error("insufficient resources for '{label}': {reason}")]
    InsufficientResources { label: String, reason: String },

    #[error("{0}")]
    General(String),

    // Collaborator errors
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{failed} of {total} operations failed")]
    SomeOperationFailed { failed: usize, total: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl Error {
    /// Create a general error
    pub fn general(msg: impl Into<String>) -> Self {
        Self::General(msg.into())
    }

    /// Create an incomplete error
    pub fn incomplete(msg: impl Into<String>) -> Self {
        Self::Incomplete(msg.into())
    }

    /// Create an insufficient resources error for an allocation label
    pub fn insufficient(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InsufficientResources {
            label: label.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this error was produced by the allocation engine itself
    /// rather than by one of its collaborators
    #[must_use]
    pub const fn is_placement_failure(&self) -> bool {
        matches!(
            self,
            Self::NoInventory { .. }
                | Self::Incomplete(_)
                | Self::InsufficientResources { .. }
                | Self::General(_)
        )
    }

    /// Stable numeric code, used as the CLI exit status
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::General(_) => 100,
            Self::NotFound(_) => 101,
            Self::Incomplete(_) => 105,
            Self::NoInventory { .. } => 106,
            Self::SomeOperationFailed { .. } => 107,
            Self::InsufficientResources { .. } => 108,
            Self::InvalidArgument(_) | Self::Configuration(_) => 2,
            Self::Io(_) | Self::Serialization(_) | Self::Deserialization(_) => 1,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Self::Deserialization(err.to_string())
        } else {
            Self::Serialization(err.to_string())
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}
