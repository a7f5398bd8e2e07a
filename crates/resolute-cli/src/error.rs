//! CLI error types

use resolute::{AuthError, ConfigError, ResoluteError};
use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// CLI error
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid CLI configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Environment or config file could not be resolved
    #[error(transparent)]
    Environment(#[from] ConfigError),

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// Login did not succeed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// None of the probed candidates resolved
    #[error("No candidate resolved: {message}")]
    NotResolved {
        /// Error message
        message: String,
    },

    /// Command needs a cargo feature this build lacks
    #[error("'{command}' requires the '{feature}' feature")]
    FeatureDisabled {
        /// Command name
        command: String,
        /// Missing feature
        feature: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Library error
    #[error("Resolute error: {0}")]
    Resolute(#[from] ResoluteError),
}

impl CliError {
    /// Create a config error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a not-resolved error
    #[must_use]
    pub fn not_resolved(message: impl Into<String>) -> Self {
        Self::NotResolved {
            message: message.into(),
        }
    }

    /// Create a feature-disabled error
    #[must_use]
    pub fn feature_disabled(command: impl Into<String>, feature: impl Into<String>) -> Self {
        Self::FeatureDisabled {
            command: command.into(),
            feature: feature.into(),
        }
    }

    /// Whether the command could not run rather than failed
    #[must_use]
    pub const fn is_skip(&self) -> bool {
        match self {
            Self::Environment(e) => e.is_skip(),
            _ => false,
        }
    }
}
