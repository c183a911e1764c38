//! Pager error types.

use std::path::PathBuf;

use thiserror::Error;

/// Invalid or unreadable pager configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A setting is out of its accepted range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Setting name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// An INI value could not be parsed.
    #[error("invalid value for [pager] {key}: {value:?} ({reason})")]
    InvalidValue {
        /// INI key.
        key: &'static str,
        /// Raw value.
        value: String,
        /// Parse failure.
        reason: String,
    },

    /// The INI file could not be read or parsed.
    #[error("failed to load config from {path}: {message}")]
    Load {
        /// File path.
        path: PathBuf,
        /// Loader message.
        message: String,
    },
}

/// Errors from constructing or driving a pager.
#[derive(Debug, Error)]
pub enum PagerError {
    /// The operation needs a refresh token and none has been set.
    #[error("pager not initialized")]
    NotInitialized,

    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
