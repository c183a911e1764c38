//! CLI error type.

use thiserror::Error;

use pagecurl::logging::LoggingError;
use pagecurl::{ConfigError, PagerError};

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Bad command-line arguments or configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The pager configuration was rejected.
    #[error(transparent)]
    PagerConfig(#[from] ConfigError),

    /// The pager refused an operation.
    #[error("Pager error: {0}")]
    Pager(#[from] PagerError),

    /// Logging could not be set up.
    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    /// The async runtime could not be started.
    #[error("Failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// A scripted session did not go as expected.
    #[error("Simulation failed: {0}")]
    Simulation(String),
}
