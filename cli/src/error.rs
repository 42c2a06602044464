//! CLI error types

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Signal handling error: {0}")]
    SignalSetup(String),

    #[error("No project could be launched")]
    NothingLaunched,

    #[error("Core error: {0}")]
    Core(#[from] marshal_core::CoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Launch task failed: {0}")]
    LaunchTask(String),
}

impl CliError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CliError::InvalidArgument(_) => "CLI002",
            CliError::ConfigError(_) => "CLI003",
            CliError::SignalSetup(_) => "CLI004",
            CliError::NothingLaunched => "CLI005",
            CliError::Core(_) => "CLI006",
            CliError::Json(_) => "CLI007",
            CliError::IoError(_) => "CLI008",
            CliError::LaunchTask(_) => "CLI009",
        }
    }
}

/// CLI-specific result type
pub type Result<T> = std::result::Result<T, CliError>;
