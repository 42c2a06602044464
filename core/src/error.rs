//! Core error types and utilities

use thiserror::Error;

/// Core-specific error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("Failed to launch '{project}': {reason}")]
    LaunchFailure { project: String, reason: String },

    #[error("Process spawn error: {0}")]
    ProcessSpawn(String),

    #[error("Signal delivery error: {0}")]
    ProcessSignal(String),

    #[error("Process wait error: {0}")]
    ProcessWait(String),

    #[error("Unsupported process kind: {0}")]
    UnsupportedKind(String),

    #[error("Port discovery unavailable: {0}")]
    DiscoveryUnavailable(String),

    #[error("Resource release error: {0}")]
    ResourceRelease(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

}

impl CoreError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::ConfigurationError(_) => "CORE001",
            CoreError::ValidationError(_) => "CORE002",
            CoreError::InitializationError(_) => "CORE003",
            CoreError::LaunchFailure { .. } => "CORE010",
            CoreError::ProcessSpawn(_) => "CORE011",
            CoreError::ProcessSignal(_) => "CORE012",
            CoreError::ProcessWait(_) => "CORE013",
            CoreError::UnsupportedKind(_) => "CORE014",
            CoreError::DiscoveryUnavailable(_) => "CORE020",
            CoreError::ResourceRelease(_) => "CORE021",
            CoreError::IoError(_) => "CORE005",
        }
    }

    /// Wrap an error as a launch failure for `project`
    pub fn launch_failure(project: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        CoreError::LaunchFailure {
            project: project.into(),
            reason: cause.to_string(),
        }
    }
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, CoreError>;
