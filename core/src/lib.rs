//! Core functionality for the Marshal project
//!
//! This crate contains the process supervisor (launcher, registry,
//! termination engine, orphan sweeper), configuration loading and the
//! platform process primitives used by the `marshal` CLI.

pub mod config;
pub mod error;
pub mod log_sink;
pub mod port;
pub mod process;
pub mod supervisor;
pub mod templates;


// Re-export schema types for convenience
pub use schema::*;

pub use error::{CoreError, Result};
pub use log_sink::LogSink;
pub use port::{ChainedLookup, LookupError, PortOwnerLookup};
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorGuard};

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    ///
    /// `RUST_LOG` takes precedence over `level` when set.
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| crate::CoreError::InitializationError(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
