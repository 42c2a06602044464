//! Process supervisor implementation
//!
//! This module launches a fleet of projects, keeps them in an ordered
//! registry and tears all of them down exactly once, whichever way the
//! supervisor exits.
//!
//! ## Architecture
//!
//! A single control thread drives the supervisor through its states:
//!
//! ```text
//! Idle → Running → Draining → Terminated
//! ```
//!
//! ## Components
//!
//! - [`Launcher`]: resolves templates, opens log sinks, starts processes
//! - [`ProcessRegistry`]: insertion-ordered [`ProcessRecord`]s
//! - [`TerminationEngine`]: graceful-then-forceful group teardown
//! - [`OrphanSweeper`]: kills leftover listeners by port
//! - [`ProcessAdapter`]: trait for abstracting process management
//! - [`SupervisorGuard`]: runs teardown on drop, including unwinding

use crate::port::{ChainedLookup, PortOwnerLookup};
use schema::{
    LaunchFailureInfo, LaunchSettings, LaunchSummary, ProjectDescriptor, ShutdownSettings,
    SupervisorState, TeardownReport,
};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod adapters;
pub mod launcher;
pub mod registry;
pub mod sweeper;
pub mod termination;


pub use adapters::*;
pub use launcher::*;
pub use registry::*;
pub use sweeper::*;
pub use termination::*;

/// Configuration for building a supervisor
pub struct SupervisorConfig {
    /// Bounds for pre-launch steps
    pub launch: LaunchSettings,
    /// Bounds for the teardown sequence
    pub settings: ShutdownSettings,
    /// Process adapter for spawning and managing processes
    pub process_adapter: Arc<dyn ProcessAdapter>,
    /// Discovery backend for the orphan sweep
    pub port_lookup: Box<dyn PortOwnerLookup>,
}

impl SupervisorConfig {
    /// Real processes and the platform's default port discovery chain
    pub fn native(launch: LaunchSettings, settings: ShutdownSettings) -> Self {
        Self {
            launch,
            settings,
            process_adapter: Arc::new(NativeProcessAdapter::new()),
            port_lookup: Box::new(ChainedLookup::platform_default()),
        }
    }
}

/// Launch-and-reap supervisor owning the registry
#[derive(Debug)]
pub struct Supervisor {
    state: SupervisorState,
    registry: ProcessRegistry,
    launcher: Launcher,
    engine: TerminationEngine,
}

impl Supervisor {
    /// Build an idle supervisor
    pub fn new(config: SupervisorConfig) -> Self {
        let SupervisorConfig {
            launch,
            settings,
            process_adapter,
            port_lookup,
        } = config;

        let sweeper = OrphanSweeper::new(port_lookup, Arc::clone(&process_adapter));
        Self {
            state: SupervisorState::Idle,
            registry: ProcessRegistry::new(),
            launcher: Launcher::new(process_adapter, launch),
            engine: TerminationEngine::new(settings, sweeper),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Tracked records
    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Handle that interrupts [`Supervisor::launch_all`] from another thread
    pub fn abort_handle(&self) -> LaunchAbort {
        self.launcher.abort_handle()
    }

    /// Launch every project in order, moving Idle → Running
    ///
    /// Failures are logged and collected; they never stop the remaining
    /// launches. An abort does: projects not yet attempted are skipped.
    /// Calling this outside `Idle` launches nothing.
    pub fn launch_all(&mut self, projects: &[ProjectDescriptor]) -> LaunchSummary {
        let mut summary = LaunchSummary::default();
        if self.state != SupervisorState::Idle {
            warn!("Ignoring launch request in state {:?}", self.state);
            return summary;
        }

        info!("Launching {} project(s)", projects.len());
        let abort = self.launcher.abort_handle();
        for descriptor in projects {
            if abort.is_aborted() {
                warn!(
                    "Launch interrupted; skipping {} project(s)",
                    projects.len() - summary.attempted
                );
                break;
            }
            summary.attempted += 1;
            match self.launcher.spawn(descriptor) {
                Ok(record) => {
                    summary.launched.push(record.to_launched());
                    self.registry.push(record);
                }
                Err(e) => {
                    error!("{}", e);
                    let (project, reason) = match e {
                        crate::CoreError::LaunchFailure { project, reason } => (project, reason),
                        other => (descriptor.display_name(), other.to_string()),
                    };
                    summary.failures.push(LaunchFailureInfo { project, reason });
                }
            }
        }

        self.state = SupervisorState::Running;
        info!(
            "{} of {} project(s) running",
            summary.launched.len(),
            summary.attempted
        );
        summary
    }

    /// Tear everything down, moving to Draining and then Terminated
    ///
    /// Runs the termination engine at most once; later calls return an
    /// empty report.
    pub fn teardown(&mut self) -> TeardownReport {
        match self.state {
            SupervisorState::Draining | SupervisorState::Terminated => {
                debug!("Teardown already ran");
                TeardownReport::default()
            }
            SupervisorState::Idle | SupervisorState::Running => {
                self.state = SupervisorState::Draining;
                let report = self.engine.terminate_all(&mut self.registry);
                self.state = SupervisorState::Terminated;
                report
            }
        }
    }

    /// Wrap in a guard that tears down on drop
    pub fn guard(self) -> SupervisorGuard {
        SupervisorGuard { supervisor: self }
    }
}

/// Scoped teardown: dropping the guard drains the supervisor
///
/// Covers normal returns, early `?` returns and panics alike. Call
/// [`SupervisorGuard::finish`] to get the report of the final teardown.
#[derive(Debug)]
pub struct SupervisorGuard {
    supervisor: Supervisor,
}

impl SupervisorGuard {
    /// Run teardown now and return its report
    pub fn finish(mut self) -> TeardownReport {
        self.supervisor.teardown()
    }
}

impl Deref for SupervisorGuard {
    type Target = Supervisor;

    fn deref(&self) -> &Supervisor {
        &self.supervisor
    }
}

impl DerefMut for SupervisorGuard {
    fn deref_mut(&mut self) -> &mut Supervisor {
        &mut self.supervisor
    }
}

impl Drop for SupervisorGuard {
    fn drop(&mut self) {
        if self.supervisor.state == SupervisorState::Terminated {
            return;
        }
        if std::thread::panicking() {
            warn!("Supervisor unwinding; tearing down launched processes");
        }
        let report = self.supervisor.teardown();
        if report.warning_count() > 0 {
            warn!("Teardown finished with {} warning(s)", report.warning_count());
        }
    }
}
