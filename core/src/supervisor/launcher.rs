//! Launcher: turns a project descriptor into a tracked process record

use super::adapters::{ManagedProcess, ProcessAdapter};
use super::registry::ProcessRecord;
use crate::log_sink::LogSink;
use crate::templates::{self, LaunchPlan};
use crate::{CoreError, Result};
use chrono::Local;
use schema::{LaunchSettings, ProjectDescriptor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often a running pre-launch step is checked
const STEP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait for a killed pre-launch step to be reaped
const STEP_REAP_WAIT: Duration = Duration::from_secs(2);

/// Cancels an in-progress launch from another thread
///
/// A running pre-launch step is killed and no further project is started.
#[derive(Debug, Clone, Default)]
pub struct LaunchAbort(Arc<AtomicBool>);

impl LaunchAbort {
    /// Ask the launch to stop
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether [`LaunchAbort::abort`] has been called
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Starts projects through a [`ProcessAdapter`]
#[derive(Clone)]
pub struct Launcher {
    adapter: Arc<dyn ProcessAdapter>,
    settings: LaunchSettings,
    abort: LaunchAbort,
}

impl Launcher {
    /// Create a launcher over `adapter`
    pub fn new(adapter: Arc<dyn ProcessAdapter>, settings: LaunchSettings) -> Self {
        Self {
            adapter,
            settings,
            abort: LaunchAbort::default(),
        }
    }

    /// Handle that cancels this launcher's work
    pub fn abort_handle(&self) -> LaunchAbort {
        self.abort.clone()
    }

    /// Launch one project
    ///
    /// Every error is reported as [`CoreError::LaunchFailure`] carrying the
    /// project name. Sinks opened for a failed attempt are closed before
    /// returning.
    pub fn spawn(&self, descriptor: &ProjectDescriptor) -> Result<ProcessRecord> {
        let project = descriptor.display_name();
        let plan = templates::resolve(descriptor)
            .map_err(|e| CoreError::launch_failure(&project, e))?;

        let started_at = Local::now();
        let sink = LogSink::open(&plan.working_dir, &project, started_at)
            .map_err(|e| CoreError::launch_failure(&project, e))?;

        match self.start(&project, &plan, &sink) {
            Ok(process) => {
                info!(
                    "Launched '{}' (pid {}) in {}: {}",
                    project,
                    process.pid(),
                    plan.working_dir.display(),
                    plan.command.join(" ")
                );
                Ok(ProcessRecord::new(
                    project,
                    process,
                    sink,
                    plan.working_dir,
                    plan.command,
                    descriptor.port,
                    started_at,
                ))
            }
            Err(e) => {
                if let Err(close_err) = sink.close() {
                    warn!("Failed to close log sink for '{}': {}", project, close_err);
                }
                Err(CoreError::launch_failure(&project, e))
            }
        }
    }

    fn start(
        &self,
        project: &str,
        plan: &LaunchPlan,
        sink: &LogSink,
    ) -> Result<Box<dyn ManagedProcess>> {
        for step in &plan.prelaunch {
            debug!("Running pre-launch step for '{}': {}", project, step.join(" "));
            self.run_step(step, plan, sink)?;
        }
        if self.abort.is_aborted() {
            return Err(CoreError::ProcessSpawn("launch interrupted".to_string()));
        }
        self.adapter.spawn(&plan.command, &plan.working_dir, sink)
    }

    /// Run one pre-launch step, bounded by the timeout and the abort flag
    fn run_step(&self, step: &[String], plan: &LaunchPlan, sink: &LogSink) -> Result<()> {
        let mut process = self.adapter.spawn_step(step, &plan.working_dir, sink)?;
        let timeout = self.settings.prelaunch_timeout();
        let deadline = Instant::now() + timeout;

        let cause = loop {
            if let Some(exit) = process.try_wait()? {
                if exit.success() {
                    return Ok(());
                }
                return Err(CoreError::ProcessSpawn(format!(
                    "pre-launch step '{}' failed with {}",
                    step.join(" "),
                    exit
                )));
            }
            if self.abort.is_aborted() {
                break "interrupted".to_string();
            }
            let now = Instant::now();
            if now >= deadline {
                break format!("timed out after {:?}", timeout);
            }
            std::thread::sleep(STEP_POLL_INTERVAL.min(deadline - now));
        };

        warn!(
            "Pre-launch step '{}' {}; killing process group {}",
            step.join(" "),
            cause,
            process.pgid()
        );
        if let Err(e) = process.force_stop() {
            warn!("Failed to kill pre-launch step '{}': {}", step.join(" "), e);
        }
        let reap_deadline = Instant::now() + STEP_REAP_WAIT;
        while Instant::now() < reap_deadline {
            match process.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) => std::thread::sleep(STEP_POLL_INTERVAL),
                Err(e) => {
                    warn!("Failed to reap pre-launch step '{}': {}", step.join(" "), e);
                    break;
                }
            }
        }
        Err(CoreError::ProcessSpawn(format!(
            "pre-launch step '{}' {}",
            step.join(" "),
            cause
        )))
    }
}

impl std::fmt::Debug for Launcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Launcher").finish_non_exhaustive()
    }
}
