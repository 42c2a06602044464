//! Supervisor state and phase reports
//!
//! The launch phase produces a [`LaunchSummary`]; the teardown phase produces
//! a [`TeardownReport`]. Both are plain data so they can be logged, printed
//! as JSON, or asserted on in tests.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle state of a supervisor
///
/// ```text
/// Idle → Running → Draining → Terminated
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SupervisorState {
    /// Nothing launched yet
    Idle,
    /// Every descriptor has been attempted
    Running,
    /// Teardown in progress
    Draining,
    /// Teardown finished; registry empty, all sinks closed
    Terminated,
}

impl SupervisorState {
    /// Whether teardown has started or finished
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, SupervisorState::Draining | SupervisorState::Terminated)
    }
}

/// A successfully launched process
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LaunchedProcess {
    /// Project display name
    pub project: String,
    /// Process ID of the tracked handle
    pub pid: u32,
    /// Process group identifier
    pub pgid: u32,
    /// Directory the process was started in
    pub working_dir: PathBuf,
    /// Literal argument vector issued
    pub command: Vec<String>,
    /// Port associated with the project, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Captured stdout file
    pub stdout_log: PathBuf,
    /// Captured stderr file
    pub stderr_log: PathBuf,
    /// Launch time in RFC3339 format
    pub started_at: String,
}

/// A descriptor that could not be launched
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LaunchFailureInfo {
    /// Project display name
    pub project: String,
    /// Underlying cause
    pub reason: String,
}

/// Result of the launch phase
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSummary {
    /// Number of descriptors attempted
    pub attempted: usize,
    /// Processes now tracked by the registry, in launch order
    pub launched: Vec<LaunchedProcess>,
    /// Descriptors that failed, in launch order
    pub failures: Vec<LaunchFailureInfo>,
}

/// How a tracked process ended during teardown
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TerminationOutcome {
    /// The handle had already exited before teardown reached it
    AlreadyExited,
    /// Exited within the grace period after the graceful signal
    Graceful,
    /// Exited after the forceful group kill
    Killed,
    /// Could not be confirmed dead
    Unconfirmed,
}

/// Per-record teardown result
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordReport {
    /// Project display name
    pub project: String,
    /// Process ID of the tracked handle
    pub pid: u32,
    /// Termination result
    pub outcome: TerminationOutcome,
    /// Whether both log sinks were released
    pub sinks_closed: bool,
    /// Recovered errors encountered for this record
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Result of sweeping one port for orphaned listeners
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum SweepOutcome {
    /// Nothing was listening on the port
    NoListener,
    /// Listeners were found and killed
    Killed {
        /// PIDs that were sent a forceful kill
        pids: Vec<u32>,
    },
    /// No port discovery mechanism was available
    Unavailable,
}

/// Sweep result for one record's port
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PortSweep {
    /// Project display name
    pub project: String,
    /// Port that was swept
    pub port: u16,
    /// What the sweep found
    pub outcome: SweepOutcome,
}

/// Result of a teardown pass
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TeardownReport {
    /// Per-record results, newest record first
    pub records: Vec<RecordReport>,
    /// Orphan sweep results, in the same order as `records`
    pub sweeps: Vec<PortSweep>,
    /// Recovered errors not tied to a single record
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl TeardownReport {
    /// True when the pass had nothing to do
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.sweeps.is_empty() && self.warnings.is_empty()
    }

    /// True when every record released both log sinks
    pub fn all_sinks_closed(&self) -> bool {
        self.records.iter().all(|r| r.sinks_closed)
    }

    /// Total number of warnings, record-level and global
    pub fn warning_count(&self) -> usize {
        self.warnings.len() + self.records.iter().map(|r| r.warnings.len()).sum::<usize>()
    }
}
