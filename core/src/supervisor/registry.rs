//! Insertion-ordered record of everything the launcher started

use super::adapters::ManagedProcess;
use crate::log_sink::LogSink;
use chrono::{DateTime, Local};
use schema::LaunchedProcess;
use std::fmt;
use std::path::PathBuf;

/// One successfully launched process
///
/// Owns the process handle and both log sinks until teardown consumes it.
pub struct ProcessRecord {
    /// Project display name
    pub project: String,
    pub(crate) process: Box<dyn ManagedProcess>,
    /// Process group identifier captured at spawn time
    pub pgid: u32,
    pub(crate) sinks: Option<LogSink>,
    /// Directory the process was started in
    pub working_dir: PathBuf,
    /// Literal argument vector issued
    pub command: Vec<String>,
    /// Port used for the orphan sweep
    pub port: Option<u16>,
    /// Launch time
    pub started_at: DateTime<Local>,
    reaped: bool,
}

impl ProcessRecord {
    pub(crate) fn new(
        project: String,
        process: Box<dyn ManagedProcess>,
        sinks: LogSink,
        working_dir: PathBuf,
        command: Vec<String>,
        port: Option<u16>,
        started_at: DateTime<Local>,
    ) -> Self {
        let pgid = process.pgid();
        Self {
            project,
            process,
            pgid,
            sinks: Some(sinks),
            working_dir,
            command,
            port,
            started_at,
            reaped: false,
        }
    }

    /// Process ID of the tracked handle
    pub fn pid(&self) -> u32 {
        self.process.pid()
    }

    /// Whether the handle has been confirmed dead
    pub fn is_reaped(&self) -> bool {
        self.reaped
    }

    pub(crate) fn mark_reaped(&mut self) {
        self.reaped = true;
    }

    /// Whether the log sinks are still open
    pub fn sinks_open(&self) -> bool {
        self.sinks.is_some()
    }

    /// Serializable view of this record
    pub fn to_launched(&self) -> LaunchedProcess {
        let (stdout_log, stderr_log) = match &self.sinks {
            Some(sinks) => (
                sinks.stdout_path().to_path_buf(),
                sinks.stderr_path().to_path_buf(),
            ),
            None => (PathBuf::new(), PathBuf::new()),
        };
        LaunchedProcess {
            project: self.project.clone(),
            pid: self.pid(),
            pgid: self.pgid,
            working_dir: self.working_dir.clone(),
            command: self.command.clone(),
            port: self.port,
            stdout_log,
            stderr_log,
            started_at: self.started_at.to_rfc3339(),
        }
    }
}

impl fmt::Debug for ProcessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRecord")
            .field("project", &self.project)
            .field("pid", &self.pid())
            .field("pgid", &self.pgid)
            .field("port", &self.port)
            .field("command", &self.command)
            .field("reaped", &self.reaped)
            .finish_non_exhaustive()
    }
}

/// Ordered collection of [`ProcessRecord`]s owned by the supervisor
///
/// Append-only while running; emptied exactly once by teardown.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    records: Vec<ProcessRecord>,
}

impl ProcessRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record
    pub fn push(&mut self, record: ProcessRecord) {
        self.records.push(record);
    }

    /// Number of tracked records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in registration order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ProcessRecord> {
        self.records.iter()
    }

    /// Records newest first, the order teardown walks them
    pub fn iter_newest_first_mut(&mut self) -> impl Iterator<Item = &mut ProcessRecord> {
        self.records.iter_mut().rev()
    }

    /// Drop every record
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
