//! Termination engine
//!
//! Drains the registry newest record first. For each record:
//!
//! 1. graceful group stop (SIGTERM / CTRL_BREAK_EVENT)
//! 2. poll for exit for up to `graceSecs`
//! 3. forceful group kill (SIGKILL / `taskkill /T /F`), then poll for up to
//!    `killWaitSecs` so the child is reaped
//! 4. close both log sinks, whatever happened above
//!
//! When the leader has already exited, steps 1–3 are applied to whatever is
//! left in its process group instead.
//!
//! Errors in steps 1–3 are logged as warnings and collected in the report.
//! Once every record is done the orphan sweeper runs for each port, and the
//! registry is cleared.

use super::registry::{ProcessRecord, ProcessRegistry};
use super::sweeper::OrphanSweeper;
use crate::process::ProcessExit;
use schema::{PortSweep, RecordReport, ShutdownSettings, TeardownReport, TerminationOutcome};
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Lower bound on the exit polling cadence
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Graceful-then-forceful teardown of every tracked process
#[derive(Debug)]
pub struct TerminationEngine {
    settings: ShutdownSettings,
    sweeper: OrphanSweeper,
}

impl TerminationEngine {
    /// Engine using `settings` for its bounded waits
    pub fn new(settings: ShutdownSettings, sweeper: OrphanSweeper) -> Self {
        Self { settings, sweeper }
    }

    /// Shutdown timings in use
    pub fn settings(&self) -> &ShutdownSettings {
        &self.settings
    }

    /// Stop, reap and release every record, then sweep ports and clear the
    /// registry
    ///
    /// A second call finds the registry empty and returns an empty report.
    pub fn terminate_all(&self, registry: &mut ProcessRegistry) -> TeardownReport {
        let mut report = TeardownReport::default();
        if registry.is_empty() {
            debug!("Nothing to tear down");
            return report;
        }
        info!("Tearing down {} process(es)", registry.len());

        for record in registry.iter_newest_first_mut() {
            report.records.push(self.terminate_record(record));
        }

        let ports: Vec<(String, u16)> = registry
            .iter()
            .rev()
            .filter_map(|r| r.port.map(|port| (r.project.clone(), port)))
            .collect();
        for (project, port) in ports {
            let result = self.sweeper.sweep_port(port);
            report.warnings.extend(result.warnings);
            report.sweeps.push(PortSweep {
                project,
                port,
                outcome: result.outcome,
            });
        }

        registry.clear();
        info!(
            "Teardown complete: {} record(s), {} warning(s)",
            report.records.len(),
            report.warning_count()
        );
        report
    }

    fn terminate_record(&self, record: &mut ProcessRecord) -> RecordReport {
        let pid = record.pid();
        let mut warnings = Vec::new();

        let stopped = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut local = Vec::new();
            let outcome = self.stop(record, &mut local);
            (outcome, local)
        }));
        let outcome = match stopped {
            Ok((outcome, local)) => {
                warnings.extend(local);
                outcome
            }
            Err(_) => {
                let message = format!("Stopping '{}' (pid {}) panicked", record.project, pid);
                error!("{}", message);
                warnings.push(message);
                TerminationOutcome::Unconfirmed
            }
        };

        let sinks_closed = match record.sinks.take() {
            Some(sinks) => match sinks.close() {
                Ok(()) => true,
                Err(e) => {
                    // The handles are released even when the flush failed
                    let message = format!("Closing logs of '{}': {}", record.project, e);
                    warn!("{}", message);
                    warnings.push(message);
                    true
                }
            },
            None => true,
        };

        RecordReport {
            project: record.project.clone(),
            pid,
            outcome,
            sinks_closed,
            warnings,
        }
    }

    fn stop(&self, record: &mut ProcessRecord, warnings: &mut Vec<String>) -> TerminationOutcome {
        let project = record.project.clone();
        let pid = record.pid();

        match record.process.try_wait() {
            Ok(Some(exit)) => {
                info!("'{}' (pid {}) had already exited with {}", project, pid, exit);
                record.mark_reaped();
                self.stop_leftover_group(record, warnings);
                return TerminationOutcome::AlreadyExited;
            }
            Ok(None) => {}
            Err(e) => note(warnings, format!("Checking '{}' (pid {}): {}", project, pid, e)),
        }

        debug!("Stopping '{}' (process group {})", project, record.pgid);
        if let Err(e) = record.process.graceful_stop() {
            note(warnings, format!("Graceful stop of '{}' failed: {}", project, e));
        }
        if let Some(exit) = self.wait_for_exit(record, self.settings.grace(), warnings) {
            info!("'{}' (pid {}) exited gracefully with {}", project, pid, exit);
            record.mark_reaped();
            return TerminationOutcome::Graceful;
        }

        warn!(
            "'{}' (pid {}) did not exit within {:?}, killing process group {}",
            project,
            pid,
            self.settings.grace(),
            record.pgid
        );
        if let Err(e) = record.process.force_stop() {
            note(warnings, format!("Forceful stop of '{}' failed: {}", project, e));
        }
        if let Some(exit) = self.wait_for_exit(record, self.settings.kill_wait(), warnings) {
            info!("'{}' (pid {}) killed ({})", project, pid, exit);
            record.mark_reaped();
            return TerminationOutcome::Killed;
        }

        note(
            warnings,
            format!("'{}' (pid {}) could not be confirmed dead", project, pid),
        );
        TerminationOutcome::Unconfirmed
    }

    /// Stop members left in the group of a leader that already exited
    ///
    /// Background children of a launcher script stay in the leader's group.
    /// They get the same graceful-then-forceful treatment; the group id
    /// cannot be handed out again while any of them is alive.
    fn stop_leftover_group(&self, record: &mut ProcessRecord, warnings: &mut Vec<String>) {
        let project = record.project.clone();
        if !self.group_alive(record, warnings) {
            debug!("Process group {} of '{}' is empty", record.pgid, project);
            return;
        }

        info!("Stopping what is left of process group {} ('{}')", record.pgid, project);
        if let Err(e) = record.process.graceful_stop() {
            note(warnings, format!("Graceful stop of '{}' group failed: {}", project, e));
        }
        if self.wait_for_empty_group(record, self.settings.grace(), warnings) {
            return;
        }

        warn!(
            "Process group {} of '{}' outlived {:?}, killing it",
            record.pgid,
            project,
            self.settings.grace()
        );
        if let Err(e) = record.process.force_stop() {
            note(warnings, format!("Forceful stop of '{}' group failed: {}", project, e));
        }
        // Killed members may linger as zombies until their new parent reaps them
        if !self.wait_for_empty_group(record, self.settings.kill_wait(), warnings) {
            debug!("Process group {} of '{}' not yet empty after SIGKILL", record.pgid, project);
        }
    }

    fn group_alive(&self, record: &ProcessRecord, warnings: &mut Vec<String>) -> bool {
        match record.process.group_alive() {
            Ok(alive) => alive,
            Err(e) => {
                note(warnings, format!("Checking group of '{}': {}", record.project, e));
                false
            }
        }
    }

    /// Poll until the group has no members or `bound` elapses
    fn wait_for_empty_group(
        &self,
        record: &ProcessRecord,
        bound: Duration,
        warnings: &mut Vec<String>,
    ) -> bool {
        let interval = self.settings.poll_interval().max(MIN_POLL_INTERVAL);
        let deadline = Instant::now() + bound;
        loop {
            if !self.group_alive(record, warnings) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(interval.min(deadline - now));
        }
    }

    /// Poll `try_wait` until the process exits or `bound` elapses
    fn wait_for_exit(
        &self,
        record: &mut ProcessRecord,
        bound: Duration,
        warnings: &mut Vec<String>,
    ) -> Option<ProcessExit> {
        let interval = self.settings.poll_interval().max(MIN_POLL_INTERVAL);
        let deadline = Instant::now() + bound;
        loop {
            match record.process.try_wait() {
                Ok(Some(exit)) => return Some(exit),
                Ok(None) => {}
                Err(e) => {
                    note(warnings, format!("Waiting for '{}': {}", record.project, e));
                    return None;
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            std::thread::sleep(interval.min(deadline - now));
        }
    }
}

fn note(warnings: &mut Vec<String>, message: String) {
    warn!("{}", message);
    warnings.push(message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_sink::LogSink;
    use crate::port::{StaticLookup, UnavailableLookup};
    use crate::supervisor::adapters::{MockInstruction, MockProcessAdapter, ProcessAdapter};
    use chrono::Local;
    use schema::SweepOutcome;
    use std::path::Path;
    use std::sync::Arc;

    fn fast_settings() -> ShutdownSettings {
        ShutdownSettings {
            grace_secs: 0,
            kill_wait_secs: 0,
            poll_interval_ms: 1,
        }
    }

    fn engine(adapter: &MockProcessAdapter, lookup: StaticLookup) -> TerminationEngine {
        let sweeper = OrphanSweeper::new(Box::new(lookup), Arc::new(adapter.clone()));
        TerminationEngine::new(fast_settings(), sweeper)
    }

    fn track(
        registry: &mut ProcessRegistry,
        adapter: &MockProcessAdapter,
        dir: &Path,
        name: &str,
        port: Option<u16>,
        instruction: MockInstruction,
    ) {
        adapter.add_instruction(instruction);
        let sink = LogSink::open(dir, name, Local::now()).unwrap();
        let argv = vec![name.to_string()];
        let process = adapter.spawn(&argv, dir, &sink).unwrap();
        registry.push(ProcessRecord::new(
            name.to_string(),
            process,
            sink,
            dir.to_path_buf(),
            argv,
            port,
            Local::now(),
        ));
    }

    #[test]
    fn test_newest_first_with_outcomes() {
        let tmp = tempfile::tempdir().unwrap();
        let adapter = MockProcessAdapter::new();
        let mut registry = ProcessRegistry::new();
        track(&mut registry, &adapter, tmp.path(), "a", None, MockInstruction::default());
        track(&mut registry, &adapter, tmp.path(), "b", None, MockInstruction::exited());
        track(&mut registry, &adapter, tmp.path(), "c", None, MockInstruction::ignores_graceful());

        let report = engine(&adapter, StaticLookup::new()).terminate_all(&mut registry);

        let order: Vec<_> = report.records.iter().map(|r| r.project.as_str()).collect();
        assert_eq!(order, vec!["c", "b", "a"]);
        let outcomes: Vec<_> = report.records.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                TerminationOutcome::Killed,
                TerminationOutcome::AlreadyExited,
                TerminationOutcome::Graceful
            ]
        );
        assert!(report.all_sinks_closed());
        assert!(registry.is_empty());

        // The exited handle's group is empty, so it is never signalled
        let calls = adapter.calls();
        assert_eq!(calls.graceful.len(), 2);
        assert_eq!(calls.forced.len(), 1);
    }

    #[test]
    fn test_exited_leader_group_is_still_stopped() {
        let tmp = tempfile::tempdir().unwrap();
        let adapter = MockProcessAdapter::new();
        let mut registry = ProcessRegistry::new();
        track(
            &mut registry,
            &adapter,
            tmp.path(),
            "launcher",
            None,
            MockInstruction::exited_leaving_group(),
        );
        let pid = registry.iter().next().unwrap().pid();

        let report = engine(&adapter, StaticLookup::new()).terminate_all(&mut registry);

        assert_eq!(report.records[0].outcome, TerminationOutcome::AlreadyExited);
        assert!(report.records[0].warnings.is_empty());
        assert!(report.all_sinks_closed());
        let calls = adapter.calls();
        assert_eq!(calls.graceful, vec![pid]);
        assert_eq!(calls.forced, vec![pid]);
    }

    #[test]
    fn test_signal_errors_still_close_sinks() {
        let tmp = tempfile::tempdir().unwrap();
        let adapter = MockProcessAdapter::new();
        let mut registry = ProcessRegistry::new();
        track(&mut registry, &adapter, tmp.path(), "stuck", None, MockInstruction::unsignalable());
        track(&mut registry, &adapter, tmp.path(), "fine", None, MockInstruction::default());

        let report = engine(&adapter, StaticLookup::new()).terminate_all(&mut registry);

        assert_eq!(report.records.len(), 2);
        let stuck = &report.records[1];
        assert_eq!(stuck.project, "stuck");
        assert_eq!(stuck.outcome, TerminationOutcome::Unconfirmed);
        assert!(stuck.sinks_closed);
        assert_eq!(stuck.warnings.len(), 3);
        assert_eq!(report.records[0].outcome, TerminationOutcome::Graceful);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_panicking_stop_does_not_abort_teardown() {
        let tmp = tempfile::tempdir().unwrap();
        let adapter = MockProcessAdapter::new();
        let mut registry = ProcessRegistry::new();
        track(&mut registry, &adapter, tmp.path(), "ok", None, MockInstruction::default());
        let panicky = MockInstruction {
            panic_on_graceful: true,
            ..MockInstruction::default()
        };
        track(&mut registry, &adapter, tmp.path(), "panics", None, panicky);

        let report = engine(&adapter, StaticLookup::new()).terminate_all(&mut registry);

        assert_eq!(report.records[0].outcome, TerminationOutcome::Unconfirmed);
        assert!(report.records[0].warnings[0].contains("panicked"));
        assert_eq!(report.records[1].outcome, TerminationOutcome::Graceful);
        assert!(report.all_sinks_closed());
    }

    #[test]
    fn test_sweeps_ports_after_all_records() {
        let tmp = tempfile::tempdir().unwrap();
        let adapter = MockProcessAdapter::new();
        let mut registry = ProcessRegistry::new();
        track(&mut registry, &adapter, tmp.path(), "api", Some(8001), MockInstruction::default());
        track(&mut registry, &adapter, tmp.path(), "cli", None, MockInstruction::default());
        track(&mut registry, &adapter, tmp.path(), "web", Some(8002), MockInstruction::default());

        let lookup = StaticLookup::new().with_owner(8001, [777]);
        let report = engine(&adapter, lookup).terminate_all(&mut registry);

        assert_eq!(report.sweeps.len(), 2);
        assert_eq!(report.sweeps[0].port, 8002);
        assert_eq!(report.sweeps[0].outcome, SweepOutcome::NoListener);
        assert_eq!(report.sweeps[1].project, "api");
        assert_eq!(report.sweeps[1].outcome, SweepOutcome::Killed { pids: vec![777] });
        assert_eq!(adapter.calls().killed, vec![777]);
    }

    #[test]
    fn test_unavailable_discovery_is_a_warning() {
        let tmp = tempfile::tempdir().unwrap();
        let adapter = MockProcessAdapter::new();
        let mut registry = ProcessRegistry::new();
        track(&mut registry, &adapter, tmp.path(), "api", Some(8001), MockInstruction::default());

        let sweeper = OrphanSweeper::new(Box::new(UnavailableLookup), Arc::new(adapter.clone()));
        let report = TerminationEngine::new(fast_settings(), sweeper).terminate_all(&mut registry);

        assert_eq!(report.sweeps[0].outcome, SweepOutcome::Unavailable);
        assert_eq!(report.warnings.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_second_pass_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let adapter = MockProcessAdapter::new();
        let mut registry = ProcessRegistry::new();
        track(&mut registry, &adapter, tmp.path(), "api", Some(8001), MockInstruction::default());
        let engine = engine(&adapter, StaticLookup::new());

        assert!(!engine.terminate_all(&mut registry).is_empty());
        let before = adapter.calls();
        assert!(engine.terminate_all(&mut registry).is_empty());
        assert_eq!(adapter.calls(), before);
    }
}
