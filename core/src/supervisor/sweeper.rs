//! Orphan sweeper: kills whatever still listens on a project's port
//!
//! Tracked handles only reach the process group they were started in. Build
//! tools that fork a server (Maven, Spring Boot's dev launcher, uvicorn
//! reloaders) can leave a listener behind in another group; the sweeper
//! finds it by port after the tracked handle is gone.

use super::adapters::ProcessAdapter;
use crate::port::{LookupError, PortOwnerLookup};
use schema::SweepOutcome;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one sweep plus the recovered errors it ran into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepResult {
    /// What the sweep found
    pub outcome: SweepOutcome,
    /// Warnings to surface in the teardown report
    pub warnings: Vec<String>,
}

/// Best-effort listener reclamation by port
pub struct OrphanSweeper {
    lookup: Box<dyn PortOwnerLookup>,
    adapter: Arc<dyn ProcessAdapter>,
    own_pid: u32,
}

impl OrphanSweeper {
    /// Sweeper that finds owners with `lookup` and kills them through `adapter`
    pub fn new(lookup: Box<dyn PortOwnerLookup>, adapter: Arc<dyn ProcessAdapter>) -> Self {
        Self {
            lookup,
            adapter,
            own_pid: std::process::id(),
        }
    }

    /// Find and force-kill every process listening on exactly `port`
    ///
    /// Never fails: a missing discovery mechanism or a failed kill becomes a
    /// warning.
    pub fn sweep_port(&self, port: u16) -> SweepResult {
        let mut warnings = Vec::new();

        let owners = match self.lookup.owners(port) {
            Ok(owners) => owners,
            Err(e) => {
                let message = match &e {
                    LookupError::Unavailable(_) => {
                        format!("Cannot sweep port {}: no port discovery mechanism available", port)
                    }
                    LookupError::Failed { .. } => format!("Cannot sweep port {}: {}", port, e),
                };
                warn!("{}", message);
                warnings.push(message);
                return SweepResult {
                    outcome: SweepOutcome::Unavailable,
                    warnings,
                };
            }
        };

        let mut killed = Vec::new();
        for pid in owners {
            if pid == self.own_pid {
                warn!("Port {} is held by the supervisor itself; not killing", port);
                continue;
            }
            match self.adapter.kill_pid(pid) {
                Ok(()) => {
                    info!("Killed orphaned listener {} on port {}", pid, port);
                    killed.push(pid);
                }
                Err(e) => {
                    let message = format!("Failed to kill listener {} on port {}: {}", pid, port, e);
                    warn!("{}", message);
                    warnings.push(message);
                }
            }
        }

        let outcome = if killed.is_empty() {
            SweepOutcome::NoListener
        } else {
            SweepOutcome::Killed { pids: killed }
        };
        SweepResult { outcome, warnings }
    }
}

impl std::fmt::Debug for OrphanSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrphanSweeper")
            .field("lookup", &self.lookup.name())
            .field("own_pid", &self.own_pid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{StaticLookup, UnavailableLookup};
    use crate::supervisor::adapters::MockProcessAdapter;

    #[test]
    fn test_sweep_kills_exact_port_owners() {
        let adapter = MockProcessAdapter::new();
        let lookup = StaticLookup::new()
            .with_owner(8001, [501, 502])
            .with_owner(18001, [900]);
        let sweeper = OrphanSweeper::new(Box::new(lookup), Arc::new(adapter.clone()));

        let result = sweeper.sweep_port(8001);
        assert_eq!(result.outcome, SweepOutcome::Killed { pids: vec![501, 502] });
        assert!(result.warnings.is_empty());
        assert_eq!(adapter.calls().killed, vec![501, 502]);
    }

    #[test]
    fn test_sweep_free_port() {
        let adapter = MockProcessAdapter::new();
        let sweeper = OrphanSweeper::new(Box::new(StaticLookup::new()), Arc::new(adapter.clone()));
        let result = sweeper.sweep_port(8002);
        assert_eq!(result.outcome, SweepOutcome::NoListener);
        assert!(adapter.calls().killed.is_empty());
    }

    #[test]
    fn test_sweep_without_mechanism_warns() {
        let adapter = MockProcessAdapter::new();
        let sweeper = OrphanSweeper::new(Box::new(UnavailableLookup), Arc::new(adapter));
        let result = sweeper.sweep_port(8003);
        assert_eq!(result.outcome, SweepOutcome::Unavailable);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("8003"));
    }

    #[test]
    fn test_sweep_never_kills_self() {
        let adapter = MockProcessAdapter::new();
        let lookup = StaticLookup::new().with_owner(8004, [std::process::id()]);
        let sweeper = OrphanSweeper::new(Box::new(lookup), Arc::new(adapter.clone()));
        let result = sweeper.sweep_port(8004);
        assert_eq!(result.outcome, SweepOutcome::NoListener);
        assert!(adapter.calls().killed.is_empty());
    }
}
