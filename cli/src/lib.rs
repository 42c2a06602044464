//! Marshal CLI library
//!
//! Everything the `marshal` binary does lives here so it can be tested
//! without a terminal: configuration resolution, launch/teardown rendering,
//! the operator wait and the standalone port sweep.

#![allow(unused_crate_dependencies)]

pub mod error;
pub mod operator;

pub use error::{CliError, Result};

use marshal_core::config;
use marshal_core::port::ChainedLookup;
use marshal_core::supervisor::{NativeProcessAdapter, OrphanSweeper};
use marshal_core::templates;
use marshal_core::{Supervisor, SupervisorConfig};
use schema::{
    LaunchConfig, LaunchSummary, PortSweep, SweepOutcome, TeardownReport, TerminationOutcome,
};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Config file picked up from the root directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "marshal.toml";

/// Per-project info file printed after launch, relative to its working dir
pub const INFO_FILE: &str = "docs/general_info.txt";

/// Options for `marshal run`
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Explicit config file
    pub config: Option<PathBuf>,
    /// Directory holding the projects; defaults to the current directory
    pub root: Option<PathBuf>,
    /// Override for `shutdown.graceSecs`
    pub grace_secs: Option<u64>,
    /// Print reports as JSON instead of text
    pub json: bool,
}

/// Work out which projects to run
///
/// Order of precedence: `config`, then `<root>/marshal.toml`, then the
/// built-in provider list rooted at `root`.
pub fn resolve_config(
    config_path: Option<&Path>,
    root: Option<&Path>,
    grace_secs: Option<u64>,
) -> Result<LaunchConfig> {
    let root = match root {
        Some(root) => root.to_path_buf(),
        None => std::env::current_dir()?,
    };

    let mut cfg = match config_path {
        Some(path) => config::load_config_from_toml_path(path)?,
        None => {
            let implicit = root.join(DEFAULT_CONFIG_FILE);
            if implicit.is_file() {
                info!("Using {}", implicit.display());
                config::load_config_from_toml_path(&implicit)?
            } else {
                debug!("No {} in {}; using built-in projects", DEFAULT_CONFIG_FILE, root.display());
                config::default_config(&root)
            }
        }
    };

    if let Some(grace) = grace_secs {
        if grace == 0 {
            return Err(CliError::InvalidArgument(
                "--grace-secs must be greater than 0".to_string(),
            ));
        }
        cfg.shutdown.grace_secs = grace;
    }
    config::validate(&cfg)?;
    Ok(cfg)
}

/// Contents of a project's info file, if it has one
pub fn project_info(working_dir: &Path) -> Option<String> {
    let path = working_dir.join(INFO_FILE);
    match std::fs::read_to_string(&path) {
        Ok(text) => Some(text),
        Err(e) => {
            debug!("No project info at {}: {}", path.display(), e);
            None
        }
    }
}

/// Human-readable launch summary
pub fn render_launch_summary(summary: &LaunchSummary) -> String {
    let mut out = String::new();
    for p in &summary.launched {
        let _ = write!(out, "started  {:<22} pid {:<7}", p.project, p.pid);
        if let Some(port) = p.port {
            let _ = write!(out, " port {:<5}", port);
        }
        let _ = writeln!(out, " logs {}", p.stdout_log.display());
    }
    for f in &summary.failures {
        let _ = writeln!(out, "FAILED   {:<22} {}", f.project, f.reason);
    }
    let _ = writeln!(
        out,
        "{} of {} project(s) running",
        summary.launched.len(),
        summary.attempted
    );
    out
}

fn outcome_label(outcome: TerminationOutcome) -> &'static str {
    match outcome {
        TerminationOutcome::AlreadyExited => "already exited",
        TerminationOutcome::Graceful => "stopped",
        TerminationOutcome::Killed => "killed",
        TerminationOutcome::Unconfirmed => "UNCONFIRMED",
    }
}

fn sweep_label(sweep: &PortSweep) -> String {
    match &sweep.outcome {
        SweepOutcome::NoListener => format!("port {} free", sweep.port),
        SweepOutcome::Killed { pids } => format!("port {} freed (killed {:?})", sweep.port, pids),
        SweepOutcome::Unavailable => format!("port {} not checked", sweep.port),
    }
}

/// Human-readable teardown report
pub fn render_teardown(report: &TeardownReport) -> String {
    let mut out = String::new();
    for r in &report.records {
        let _ = writeln!(out, "{:<14} {:<22} pid {}", outcome_label(r.outcome), r.project, r.pid);
        for w in &r.warnings {
            let _ = writeln!(out, "  warning: {}", w);
        }
    }
    for s in &report.sweeps {
        let _ = writeln!(out, "sweep          {:<22} {}", s.project, sweep_label(s));
    }
    for w in &report.warnings {
        let _ = writeln!(out, "warning: {}", w);
    }
    out
}

/// One line per project describing what `run` would execute
pub fn render_plan(cfg: &LaunchConfig) -> String {
    let mut out = String::new();
    for descriptor in &cfg.projects {
        let name = descriptor.display_name();
        match templates::resolve(descriptor) {
            Ok(plan) => {
                for step in &plan.prelaunch {
                    let _ = writeln!(out, "{:<22} build  {}", name, step.join(" "));
                }
                let _ = writeln!(
                    out,
                    "{:<22} run    {}  (in {})",
                    name,
                    plan.command.join(" "),
                    plan.working_dir.display()
                );
            }
            Err(e) => {
                let _ = writeln!(out, "{:<22} ERROR  {}", name, e);
            }
        }
    }
    out
}

/// Sweep `ports` with the platform's discovery chain
pub fn sweep_ports(ports: &[u16]) -> (Vec<PortSweep>, Vec<String>) {
    let sweeper = OrphanSweeper::new(
        Box::new(ChainedLookup::platform_default()),
        Arc::new(NativeProcessAdapter::new()),
    );
    let mut warnings = Vec::new();
    let sweeps = ports
        .iter()
        .map(|&port| {
            let result = sweeper.sweep_port(port);
            warnings.extend(result.warnings);
            PortSweep {
                project: String::new(),
                port,
                outcome: result.outcome,
            }
        })
        .collect();
    (sweeps, warnings)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Launch every project, wait for the operator, then tear everything down
///
/// Teardown runs on every path out of this function: normal return, early
/// error and panic.
pub async fn run(opts: RunOptions) -> Result<TeardownReport> {
    let cfg = resolve_config(opts.config.as_deref(), opts.root.as_deref(), opts.grace_secs)?;
    // Before launching, so an early Ctrl+C still routes through teardown
    let mut interrupts = operator::Interrupts::install()?;

    let mut supervisor =
        Supervisor::new(SupervisorConfig::native(cfg.launch, cfg.shutdown)).guard();
    let abort = supervisor.abort_handle();
    let projects = cfg.projects.clone();
    // Builds may run for minutes; signals must still get through meanwhile
    let mut launching = tokio::task::spawn_blocking(move || {
        let summary = supervisor.launch_all(&projects);
        (supervisor, summary)
    });
    let (joined, early_stop) = tokio::select! {
        joined = &mut launching => (joined, None),
        reason = interrupts.recv() => {
            warn!("Launch interrupted: {}", reason);
            abort.abort();
            (launching.await, Some(reason))
        }
    };
    let (supervisor, summary) = match joined {
        Ok(done) => done,
        Err(e) => match e.try_into_panic() {
            Ok(payload) => std::panic::resume_unwind(payload),
            Err(e) => return Err(CliError::LaunchTask(e.to_string())),
        },
    };

    if opts.json {
        print_json(&summary)?;
    } else {
        print!("{}", render_launch_summary(&summary));
        for launched in &summary.launched {
            if let Some(text) = project_info(&launched.working_dir) {
                println!("\n== {} ==\n{}", launched.project, text.trim_end());
            }
        }
    }

    let reason = match early_stop {
        Some(reason) => reason,
        None => {
            if summary.launched.is_empty() {
                warn!("Nothing was launched");
                supervisor.finish();
                return Err(CliError::NothingLaunched);
            }
            if !opts.json {
                println!("\nPress Enter or Ctrl+C to stop all projects");
            }
            operator::wait_for_stop(operator::stdin_line(), &mut interrupts).await
        }
    };
    info!("Shutting down: {}", reason);

    let report = supervisor.finish();
    if opts.json {
        print_json(&report)?;
    } else {
        print!("{}", render_teardown(&report));
    }
    Ok(report)
}
