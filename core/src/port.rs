//! Listening-port owner discovery
//!
//! The orphan sweeper needs to know which processes still listen on a
//! project's port after its tracked handle is gone. Discovery goes through
//! the [`PortOwnerLookup`] trait with one backend per mechanism:
//!
//! - [`ProcNetLookup`]: reads `/proc/net/tcp{,6}` and maps socket inodes to
//!   PIDs through `/proc/<pid>/fd` (Linux)
//! - [`LsofLookup`]: `lsof -nP -iTCP:<port> -sTCP:LISTEN -t`
//! - [`SsLookup`]: `ss -ltnpH` (Linux)
//! - [`NetstatLookup`]: `netstat -ano` (Windows)
//!
//! [`ChainedLookup`] asks each backend in turn until one of them is
//! available. Only an exact port match counts: `:80` never matches `:8080`.

use crate::CoreError;
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::process::{Command, Output, Stdio};
use thiserror::Error;
use tracing::{debug, warn};

/// Why a lookup produced no answer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The mechanism does not exist on this system
    #[error("{0} unavailable")]
    Unavailable(String),

    /// The mechanism exists but failed
    #[error("{backend} failed: {reason}")]
    Failed {
        /// Backend name
        backend: String,
        /// What went wrong
        reason: String,
    },
}

impl From<LookupError> for CoreError {
    fn from(err: LookupError) -> Self {
        CoreError::DiscoveryUnavailable(err.to_string())
    }
}

/// Result type for port lookups
pub type LookupResult<T> = std::result::Result<T, LookupError>;

/// Finds the processes listening on a TCP port
pub trait PortOwnerLookup: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// PIDs with a listening socket bound to exactly `port`, sorted and
    /// deduplicated
    fn owners(&self, port: u16) -> LookupResult<Vec<u32>>;
}

fn normalize(mut pids: Vec<u32>) -> Vec<u32> {
    pids.sort_unstable();
    pids.dedup();
    pids
}

/// Port part of an `addr:port` column, if it parses
fn local_port(address: &str) -> Option<u16> {
    address.rsplit_once(':').and_then(|(_, port)| port.parse().ok())
}

fn run_tool(backend: &'static str, program: &str, args: &[&str]) -> LookupResult<Output> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                LookupError::Unavailable(format!("{backend} ({program} not installed)"))
            } else {
                LookupError::Failed {
                    backend: backend.to_string(),
                    reason: e.to_string(),
                }
            }
        })
}

/// Socket inodes of LISTEN entries on `port` in a `/proc/net/tcp` table
pub fn parse_proc_net_tcp(contents: &str, port: u16) -> Vec<u64> {
    const TCP_LISTEN: &str = "0A";

    contents
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 || fields[3] != TCP_LISTEN {
                return None;
            }
            let (_, hex_port) = fields[1].rsplit_once(':')?;
            if u16::from_str_radix(hex_port, 16).ok()? != port {
                return None;
            }
            fields[9].parse::<u64>().ok().filter(|inode| *inode != 0)
        })
        .collect()
}

/// Inode from a `socket:[12345]` fd link target
pub fn parse_socket_link(target: &str) -> Option<u64> {
    target
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// PIDs from `lsof -t` output, one per line
pub fn parse_lsof_pids(stdout: &str) -> Vec<u32> {
    normalize(
        stdout
            .lines()
            .filter_map(|line| line.trim().parse().ok())
            .collect(),
    )
}

/// PIDs listening on `port` in `ss -ltnpH` output
pub fn parse_ss_listeners(stdout: &str, port: u16) -> Vec<u32> {
    let mut pids = Vec::new();
    for line in stdout.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 || fields[0] != "LISTEN" {
            continue;
        }
        if local_port(fields[3]) != Some(port) {
            continue;
        }
        let mut rest = line;
        while let Some(idx) = rest.find("pid=") {
            rest = &rest[idx + 4..];
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(pid) = digits.parse() {
                pids.push(pid);
            }
        }
    }
    normalize(pids)
}

/// PIDs listening on `port` in `netstat -ano` output
///
/// The state column is localized, so listeners are recognised by their
/// unconnected foreign address instead.
pub fn parse_netstat_listeners(stdout: &str, port: u16) -> Vec<u32> {
    const UNCONNECTED: [&str; 2] = ["0.0.0.0:0", "[::]:0"];

    normalize(
        stdout
            .lines()
            .filter_map(|line| {
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() < 5 || !fields[0].starts_with("TCP") {
                    return None;
                }
                if !UNCONNECTED.contains(&fields[2]) {
                    return None;
                }
                if local_port(fields[1]) != Some(port) {
                    return None;
                }
                fields.last()?.parse().ok()
            })
            .collect(),
    )
}

/// Linux `/proc` backend
#[derive(Debug, Clone)]
pub struct ProcNetLookup {
    proc_root: std::path::PathBuf,
}

impl Default for ProcNetLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcNetLookup {
    /// Backend reading the live `/proc`
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Backend reading an alternative proc root
    pub fn with_root(root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            proc_root: root.into(),
        }
    }

    fn listening_inodes(&self, port: u16) -> LookupResult<Vec<u64>> {
        let mut inodes = Vec::new();
        let mut any_table = false;
        for table in ["tcp", "tcp6"] {
            let path = self.proc_root.join("net").join(table);
            match std::fs::read_to_string(&path) {
                Ok(contents) => {
                    any_table = true;
                    inodes.extend(parse_proc_net_tcp(&contents, port));
                }
                Err(e) => debug!("Skipping {}: {}", path.display(), e),
            }
        }
        if !any_table {
            return Err(LookupError::Unavailable("procfs".to_string()));
        }
        Ok(inodes)
    }

    /// PIDs holding any of `inodes`, plus the inodes nobody visible holds
    fn pids_holding(&self, inodes: &[u64]) -> (Vec<u32>, Vec<u64>) {
        let Ok(entries) = std::fs::read_dir(&self.proc_root) else {
            return (Vec::new(), inodes.to_vec());
        };
        let mut pids = Vec::new();
        let mut seen = HashSet::new();
        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            // Other users' fd tables are unreadable; skip them
            let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
                continue;
            };
            let mut holds = false;
            for fd in fds.flatten() {
                let inode = std::fs::read_link(fd.path())
                    .ok()
                    .and_then(|target| parse_socket_link(&target.to_string_lossy()));
                if let Some(inode) = inode.filter(|inode| inodes.contains(inode)) {
                    seen.insert(inode);
                    holds = true;
                }
            }
            if holds {
                pids.push(pid);
            }
        }
        let unowned = inodes.iter().copied().filter(|i| !seen.contains(i)).collect();
        (normalize(pids), unowned)
    }
}

impl PortOwnerLookup for ProcNetLookup {
    fn name(&self) -> &'static str {
        "procfs"
    }

    fn owners(&self, port: u16) -> LookupResult<Vec<u32>> {
        let inodes = self.listening_inodes(port)?;
        if inodes.is_empty() {
            return Ok(Vec::new());
        }
        let (pids, unowned) = self.pids_holding(&inodes);
        if !unowned.is_empty() {
            // Some listener's owner is not visible to us; a partial answer
            // would leave it running
            debug!("Sockets {:?} on port {} have no visible owner", unowned, port);
            return Err(LookupError::Unavailable(format!(
                "procfs (owner of port {port} not visible)"
            )));
        }
        Ok(pids)
    }
}

/// `lsof` backend
#[derive(Debug, Clone, Copy, Default)]
pub struct LsofLookup;

impl PortOwnerLookup for LsofLookup {
    fn name(&self) -> &'static str {
        "lsof"
    }

    fn owners(&self, port: u16) -> LookupResult<Vec<u32>> {
        let filter = format!("-iTCP:{port}");
        let output = run_tool(self.name(), "lsof", &["-nP", &filter, "-sTCP:LISTEN", "-t"])?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        match output.status.code() {
            Some(0) => Ok(parse_lsof_pids(&stdout)),
            // lsof exits 1 when nothing matched
            Some(1) if stdout.trim().is_empty() => Ok(Vec::new()),
            _ => Err(LookupError::Failed {
                backend: self.name().to_string(),
                reason: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            }),
        }
    }
}

/// `ss` backend
#[derive(Debug, Clone, Copy, Default)]
pub struct SsLookup;

impl PortOwnerLookup for SsLookup {
    fn name(&self) -> &'static str {
        "ss"
    }

    fn owners(&self, port: u16) -> LookupResult<Vec<u32>> {
        let output = run_tool(self.name(), "ss", &["-ltnpH"])?;
        if !output.status.success() {
            return Err(LookupError::Failed {
                backend: self.name().to_string(),
                reason: output.status.to_string(),
            });
        }
        Ok(parse_ss_listeners(&String::from_utf8_lossy(&output.stdout), port))
    }
}

/// `netstat` backend
#[derive(Debug, Clone, Copy, Default)]
pub struct NetstatLookup;

impl PortOwnerLookup for NetstatLookup {
    fn name(&self) -> &'static str {
        "netstat"
    }

    fn owners(&self, port: u16) -> LookupResult<Vec<u32>> {
        let output = run_tool(self.name(), "netstat", &["-ano"])?;
        if !output.status.success() {
            return Err(LookupError::Failed {
                backend: self.name().to_string(),
                reason: output.status.to_string(),
            });
        }
        Ok(parse_netstat_listeners(
            &String::from_utf8_lossy(&output.stdout),
            port,
        ))
    }
}

/// Tries each backend in order until one is available
#[derive(Default)]
pub struct ChainedLookup {
    backends: Vec<Box<dyn PortOwnerLookup>>,
}

impl ChainedLookup {
    /// Chain over `backends`, asked in order
    pub fn new(backends: Vec<Box<dyn PortOwnerLookup>>) -> Self {
        Self { backends }
    }

    /// Backends available on the current platform
    pub fn platform_default() -> Self {
        #[cfg(target_os = "linux")]
        let backends: Vec<Box<dyn PortOwnerLookup>> = vec![
            Box::new(ProcNetLookup::new()),
            Box::new(LsofLookup),
            Box::new(SsLookup),
        ];
        #[cfg(all(unix, not(target_os = "linux")))]
        let backends: Vec<Box<dyn PortOwnerLookup>> = vec![Box::new(LsofLookup)];
        #[cfg(windows)]
        let backends: Vec<Box<dyn PortOwnerLookup>> = vec![Box::new(NetstatLookup)];
        #[cfg(not(any(unix, windows)))]
        let backends: Vec<Box<dyn PortOwnerLookup>> = Vec::new();

        Self::new(backends)
    }

    /// Names of the chained backends
    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }
}

impl std::fmt::Debug for ChainedLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainedLookup")
            .field("backends", &self.backend_names())
            .finish()
    }
}

impl PortOwnerLookup for ChainedLookup {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn owners(&self, port: u16) -> LookupResult<Vec<u32>> {
        let mut failures = Vec::new();
        for backend in &self.backends {
            match backend.owners(port) {
                Ok(pids) => {
                    debug!("{} found {:?} listening on port {}", backend.name(), pids, port);
                    return Ok(pids);
                }
                Err(LookupError::Unavailable(reason)) => {
                    debug!("Port lookup backend {}: {}", backend.name(), reason);
                }
                Err(e) => {
                    warn!("Port lookup backend {} failed for port {}: {}", backend.name(), port, e);
                    failures.push(e.to_string());
                }
            }
        }
        if failures.is_empty() {
            Err(LookupError::Unavailable(
                "no port discovery mechanism".to_string(),
            ))
        } else {
            Err(LookupError::Failed {
                backend: self.name().to_string(),
                reason: failures.join("; "),
            })
        }
    }
}

/// Fixed port → PID table
#[derive(Debug, Clone, Default)]
pub struct StaticLookup {
    owners: HashMap<u16, Vec<u32>>,
}

impl StaticLookup {
    /// Empty table: every port is free
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `pids` as listening on `port`
    pub fn with_owner(mut self, port: u16, pids: impl IntoIterator<Item = u32>) -> Self {
        self.owners.entry(port).or_default().extend(pids);
        self
    }
}

impl PortOwnerLookup for StaticLookup {
    fn name(&self) -> &'static str {
        "static"
    }

    fn owners(&self, port: u16) -> LookupResult<Vec<u32>> {
        Ok(normalize(self.owners.get(&port).cloned().unwrap_or_default()))
    }
}

/// A lookup for systems with no discovery mechanism
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableLookup;

impl PortOwnerLookup for UnavailableLookup {
    fn name(&self) -> &'static str {
        "none"
    }

    fn owners(&self, _port: u16) -> LookupResult<Vec<u32>> {
        Err(LookupError::Unavailable(
            "no port discovery mechanism".to_string(),
        ))
    }
}
