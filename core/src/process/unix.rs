//! Unix process management with safe spawn/kill using process groups
//!
//! This module provides Unix-specific process management capabilities that use
//! process groups (via `setsid()`) to ensure safe and reliable process cleanup.
//!
//! ## Safety
//!
//! - All spawned processes are placed in their own process group using `setsid()`
//! - Signals are sent to the entire process group to ensure cleanup of child processes
//! - SIGTERM is used for graceful termination, SIGKILL for forceful termination
//! - `ESRCH` is treated as "already gone"; every other errno is reported
//!
//! ## Process Groups
//!
//! When a process calls `setsid()`, it:
//! - Creates a new session and becomes the session leader
//! - Creates a new process group and becomes the process group leader
//! - Has no controlling terminal
//!
//! The last point matters for the supervisor: a Ctrl+C typed at the terminal
//! reaches only the supervisor, which then drains its children in order.

// Allow unsafe code for this module since process management requires libc::setsid() calls
#![allow(unsafe_code)]

use crate::{CoreError, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use tracing::{debug, error};

/// A child process managed with Unix process groups
///
/// The process is guaranteed to be in its own process group, allowing for
/// reliable cleanup of the entire process tree.
#[derive(Debug)]
pub struct ChildProcess {
    /// The process ID of the spawned process
    pid: Pid,
    /// The underlying Child handle for waiting and status checking
    child: Child,
}

impl ChildProcess {
    /// Get the process ID
    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Get the process group ID (same as PID for session leaders)
    pub fn pgid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Try to wait for the process to exit without blocking
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child.try_wait().map_err(|e| {
            CoreError::ProcessWait(format!(
                "Failed to try_wait for process {}: {}",
                self.pid, e
            ))
        })
    }

    /// Block until the process exits
    pub fn wait(&mut self) -> Result<ExitStatus> {
        self.child.wait().map_err(|e| {
            CoreError::ProcessWait(format!("Failed to wait for process {}: {}", self.pid, e))
        })
    }
}

/// Spawn `argv` in `working_dir` inside a new session and process group
///
/// Stdin is detached; stdout and stderr go wherever the caller points them
/// (the launcher hands in the two log sink files).
///
/// ## Safety
///
/// `setsid()` is called in the child between `fork` and `exec`. It is
/// async-signal-safe, so it is sound to call from `pre_exec`.
///
/// ## Example
///
/// ```rust,no_run
/// use marshal_core::process::unix::spawn;
/// use std::process::Stdio;
///
/// let argv = vec!["sleep".to_string(), "30".to_string()];
/// let child = spawn(&argv, std::path::Path::new("/tmp"), Stdio::null(), Stdio::null())?;
/// assert_eq!(child.pid(), child.pgid());
/// # Ok::<(), marshal_core::CoreError>(())
/// ```
pub fn spawn(
    argv: &[String],
    working_dir: &Path,
    stdout: Stdio,
    stderr: Stdio,
) -> Result<ChildProcess> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| CoreError::ProcessSpawn("empty command line".to_string()))?;
    debug!("Spawning process: {} {:?} in {}", program, args, working_dir.display());

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr);

    // Safety: setsid() is async-signal-safe and appropriate for use in pre_exec
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = command.spawn().map_err(|e| {
        error!("Failed to spawn process '{}': {}", program, e);
        CoreError::ProcessSpawn(format!("Failed to spawn '{}': {}", program, e))
    })?;

    let pid = Pid::from_raw(child.id() as i32);
    debug!("Successfully spawned process {} in new process group", pid);

    Ok(ChildProcess { pid, child })
}

fn signal_group(pgid: u32, signal: Signal) -> Result<()> {
    let group = Pid::from_raw(pgid as i32);
    debug!("Sending {} to process group {}", signal, group);

    match killpg(group, signal) {
        Ok(()) => {
            debug!("Successfully sent {} to process group {}", signal, group);
            Ok(())
        }
        Err(Errno::ESRCH) => {
            // Process group doesn't exist, which means it already exited
            debug!("Process group {} already exited", group);
            Ok(())
        }
        Err(e) => Err(CoreError::ProcessSignal(format!(
            "Failed to send {} to process group {}: {}",
            signal, group, e
        ))),
    }
}

/// Send SIGTERM to the process group for graceful termination
///
/// `ESRCH` (no such process group) is treated as success since it means the
/// group has already exited. Other errors, including `EPERM`, are returned
/// as [`CoreError::ProcessSignal`].
pub fn signal_term_group(pgid: u32) -> Result<()> {
    signal_group(pgid, Signal::SIGTERM)
}

/// Send SIGKILL to the process group for forceful termination
///
/// Same error contract as [`signal_term_group`].
pub fn signal_kill_group(pgid: u32) -> Result<()> {
    signal_group(pgid, Signal::SIGKILL)
}

/// Whether process group `pgid` still has any member
///
/// Sends signal 0. `EPERM` means a member exists that we may not
/// signal, which still counts as alive. Zombie members count too until
/// they are reaped.
pub fn group_exists(pgid: u32) -> Result<bool> {
    match killpg(Pid::from_raw(pgid as i32), None) {
        Ok(()) | Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(CoreError::ProcessSignal(format!(
            "Failed to check process group {}: {}",
            pgid, e
        ))),
    }
}

/// Send SIGKILL to a single process that is not tracked by a handle
///
/// Used by the orphan sweeper for listeners found by port.
pub fn kill_pid(pid: u32) -> Result<()> {
    let target = Pid::from_raw(pid as i32);
    match kill(target, Signal::SIGKILL) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => {
            debug!("Process {} already exited", target);
            Ok(())
        }
        Err(e) => Err(CoreError::ProcessSignal(format!(
            "Failed to send SIGKILL to process {}: {}",
            target, e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn wait_with_deadline(child: &mut ChildProcess, deadline: Duration) -> Option<ExitStatus> {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if let Some(status) = child.try_wait().expect("try_wait") {
                return Some(status);
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        None
    }

    #[test]
    fn test_spawn_simple_command() {
        let mut child = spawn(
            &argv(&["echo", "hello", "world"]),
            Path::new("/"),
            Stdio::null(),
            Stdio::null(),
        )
        .expect("Failed to spawn echo");
        assert!(child.pid() > 0);
        assert_eq!(child.pid(), child.pgid()); // Process should be its own group leader
        let status = child.wait().expect("wait");
        assert!(status.success());
    }

    #[test]
    fn test_spawn_nonexistent_command() {
        let result = spawn(
            &argv(&["nonexistent_command_12345"]),
            Path::new("/"),
            Stdio::null(),
            Stdio::null(),
        );
        match result {
            Err(CoreError::ProcessSpawn(_)) => {} // Expected error type
            Err(e) => panic!("Expected ProcessSpawn error, got: {}", e),
            Ok(_) => panic!("Expected spawn to fail"),
        }
    }

    #[test]
    fn test_spawn_empty_command_line() {
        let result = spawn(&[], Path::new("/"), Stdio::null(), Stdio::null());
        assert!(matches!(result, Err(CoreError::ProcessSpawn(_))));
    }

    #[test]
    fn test_signal_nonexistent_group_is_ok() {
        // Above the kernel pid_max ceiling, so never allocated
        assert!(signal_term_group(99_999_999).is_ok());
        assert!(signal_kill_group(99_999_999).is_ok());
        assert!(kill_pid(99_999_999).is_ok());
    }

    #[test]
    fn test_group_exists_tracks_membership() {
        let mut child = spawn(
            &argv(&["sleep", "30"]),
            Path::new("/"),
            Stdio::null(),
            Stdio::null(),
        )
        .expect("Failed to spawn sleep");
        assert!(group_exists(child.pgid()).unwrap());

        signal_kill_group(child.pgid()).expect("SIGKILL");
        child.wait().expect("wait");
        assert!(!group_exists(child.pgid()).unwrap());
        assert!(!group_exists(99_999_999).unwrap());
    }

    #[test]
    fn test_term_group_stops_sleep() {
        let mut child = spawn(
            &argv(&["sleep", "30"]),
            Path::new("/"),
            Stdio::null(),
            Stdio::null(),
        )
        .expect("Failed to spawn sleep");

        signal_term_group(child.pgid()).expect("SIGTERM");
        let status = wait_with_deadline(&mut child, Duration::from_secs(5));
        let status = status.expect("sleep should exit on SIGTERM");
        assert!(!status.success());
    }
}
