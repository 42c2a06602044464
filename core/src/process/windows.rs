//! Windows process management using console process groups
//!
//! Processes are started with `CREATE_NEW_PROCESS_GROUP`, which makes the
//! child the root of a new console process group whose identifier equals its
//! PID. Graceful termination sends CTRL_BREAK_EVENT to that group; forceful
//! termination uses `taskkill /T /F`, which walks the process tree and so
//! also reaches forked JVMs and build tool children.

// GenerateConsoleCtrlEvent has no safe std wrapper
#![allow(unsafe_code)]

use crate::{CoreError, Result};
use std::os::windows::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use tracing::{debug, error};

const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
const CTRL_BREAK_EVENT: u32 = 1;
/// taskkill exit status when no process matched the filter
const TASKKILL_NOT_FOUND: i32 = 128;

#[link(name = "kernel32")]
extern "system" {
    fn GenerateConsoleCtrlEvent(dw_ctrl_event: u32, dw_process_group_id: u32) -> i32;
}

/// A child process rooted in its own console process group
#[derive(Debug)]
pub struct ChildProcess {
    pid: u32,
    child: Child,
}

impl ChildProcess {
    /// Get the process ID
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Get the console process group ID (same as PID for the group root)
    pub fn pgid(&self) -> u32 {
        self.pid
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

/// Spawn `argv` in `working_dir` as the root of a new console process group
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

    let child = Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .creation_flags(CREATE_NEW_PROCESS_GROUP)
        .spawn()
        .map_err(|e| {
            error!("Failed to spawn process '{}': {}", program, e);
            CoreError::ProcessSpawn(format!("Failed to spawn '{}': {}", program, e))
        })?;

    let pid = child.id();
    debug!("Successfully spawned process {} in new console process group", pid);
    Ok(ChildProcess { pid, child })
}

/// Send CTRL_BREAK_EVENT to the console process group
pub fn signal_break_group(pgid: u32) -> Result<()> {
    debug!("Sending CTRL_BREAK_EVENT to process group {}", pgid);
    // Safety: plain Win32 call with integer arguments
    let ok = unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pgid) };
    if ok == 0 {
        return Err(CoreError::ProcessSignal(format!(
            "Failed to send CTRL_BREAK_EVENT to process group {}: {}",
            pgid,
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// Forcefully kill `pid` and every descendant with `taskkill /T /F`
pub fn kill_tree(pid: u32) -> Result<()> {
    debug!("Killing process tree rooted at {}", pid);
    let status = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| CoreError::ProcessSignal(format!("Failed to run taskkill for {}: {}", pid, e)))?;

    match status.code() {
        Some(0) => Ok(()),
        Some(TASKKILL_NOT_FOUND) => {
            debug!("Process {} already exited", pid);
            Ok(())
        }
        _ => Err(CoreError::ProcessSignal(format!(
            "taskkill for {} failed with {}",
            pid, status
        ))),
    }
}

/// Group-level graceful stop
pub fn signal_term_group(pgid: u32) -> Result<()> {
    signal_break_group(pgid)
}

/// Group-level forceful stop
pub fn signal_kill_group(pgid: u32) -> Result<()> {
    kill_tree(pgid)
}

/// Whether console process group `pgid` still has any member
///
/// Windows offers no way to enumerate a console process group, so the
/// group is reported gone; `taskkill /T` on an exited root cannot reach
/// its former children either.
pub fn group_exists(pgid: u32) -> Result<bool> {
    debug!("Cannot inspect console process group {}; assuming it is gone", pgid);
    Ok(false)
}

/// Forcefully kill a single untracked process and its descendants
pub fn kill_pid(pid: u32) -> Result<()> {
    kill_tree(pid)
}
