//! Platform process primitives
//!
//! Every launched process is placed in a fresh process group so that group
//! signals reach the whole subtree it spawns and never the supervisor:
//!
//! - **Unix**: `setsid()` in the child before `exec`; SIGTERM for graceful and
//!   SIGKILL for forceful termination, both sent to the group.
//! - **Windows**: `CREATE_NEW_PROCESS_GROUP`; CTRL_BREAK_EVENT for graceful
//!   and a `taskkill /T /F` tree kill for forceful termination.
//!
//! The functions here are the building blocks of
//! [`NativeProcess`](crate::supervisor::NativeProcess); the termination
//! engine only sees the `graceful_stop`/`force_stop` capability.

use std::process::ExitStatus;

#[cfg(unix)]
pub mod unix;

#[cfg(windows)]
pub mod windows;

#[cfg(unix)]
pub use unix::*;

#[cfg(windows)]
pub use windows::*;

/// Exit information for a reaped process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
    /// Terminating signal, if the process was killed by one (Unix only)
    pub signal: Option<i32>,
}

impl ProcessExit {
    /// Exit with the given code
    pub const fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Killed by the given signal
    pub const fn with_signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Whether the process exited with code 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl std::fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown status"),
        }
    }
}
