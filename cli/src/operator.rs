//! Operator wait: block until Enter, end of stdin or a termination signal
//!
//! Signal handlers are installed before anything is launched and stay
//! installed for the life of the process, so a second Ctrl+C during
//! teardown is swallowed instead of killing the supervisor half way.

use crate::{CliError, Result};
use std::fmt;
use std::io::BufRead;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Why the operator wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A line was entered on stdin
    Enter,
    /// Stdin reached end of input or could not be read
    InputClosed,
    /// Ctrl+C (SIGINT / CTRL_C_EVENT)
    Interrupt,
    /// SIGTERM or CTRL_BREAK_EVENT
    Terminate,
    /// SIGHUP: the controlling terminal went away
    Hangup,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::Enter => "operator pressed Enter",
            StopReason::InputClosed => "input closed",
            StopReason::Interrupt => "interrupted",
            StopReason::Terminate => "termination requested",
            StopReason::Hangup => "terminal hung up",
        })
    }
}

/// Process-wide termination signal listeners
#[derive(Debug)]
pub struct Interrupts {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
    #[cfg(windows)]
    ctrl_c: tokio::signal::windows::CtrlC,
    #[cfg(windows)]
    ctrl_break: tokio::signal::windows::CtrlBreak,
}

impl Interrupts {
    /// Install the listeners; must run inside a tokio runtime
    #[cfg(unix)]
    pub fn install() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let interrupt = signal(SignalKind::interrupt())
            .map_err(|e| CliError::SignalSetup(format!("SIGINT: {}", e)))?;
        let terminate = signal(SignalKind::terminate())
            .map_err(|e| CliError::SignalSetup(format!("SIGTERM: {}", e)))?;
        let hangup = signal(SignalKind::hangup())
            .map_err(|e| CliError::SignalSetup(format!("SIGHUP: {}", e)))?;
        Ok(Self {
            interrupt,
            terminate,
            hangup,
        })
    }

    /// Install the listeners; must run inside a tokio runtime
    #[cfg(windows)]
    pub fn install() -> Result<Self> {
        use tokio::signal::windows::{ctrl_break, ctrl_c};

        let ctrl_c = ctrl_c().map_err(|e| CliError::SignalSetup(format!("Ctrl+C: {}", e)))?;
        let ctrl_break =
            ctrl_break().map_err(|e| CliError::SignalSetup(format!("Ctrl+Break: {}", e)))?;
        Ok(Self { ctrl_c, ctrl_break })
    }

    /// Wait for the next termination signal
    pub async fn recv(&mut self) -> StopReason {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => StopReason::Interrupt,
                _ = self.terminate.recv() => StopReason::Terminate,
                _ = self.hangup.recv() => StopReason::Hangup,
            }
        }
        #[cfg(windows)]
        {
            tokio::select! {
                _ = self.ctrl_c.recv() => StopReason::Interrupt,
                _ = self.ctrl_break.recv() => StopReason::Terminate,
            }
        }
    }
}

/// Resolves once a line has been read from `input` on a helper thread
///
/// End of input, or a read error, resolves with [`StopReason::InputClosed`].
pub fn line_from<R>(input: R) -> oneshot::Receiver<StopReason>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let spawned = std::thread::Builder::new()
        .name("operator-input".to_string())
        .spawn(move || {
            let mut input = input;
            let mut line = String::new();
            let reason = match input.read_line(&mut line) {
                Ok(0) => {
                    debug!("Operator input closed");
                    StopReason::InputClosed
                }
                Ok(_) => StopReason::Enter,
                Err(e) => {
                    warn!("Failed to read operator input: {}", e);
                    StopReason::InputClosed
                }
            };
            let _ = tx.send(reason);
        });
    if let Err(e) = spawned {
        warn!("Failed to start operator input thread: {}", e);
    }
    rx
}

/// [`line_from`] over the process's stdin
pub fn stdin_line() -> oneshot::Receiver<StopReason> {
    line_from(std::io::BufReader::new(std::io::stdin()))
}

/// Block until `input` resolves or a signal is received
pub async fn wait_for_stop(
    input: oneshot::Receiver<StopReason>,
    interrupts: &mut Interrupts,
) -> StopReason {
    tokio::select! {
        Ok(reason) = input => reason,
        reason = interrupts.recv() => reason,
    }
}
