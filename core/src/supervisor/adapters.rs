//! Process adapters for abstracting process management
//!
//! This module provides traits and implementations for abstracting process
//! management operations, enabling testing with mock implementations and
//! selecting the platform backend at build time.

use crate::log_sink::LogSink;
use crate::process::{self, ProcessExit};
use crate::{CoreError, Result};
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Trait for managing processes in a platform-agnostic way
pub trait ProcessAdapter: Send + Sync {
    /// Start `argv` in `working_dir` as the root of a new process group,
    /// with output appended to `sink`
    fn spawn(
        &self,
        argv: &[String],
        working_dir: &Path,
        sink: &LogSink,
    ) -> Result<Box<dyn ManagedProcess>>;

    /// Start a pre-launch build step with output appended to `sink`
    ///
    /// The step gets its own process group so a stuck build can be killed
    /// together with everything it started.
    fn spawn_step(
        &self,
        argv: &[String],
        working_dir: &Path,
        sink: &LogSink,
    ) -> Result<Box<dyn ManagedProcess>>;

    /// Forcefully kill an untracked process by PID
    fn kill_pid(&self, pid: u32) -> Result<()>;
}

/// Trait representing a launched process that can be stopped and reaped
pub trait ManagedProcess: Send {
    /// Get the process ID
    fn pid(&self) -> u32;

    /// Get the process group identifier signals are addressed to
    fn pgid(&self) -> u32;

    /// Non-blocking check for exit; reaps the process when it has exited
    fn try_wait(&mut self) -> Result<Option<ProcessExit>>;

    /// Ask the whole process group to stop (SIGTERM / CTRL_BREAK_EVENT)
    fn graceful_stop(&mut self) -> Result<()>;

    /// Kill the whole process group (SIGKILL / `taskkill /T /F`)
    fn force_stop(&mut self) -> Result<()>;

    /// Whether any member of the process group is still around
    ///
    /// Used once the leader has exited, to catch background children left
    /// in its group.
    fn group_alive(&self) -> Result<bool>;
}

/// Adapter backed by the real platform process primitives
#[derive(Copy, Clone, Debug, Default)]
pub struct NativeProcessAdapter;

impl NativeProcessAdapter {
    /// Create a new native process adapter
    pub fn new() -> Self {
        Self
    }
}

impl ProcessAdapter for NativeProcessAdapter {
    fn spawn(
        &self,
        argv: &[String],
        working_dir: &Path,
        sink: &LogSink,
    ) -> Result<Box<dyn ManagedProcess>> {
        let (stdout, stderr) = sink.stdio()?;
        let child = process::spawn(argv, working_dir, stdout, stderr)?;
        Ok(Box::new(NativeProcess { child }))
    }

    fn spawn_step(
        &self,
        argv: &[String],
        working_dir: &Path,
        sink: &LogSink,
    ) -> Result<Box<dyn ManagedProcess>> {
        self.spawn(argv, working_dir, sink)
    }

    fn kill_pid(&self, pid: u32) -> Result<()> {
        process::kill_pid(pid)
    }
}

/// A real child process in its own process group
#[derive(Debug)]
pub struct NativeProcess {
    child: process::ChildProcess,
}

impl ManagedProcess for NativeProcess {
    fn pid(&self) -> u32 {
        self.child.pid()
    }

    fn pgid(&self) -> u32 {
        self.child.pgid()
    }

    fn try_wait(&mut self) -> Result<Option<ProcessExit>> {
        Ok(self.child.try_wait()?.map(ProcessExit::from))
    }

    fn graceful_stop(&mut self) -> Result<()> {
        process::signal_term_group(self.child.pgid())
    }

    fn force_stop(&mut self) -> Result<()> {
        process::signal_kill_group(self.child.pgid())
    }

    fn group_alive(&self) -> Result<bool> {
        process::group_exists(self.child.pgid())
    }
}

/// Instructions for mock process behavior
#[derive(Debug, Clone, Copy)]
pub struct MockInstruction {
    /// The process reports exit before any signal is sent
    pub already_exited: bool,
    /// The graceful stop makes the process exit
    pub exits_on_graceful: bool,
    /// The forceful stop makes the process exit
    pub exits_on_force: bool,
    /// `graceful_stop` returns a signal error
    pub graceful_error: bool,
    /// `force_stop` returns a signal error
    pub force_error: bool,
    /// `graceful_stop` panics
    pub panic_on_graceful: bool,
    /// Other group members ignore the graceful signal and outlive the
    /// leader until the forceful stop
    pub lingering_group: bool,
}

impl Default for MockInstruction {
    fn default() -> Self {
        Self {
            already_exited: false,
            exits_on_graceful: true,
            exits_on_force: true,
            graceful_error: false,
            force_error: false,
            panic_on_graceful: false,
            lingering_group: false,
        }
    }
}

impl MockInstruction {
    /// A process that has exited before teardown reaches it
    pub fn exited() -> Self {
        Self {
            already_exited: true,
            ..Self::default()
        }
    }

    /// A process that ignores the graceful signal and dies on the kill
    pub fn ignores_graceful() -> Self {
        Self {
            exits_on_graceful: false,
            ..Self::default()
        }
    }

    /// A process whose group cannot be signalled at all
    pub fn unsignalable() -> Self {
        Self {
            exits_on_graceful: false,
            exits_on_force: false,
            graceful_error: true,
            force_error: true,
            ..Self::default()
        }
    }

    /// An exited leader whose background children are still running
    pub fn exited_leaving_group() -> Self {
        Self {
            already_exited: true,
            lingering_group: true,
            ..Self::default()
        }
    }
}

/// Calls observed by a [`MockProcessAdapter`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockCalls {
    /// Programs passed to `spawn`, in order, including failed spawns
    pub spawned: Vec<String>,
    /// Programs passed to `spawn_step`, in order
    pub prelaunch: Vec<String>,
    /// PIDs that received a graceful stop, in order
    pub graceful: Vec<u32>,
    /// PIDs that received a forceful stop, in order
    pub forced: Vec<u32>,
    /// PIDs killed through `kill_pid`, in order
    pub killed: Vec<u32>,
}

#[derive(Debug, Default)]
struct MockState {
    instructions: VecDeque<MockInstruction>,
    failing_programs: HashSet<String>,
    failing_steps: HashSet<String>,
    hanging_steps: HashSet<String>,
    calls: MockCalls,
}

/// Mock process adapter for testing
#[derive(Debug, Clone)]
pub struct MockProcessAdapter {
    state: Arc<Mutex<MockState>>,
    next_pid: Arc<AtomicU32>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    // A panicking mock process must not wedge the remaining records
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockProcessAdapter {
    /// Create a new mock adapter with no pre-configured instructions
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            next_pid: Arc::new(AtomicU32::new(40_000)),
        }
    }

    /// Add instructions for the next spawned process
    pub fn add_instruction(&self, instruction: MockInstruction) {
        lock(&self.state).instructions.push_back(instruction);
    }

    /// Set instructions for the next spawned processes, in order
    pub fn set_instructions(&self, instructions: Vec<MockInstruction>) {
        lock(&self.state).instructions = instructions.into();
    }

    /// Make every `spawn` of `program` fail as if the executable were missing
    pub fn fail_spawn_of(&self, program: impl Into<String>) {
        lock(&self.state).failing_programs.insert(program.into());
    }

    /// Make every build step running `program` exit with status 1
    pub fn fail_step_of(&self, program: impl Into<String>) {
        lock(&self.state).failing_steps.insert(program.into());
    }

    /// Make every build step running `program` run until it is killed
    pub fn hang_step_of(&self, program: impl Into<String>) {
        lock(&self.state).hanging_steps.insert(program.into());
    }

    /// Snapshot of the calls observed so far
    pub fn calls(&self) -> MockCalls {
        lock(&self.state).calls.clone()
    }
}

impl MockProcessAdapter {
    fn process(
        &self,
        instruction: MockInstruction,
        exit: Option<ProcessExit>,
    ) -> Box<dyn ManagedProcess> {
        Box::new(MockManagedProcess {
            pid: self.next_pid.fetch_add(1, Ordering::Relaxed),
            instruction,
            group_lingers: instruction.lingering_group,
            exit,
            state: Arc::clone(&self.state),
        })
    }
}

impl Default for MockProcessAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn program_of(argv: &[String]) -> String {
    argv.first().cloned().unwrap_or_default()
}

impl ProcessAdapter for MockProcessAdapter {
    fn spawn(
        &self,
        argv: &[String],
        working_dir: &Path,
        _sink: &LogSink,
    ) -> Result<Box<dyn ManagedProcess>> {
        debug!("Spawning mock process for: {:?} in {}", argv, working_dir.display());
        let program = program_of(argv);

        let mut state = lock(&self.state);
        state.calls.spawned.push(program.clone());
        if program.is_empty() {
            return Err(CoreError::ProcessSpawn("empty command line".to_string()));
        }
        if state.failing_programs.contains(&program) {
            return Err(CoreError::ProcessSpawn(format!(
                "Failed to spawn '{}': No such file or directory (os error 2)",
                program
            )));
        }
        let instruction = state.instructions.pop_front().unwrap_or_default();
        drop(state);

        let exit = instruction
            .already_exited
            .then(|| ProcessExit::with_code(0));
        Ok(self.process(instruction, exit))
    }

    fn spawn_step(
        &self,
        argv: &[String],
        _working_dir: &Path,
        _sink: &LogSink,
    ) -> Result<Box<dyn ManagedProcess>> {
        let program = program_of(argv);
        let mut state = lock(&self.state);
        state.calls.prelaunch.push(program.clone());
        let exit = if state.hanging_steps.contains(&program) {
            None
        } else if state.failing_steps.contains(&program) {
            Some(ProcessExit::with_code(1))
        } else {
            Some(ProcessExit::with_code(0))
        };
        drop(state);

        // A build step shrugs off SIGTERM; only the kill ends it
        Ok(self.process(MockInstruction::ignores_graceful(), exit))
    }

    fn kill_pid(&self, pid: u32) -> Result<()> {
        lock(&self.state).calls.killed.push(pid);
        Ok(())
    }
}

/// Mock managed process for testing
struct MockManagedProcess {
    pid: u32,
    instruction: MockInstruction,
    group_lingers: bool,
    exit: Option<ProcessExit>,
    state: Arc<Mutex<MockState>>,
}

impl ManagedProcess for MockManagedProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn pgid(&self) -> u32 {
        self.pid
    }

    fn try_wait(&mut self) -> Result<Option<ProcessExit>> {
        Ok(self.exit)
    }

    fn graceful_stop(&mut self) -> Result<()> {
        debug!("Graceful stop of mock process {}", self.pid);
        lock(&self.state).calls.graceful.push(self.pid);
        if self.instruction.panic_on_graceful {
            panic!("mock process {} panicked during graceful stop", self.pid);
        }
        if self.instruction.graceful_error {
            return Err(CoreError::ProcessSignal(format!(
                "Failed to send SIGTERM to process group {}: EPERM: Operation not permitted",
                self.pid
            )));
        }
        if self.instruction.exits_on_graceful && self.exit.is_none() {
            self.exit = Some(ProcessExit::with_signal(15));
        }
        Ok(())
    }

    fn force_stop(&mut self) -> Result<()> {
        debug!("Force stop of mock process {}", self.pid);
        lock(&self.state).calls.forced.push(self.pid);
        if self.instruction.force_error {
            return Err(CoreError::ProcessSignal(format!(
                "Failed to send SIGKILL to process group {}: EPERM: Operation not permitted",
                self.pid
            )));
        }
        if self.instruction.exits_on_force && self.exit.is_none() {
            self.exit = Some(ProcessExit::with_signal(9));
        }
        self.group_lingers = false;
        Ok(())
    }

    fn group_alive(&self) -> Result<bool> {
        Ok(self.exit.is_none() || self.group_lingers)
    }
}
