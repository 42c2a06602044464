//! Launch configuration types
//!
//! A [`LaunchConfig`] is an ordered list of [`ProjectDescriptor`]s plus the
//! [`ShutdownSettings`] that bound the teardown sequence. Descriptors are
//! immutable once loaded; the supervisor launches them in list order.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Tag selecting the command template used to launch a project
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum ProcessKind {
    /// Go main package, started with `go run .`
    #[serde(rename = "go")]
    Go,
    /// Maven project packaged first, then started with `java -jar <artifact>`
    #[serde(rename = "java:maven")]
    JavaMaven,
    /// Gradle project (recognised, not launched)
    #[serde(rename = "java:gradle")]
    JavaGradle,
    /// Spring Boot project started with `mvn spring-boot:run`
    #[serde(rename = "java:spring-boot")]
    SpringBoot,
    /// Python ASGI app started with `uvicorn main:app --port <port>`
    #[serde(rename = "python:uvicorn")]
    PythonUvicorn,
    /// Literal argument vector taken from the descriptor
    #[serde(rename = "command")]
    Command,
}

impl ProcessKind {
    /// The configuration tag for this kind
    pub const fn as_tag(&self) -> &'static str {
        match self {
            ProcessKind::Go => "go",
            ProcessKind::JavaMaven => "java:maven",
            ProcessKind::JavaGradle => "java:gradle",
            ProcessKind::SpringBoot => "java:spring-boot",
            ProcessKind::PythonUvicorn => "python:uvicorn",
            ProcessKind::Command => "command",
        }
    }
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// Immutable description of one project to launch
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDescriptor {
    /// Project root directory
    pub path: PathBuf,

    /// Command template selector
    pub kind: ProcessKind,

    /// Port the service is expected to bind, used for orphan discovery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Display name; defaults to the last component of `path`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Argument vector for the `command` kind
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    /// Jar to run for the `java:maven` kind, relative to `path`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

impl ProjectDescriptor {
    /// Create a descriptor with no port, name, command or artifact
    pub fn new(path: impl Into<PathBuf>, kind: ProcessKind) -> Self {
        Self {
            path: path.into(),
            kind,
            port: None,
            name: None,
            command: Vec::new(),
            artifact: None,
        }
    }

    /// Set the port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set an explicit display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the argument vector used by the `command` kind
    #[must_use]
    pub fn with_command<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = argv.into_iter().map(Into::into).collect();
        self
    }

    /// Set the jar used by the `java:maven` kind
    #[must_use]
    pub fn with_artifact(mut self, artifact: impl Into<PathBuf>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    /// Name used in logs, reports and log file names
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    }
}

/// Bounds for the teardown sequence
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShutdownSettings {
    /// How long to wait after the graceful signal before escalating
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,

    /// How long to wait for the handle to be reaped after the forceful kill
    #[serde(default = "default_kill_wait_secs")]
    pub kill_wait_secs: u64,

    /// Polling cadence while waiting for exit
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl ShutdownSettings {
    /// Grace period as a Duration
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    /// Post-kill reap wait as a Duration
    pub fn kill_wait(&self) -> Duration {
        Duration::from_secs(self.kill_wait_secs)
    }

    /// Poll interval as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            grace_secs: default_grace_secs(),
            kill_wait_secs: default_kill_wait_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

const fn default_grace_secs() -> u64 {
    3
}

const fn default_kill_wait_secs() -> u64 {
    2
}

const fn default_poll_interval_ms() -> u64 {
    100
}

/// Bounds for the launch phase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSettings {
    /// How long a pre-launch build step may run before it is killed
    #[serde(default = "default_prelaunch_timeout_secs")]
    pub prelaunch_timeout_secs: u64,
}

impl LaunchSettings {
    /// Pre-launch step bound as a Duration
    pub fn prelaunch_timeout(&self) -> Duration {
        Duration::from_secs(self.prelaunch_timeout_secs)
    }
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            prelaunch_timeout_secs: default_prelaunch_timeout_secs(),
        }
    }
}

const fn default_prelaunch_timeout_secs() -> u64 {
    600
}

/// Top-level launch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfig {
    /// Launch bounds
    #[serde(default)]
    pub launch: LaunchSettings,

    /// Teardown bounds
    #[serde(default)]
    pub shutdown: ShutdownSettings,

    /// Projects to launch, in order
    #[serde(default)]
    pub projects: Vec<ProjectDescriptor>,
}
