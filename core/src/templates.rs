//! Command templates per process kind
//!
//! Resolution turns a [`ProjectDescriptor`] into a [`LaunchPlan`]: the
//! directory to run in, build steps to run to completion first, and the
//! long-running command itself. Resolution only inspects the filesystem; it
//! never starts anything.

use crate::{CoreError, Result};
use schema::{ProcessKind, ProjectDescriptor};
use std::path::{Path, PathBuf};

/// Maven launcher name for the current platform
pub const fn mvn_program() -> &'static str {
    if cfg!(windows) {
        "mvn.cmd"
    } else {
        "mvn"
    }
}

/// Fully resolved launch instructions for one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    /// Directory the commands run in; also where `logs/` is created
    pub working_dir: PathBuf,
    /// Steps that must finish successfully before the main command starts
    pub prelaunch: Vec<Vec<String>>,
    /// The long-running command
    pub command: Vec<String>,
}

impl LaunchPlan {
    fn new(working_dir: PathBuf, command: &[&str]) -> Self {
        Self {
            working_dir,
            prelaunch: Vec::new(),
            command: argv(command),
        }
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_string()).collect()
}

fn require_file(dir: &Path, file: &str, kind: ProcessKind) -> Result<()> {
    if dir.join(file).is_file() {
        Ok(())
    } else {
        Err(CoreError::ConfigurationError(format!(
            "{} project at {} has no {}",
            kind,
            dir.display(),
            file
        )))
    }
}

/// Resolve the command template for `descriptor`
pub fn resolve(descriptor: &ProjectDescriptor) -> Result<LaunchPlan> {
    let root = descriptor.path.clone();
    let kind = descriptor.kind;

    match kind {
        ProcessKind::Go => {
            if root.join("main.go").is_file() {
                Ok(LaunchPlan::new(root, &["go", "run", "."]))
            } else {
                let server = root.join("cmd").join("server");
                require_file(&server, "main.go", kind).map_err(|_| {
                    CoreError::ConfigurationError(format!(
                        "go project at {} has no main.go (checked ./ and cmd/server/)",
                        root.display()
                    ))
                })?;
                Ok(LaunchPlan::new(server, &["go", "run", "."]))
            }
        }
        ProcessKind::JavaMaven => {
            require_file(&root, "pom.xml", kind)?;
            let artifact = descriptor.artifact.as_ref().ok_or_else(|| {
                CoreError::ConfigurationError(format!(
                    "{} project at {} needs an artifact",
                    kind,
                    root.display()
                ))
            })?;
            let mut plan = LaunchPlan::new(
                root,
                &["java", "-jar", &artifact.to_string_lossy()],
            );
            plan.prelaunch.push(argv(&[mvn_program(), "package"]));
            Ok(plan)
        }
        ProcessKind::SpringBoot => {
            require_file(&root, "pom.xml", kind)?;
            Ok(LaunchPlan::new(root, &[mvn_program(), "spring-boot:run"]))
        }
        ProcessKind::PythonUvicorn => {
            require_file(&root, "main.py", kind)?;
            let port = descriptor.port.ok_or_else(|| {
                CoreError::ConfigurationError(format!(
                    "{} project at {} needs a port",
                    kind,
                    root.display()
                ))
            })?;
            Ok(LaunchPlan::new(
                root,
                &["uvicorn", "main:app", "--port", &port.to_string()],
            ))
        }
        ProcessKind::JavaGradle => Err(CoreError::UnsupportedKind(kind.to_string())),
        ProcessKind::Command => {
            if descriptor.command.is_empty() || descriptor.command[0].trim().is_empty() {
                return Err(CoreError::ConfigurationError(format!(
                    "command project at {} has an empty command",
                    root.display()
                )));
            }
            Ok(LaunchPlan {
                working_dir: root,
                prelaunch: Vec::new(),
                command: descriptor.command.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project_with(files: &[&str]) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().expect("tempdir");
        for file in files {
            let path = tmp.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"").unwrap();
        }
        tmp
    }

    #[test]
    fn test_go_prefers_root_main() {
        let tmp = project_with(&["main.go", "cmd/server/main.go"]);
        let plan = resolve(&ProjectDescriptor::new(tmp.path(), ProcessKind::Go)).unwrap();
        assert_eq!(plan.working_dir, tmp.path());
        assert_eq!(plan.command, vec!["go", "run", "."]);
        assert!(plan.prelaunch.is_empty());
    }

    #[test]
    fn test_go_falls_back_to_cmd_server() {
        let tmp = project_with(&["cmd/server/main.go"]);
        let plan = resolve(&ProjectDescriptor::new(tmp.path(), ProcessKind::Go)).unwrap();
        assert_eq!(plan.working_dir, tmp.path().join("cmd").join("server"));
    }

    #[test]
    fn test_go_without_main_fails() {
        let tmp = project_with(&[]);
        let err = resolve(&ProjectDescriptor::new(tmp.path(), ProcessKind::Go)).unwrap_err();
        assert!(err.to_string().contains("no main.go"));
    }

    #[test]
    fn test_maven_packages_then_runs_jar() {
        let tmp = project_with(&["pom.xml"]);
        let descriptor = ProjectDescriptor::new(tmp.path(), ProcessKind::JavaMaven)
            .with_artifact("target/patient-soap-1.0.0.jar");
        let plan = resolve(&descriptor).unwrap();
        assert_eq!(plan.prelaunch, vec![vec![mvn_program().to_string(), "package".to_string()]]);
        assert_eq!(plan.command, vec!["java", "-jar", "target/patient-soap-1.0.0.jar"]);
    }

    #[test]
    fn test_maven_requires_artifact_and_pom() {
        let tmp = project_with(&["pom.xml"]);
        assert!(resolve(&ProjectDescriptor::new(tmp.path(), ProcessKind::JavaMaven)).is_err());

        let empty = project_with(&[]);
        let descriptor =
            ProjectDescriptor::new(empty.path(), ProcessKind::JavaMaven).with_artifact("a.jar");
        assert!(resolve(&descriptor).unwrap_err().to_string().contains("pom.xml"));
    }

    #[test]
    fn test_spring_boot() {
        let tmp = project_with(&["pom.xml"]);
        let plan = resolve(&ProjectDescriptor::new(tmp.path(), ProcessKind::SpringBoot)).unwrap();
        assert_eq!(plan.command, vec![mvn_program(), "spring-boot:run"]);
    }

    #[test]
    fn test_uvicorn_passes_port() {
        let tmp = project_with(&["main.py"]);
        let descriptor =
            ProjectDescriptor::new(tmp.path(), ProcessKind::PythonUvicorn).with_port(8001);
        let plan = resolve(&descriptor).unwrap();
        assert_eq!(plan.command, vec!["uvicorn", "main:app", "--port", "8001"]);

        let no_port = ProjectDescriptor::new(tmp.path(), ProcessKind::PythonUvicorn);
        assert!(resolve(&no_port).is_err());
    }

    #[test]
    fn test_gradle_is_unsupported() {
        let tmp = project_with(&["build.gradle"]);
        let err = resolve(&ProjectDescriptor::new(tmp.path(), ProcessKind::JavaGradle)).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedKind(ref k) if k == "java:gradle"));
    }

    #[test]
    fn test_literal_command() {
        let descriptor = ProjectDescriptor::new("/srv/mock", ProcessKind::Command)
            .with_command(["node", "server.js"]);
        let plan = resolve(&descriptor).unwrap();
        assert_eq!(plan.command, vec!["node", "server.js"]);
        assert_eq!(plan.working_dir, PathBuf::from("/srv/mock"));

        let empty = ProjectDescriptor::new("/srv/mock", ProcessKind::Command);
        assert!(resolve(&empty).is_err());
    }
}
