//! Configuration loading and validation for Marshal
//!
//! This module parses a TOML launch configuration into `schema::LaunchConfig`,
//! applies defaults (via serde defaults on schema types), resolves relative
//! project paths and performs strict validation with field-path error
//! messages. When no file is given the built-in data-provider list is used.

use crate::{CoreError, Result};
use schema::*;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Built-in project list: the data providers shipped alongside the supervisor
pub fn default_projects(root: &Path) -> Vec<ProjectDescriptor> {
    vec![
        ProjectDescriptor::new(root.join("National_Weather_XML"), ProcessKind::Go).with_port(8081),
        ProjectDescriptor::new(root.join("Healthcare_XML"), ProcessKind::JavaMaven)
            .with_port(8082)
            .with_artifact("target/patient-soap-1.0.0.jar"),
        ProjectDescriptor::new(root.join("Employees_JSON"), ProcessKind::PythonUvicorn)
            .with_port(8001),
        ProjectDescriptor::new(root.join("Inventory_JSON"), ProcessKind::PythonUvicorn)
            .with_port(8002),
        ProjectDescriptor::new(root.join("Distribution_YAML"), ProcessKind::PythonUvicorn)
            .with_port(8003),
        ProjectDescriptor::new(root.join("Warehouse_YAML"), ProcessKind::PythonUvicorn)
            .with_port(8004),
        ProjectDescriptor::new(root.join("Transport_CSV"), ProcessKind::SpringBoot).with_port(8084),
        ProjectDescriptor::new(root.join("Finances_CSV"), ProcessKind::SpringBoot).with_port(8085),
    ]
}

/// Built-in configuration rooted at `root`
pub fn default_config(root: &Path) -> LaunchConfig {
    LaunchConfig {
        launch: LaunchSettings::default(),
        shutdown: ShutdownSettings::default(),
        projects: default_projects(root),
    }
}

/// Validate the configuration and return `Result<()>` with field-path errors
pub fn validate(config: &LaunchConfig) -> Result<()> {
    if config.projects.is_empty() {
        return Err(CoreError::ValidationError(
            "projects: must contain at least one project".to_string(),
        ));
    }

    if config.launch.prelaunch_timeout_secs == 0 {
        return Err(CoreError::ValidationError(
            "launch.prelaunchTimeoutSecs: must be > 0".to_string(),
        ));
    }

    let s = &config.shutdown;
    if s.grace_secs == 0 {
        return Err(CoreError::ValidationError(
            "shutdown.graceSecs: must be > 0".to_string(),
        ));
    }
    if s.poll_interval_ms == 0 {
        return Err(CoreError::ValidationError(
            "shutdown.pollIntervalMs: must be > 0".to_string(),
        ));
    }

    let mut ports: HashMap<u16, usize> = HashMap::new();
    for (i, project) in config.projects.iter().enumerate() {
        if project.path.as_os_str().is_empty() {
            return Err(CoreError::ValidationError(format!(
                "projects[{}].path: cannot be empty",
                i
            )));
        }
        if let Some(name) = &project.name {
            if name.trim().is_empty() {
                return Err(CoreError::ValidationError(format!(
                    "projects[{}].name: cannot be blank",
                    i
                )));
            }
        }
        if let Some(port) = project.port {
            if port == 0 {
                return Err(CoreError::ValidationError(format!(
                    "projects[{}].port: must be 1..=65535",
                    i
                )));
            }
            if let Some(first) = ports.insert(port, i) {
                return Err(CoreError::ValidationError(format!(
                    "projects[{}].port: {} already used by projects[{}]",
                    i, port, first
                )));
            }
        }
        match project.kind {
            ProcessKind::Command => {
                if project.command.first().map_or(true, |p| p.trim().is_empty()) {
                    return Err(CoreError::ValidationError(format!(
                        "projects[{}].command: required for kind 'command'",
                        i
                    )));
                }
            }
            ProcessKind::JavaMaven => {
                if project.artifact.is_none() {
                    return Err(CoreError::ValidationError(format!(
                        "projects[{}].artifact: required for kind 'java:maven'",
                        i
                    )));
                }
            }
            ProcessKind::PythonUvicorn => {
                if project.port.is_none() {
                    return Err(CoreError::ValidationError(format!(
                        "projects[{}].port: required for kind 'python:uvicorn'",
                        i
                    )));
                }
            }
            ProcessKind::Go | ProcessKind::SpringBoot | ProcessKind::JavaGradle => {}
        }
    }
    Ok(())
}

/// Join relative project paths onto `base`
pub fn resolve_paths(config: &mut LaunchConfig, base: &Path) {
    for project in &mut config.projects {
        if project.path.is_relative() {
            project.path = base.join(&project.path);
        }
    }
}

/// Load a launch configuration from a TOML file path
///
/// Relative project paths are resolved against the file's directory.
pub fn load_config_from_toml_path(path: impl AsRef<Path>) -> Result<LaunchConfig> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).map_err(|e| {
        CoreError::ConfigurationError(format!("Failed to read config {:?}: {}", path, e))
    })?;
    let mut cfg = parse_config(&data)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    resolve_paths(&mut cfg, base);
    validate(&cfg)?;
    Ok(cfg)
}

/// Load a launch configuration from a TOML string
///
/// Relative project paths are left untouched.
pub fn load_config_from_toml_str(input: &str) -> Result<LaunchConfig> {
    let cfg = parse_config(input)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn parse_config(input: &str) -> Result<LaunchConfig> {
    toml::from_str(input)
        .map_err(|e| CoreError::ConfigurationError(format!("TOML parse error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn valid_config() -> String {
        r#"
        [shutdown]
        graceSecs = 5

        [[projects]]
        path = "Employees_JSON"
        kind = "python:uvicorn"
        port = 8001

        [[projects]]
        path = "Healthcare_XML"
        kind = "java:maven"
        port = 8082
        artifact = "target/patient-soap-1.0.0.jar"

        [[projects]]
        path = "tools/mock"
        kind = "command"
        command = ["node", "server.js"]
        name = "mock-api"
        "#
        .to_string()
    }

    #[test]
    fn parses_and_validates_valid_config() {
        let cfg = load_config_from_toml_str(&valid_config()).expect("should parse");
        assert_eq!(cfg.projects.len(), 3);
        assert_eq!(cfg.shutdown.grace_secs, 5);
        assert_eq!(cfg.shutdown.kill_wait_secs, 2);
        assert_eq!(cfg.launch.prelaunch_timeout_secs, 600);
        assert_eq!(cfg.projects[0].kind, ProcessKind::PythonUvicorn);
        assert_eq!(cfg.projects[1].artifact, Some(PathBuf::from("target/patient-soap-1.0.0.jar")));
        assert_eq!(cfg.projects[2].display_name(), "mock-api");
    }

    #[test]
    fn errors_on_empty_projects() {
        let err = load_config_from_toml_str("projects = []").unwrap_err();
        assert!(format!("{}", err).contains("projects: must contain at least one project"));
    }

    #[test]
    fn errors_on_unknown_kind() {
        let input = r#"
        [[projects]]
        path = "x"
        kind = "ruby:rails"
        "#;
        let err = load_config_from_toml_str(input).unwrap_err();
        assert!(matches!(err, CoreError::ConfigurationError(_)));
    }

    #[test]
    fn errors_on_duplicate_ports() {
        let input = r#"
        [[projects]]
        path = "a"
        kind = "go"
        port = 8001
        [[projects]]
        path = "b"
        kind = "java:spring-boot"
        port = 8001
        "#;
        let err = load_config_from_toml_str(input).unwrap_err();
        assert!(format!("{}", err).contains("projects[1].port: 8001 already used by projects[0]"));
    }

    #[test]
    fn errors_on_zero_port_and_zero_grace() {
        let input = r#"
        [[projects]]
        path = "a"
        kind = "go"
        port = 0
        "#;
        let err = load_config_from_toml_str(input).unwrap_err();
        assert!(format!("{}", err).contains("projects[0].port"));

        let input = r#"
        [shutdown]
        graceSecs = 0
        [[projects]]
        path = "a"
        kind = "go"
        "#;
        let err = load_config_from_toml_str(input).unwrap_err();
        assert!(format!("{}", err).contains("shutdown.graceSecs"));
    }

    #[test]
    fn prelaunch_timeout_is_configurable_and_positive() {
        let input = r#"
        [launch]
        prelaunchTimeoutSecs = 90
        [[projects]]
        path = "a"
        kind = "go"
        "#;
        let cfg = load_config_from_toml_str(input).expect("should parse");
        assert_eq!(cfg.launch.prelaunch_timeout_secs, 90);

        let err = load_config_from_toml_str(&input.replace("90", "0")).unwrap_err();
        assert!(format!("{}", err).contains("launch.prelaunchTimeoutSecs"));
    }

    #[test]
    fn errors_on_missing_kind_specific_fields() {
        let cmd = "[[projects]]\npath = \"a\"\nkind = \"command\"\n";
        assert!(format!("{}", load_config_from_toml_str(cmd).unwrap_err()).contains("command"));

        let mvn = "[[projects]]\npath = \"a\"\nkind = \"java:maven\"\n";
        assert!(format!("{}", load_config_from_toml_str(mvn).unwrap_err()).contains("artifact"));

        let py = "[[projects]]\npath = \"a\"\nkind = \"python:uvicorn\"\n";
        assert!(format!("{}", load_config_from_toml_str(py).unwrap_err()).contains("port"));
    }

    #[test]
    fn path_loading_resolves_relative_projects() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let file = tmp.path().join("marshal.toml");
        fs::write(&file, valid_config()).unwrap();

        let cfg = load_config_from_toml_path(&file).expect("load");
        assert_eq!(cfg.projects[0].path, tmp.path().join("Employees_JSON"));
        assert_eq!(cfg.projects[2].path, tmp.path().join("tools/mock"));
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let err = load_config_from_toml_path("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, CoreError::ConfigurationError(_)));
    }

    #[test]
    fn default_config_is_valid_and_ordered() {
        let cfg = default_config(Path::new("/srv/providers"));
        validate(&cfg).expect("built-in list validates");
        let ports: Vec<_> = cfg.projects.iter().filter_map(|p| p.port).collect();
        assert_eq!(ports, vec![8081, 8082, 8001, 8002, 8003, 8004, 8084, 8085]);
        assert_eq!(cfg.projects[0].display_name(), "National_Weather_XML");
    }
}
