//! JSON round-trip tests for schema types
//!
//! These tests pin the wire names used by configuration files and reports
//! so that renaming a Rust item does not silently change the format.

use crate::project::*;
use crate::report::*;
use schemars::schema_for;

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper to test JSON round-trip for any serializable type
    fn test_json_roundtrip<T>(original: &T)
    where
        T: serde::Serialize + serde::de::DeserializeOwned + PartialEq + std::fmt::Debug,
    {
        let json = serde_json::to_string(original).expect("Failed to serialize to JSON");
        let deserialized: T = serde_json::from_str(&json).expect("Failed to deserialize from JSON");
        assert_eq!(*original, deserialized, "Round-trip failed for JSON: {}", json);
    }

    #[test]
    fn test_process_kind_tags() {
        let cases = [
            (ProcessKind::Go, "\"go\""),
            (ProcessKind::JavaMaven, "\"java:maven\""),
            (ProcessKind::JavaGradle, "\"java:gradle\""),
            (ProcessKind::SpringBoot, "\"java:spring-boot\""),
            (ProcessKind::PythonUvicorn, "\"python:uvicorn\""),
            (ProcessKind::Command, "\"command\""),
        ];
        for (kind, expected) in cases {
            assert_eq!(serde_json::to_string(&kind).unwrap(), expected);
            assert_eq!(format!("\"{}\"", kind), expected);
        }
    }

    #[test]
    fn test_descriptor_omits_unset_fields() {
        let descriptor = ProjectDescriptor::new("Employees_JSON", ProcessKind::PythonUvicorn);
        let json = serde_json::to_value(&descriptor).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj["kind"], "python:uvicorn");
    }

    #[test]
    fn test_descriptor_roundtrip() {
        let descriptor = ProjectDescriptor::new("Healthcare_XML", ProcessKind::JavaMaven)
            .with_port(8082)
            .with_artifact("target/patient-soap-1.0.0.jar")
            .with_name("healthcare");
        test_json_roundtrip(&descriptor);
    }

    #[test]
    fn test_display_name_fallbacks() {
        let named = ProjectDescriptor::new("/srv/a", ProcessKind::Go).with_name("alpha");
        assert_eq!(named.display_name(), "alpha");

        let blank = ProjectDescriptor::new("/srv/Transport_CSV", ProcessKind::Go).with_name("  ");
        assert_eq!(blank.display_name(), "Transport_CSV");

        let root = ProjectDescriptor::new("/", ProcessKind::Go);
        assert_eq!(root.display_name(), "project");
    }

    #[test]
    fn test_shutdown_settings_defaults_from_empty_object() {
        let settings: ShutdownSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, ShutdownSettings::default());
        assert_eq!(settings.grace().as_secs(), 3);
        assert_eq!(settings.poll_interval().as_millis(), 100);
    }

    #[test]
    fn test_launch_settings_default_when_section_missing() {
        let config: LaunchConfig = serde_json::from_str(r#"{"projects": []}"#).unwrap();
        assert_eq!(config.launch, LaunchSettings::default());
        assert_eq!(config.launch.prelaunch_timeout().as_secs(), 600);

        let launch: LaunchSettings =
            serde_json::from_str(r#"{"prelaunchTimeoutSecs": 45}"#).unwrap();
        assert_eq!(launch.prelaunch_timeout_secs, 45);
    }

    #[test]
    fn test_sweep_outcome_is_internally_tagged() {
        let killed = SweepOutcome::Killed { pids: vec![41, 42] };
        let json = serde_json::to_value(&killed).unwrap();
        assert_eq!(json["status"], "killed");
        assert_eq!(json["pids"], serde_json::json!([41, 42]));
        test_json_roundtrip(&SweepOutcome::Unavailable);
    }

    #[test]
    fn test_teardown_report_helpers() {
        let mut report = TeardownReport::default();
        assert!(report.is_empty());
        assert!(report.all_sinks_closed());

        report.records.push(RecordReport {
            project: "a".to_string(),
            pid: 10,
            outcome: TerminationOutcome::Killed,
            sinks_closed: true,
            warnings: vec!["graceful signal failed".to_string()],
        });
        report.warnings.push("port discovery unavailable".to_string());

        assert!(!report.is_empty());
        assert_eq!(report.warning_count(), 2);
        test_json_roundtrip(&report);
    }

    #[test]
    fn test_supervisor_state_helpers() {
        assert!(!SupervisorState::Idle.is_shutting_down());
        assert!(!SupervisorState::Running.is_shutting_down());
        assert!(SupervisorState::Draining.is_shutting_down());
        assert!(SupervisorState::Terminated.is_shutting_down());
    }

    #[test]
    fn test_launch_config_schema_generation() {
        let schema = schema_for!(LaunchConfig);
        let json = serde_json::to_string(&schema).expect("schema serializes");
        assert!(json.contains("projects"));
        assert!(json.contains("java:spring-boot"));
        assert!(json.contains("graceSecs"));
    }
}
