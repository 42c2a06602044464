//! Per-launch output capture
//!
//! Every launch attempt gets a pair of append-only files under the project's
//! `logs/` directory:
//!
//! ```text
//! <working_dir>/logs/<sanitized-name>-<YYYYmmdd-HHMMSS>.out
//! <working_dir>/logs/<sanitized-name>-<YYYYmmdd-HHMMSS>.err
//! ```
//!
//! The sink owns both handles until [`LogSink::close`] consumes it.

use crate::{CoreError, Result};
use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::debug;

/// Directory, relative to the working directory, that holds the log files
pub const LOG_DIR_NAME: &str = "logs";

/// Timestamp format used in log file names
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Turn a project name into something safe to use in a file name
///
/// Anything other than ASCII alphanumerics, `-`, `_` and `.` becomes `_`.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "project".to_string()
    } else {
        cleaned
    }
}

/// Open stdout/stderr log files for one launched process
#[derive(Debug)]
pub struct LogSink {
    stdout: File,
    stderr: File,
    stdout_path: PathBuf,
    stderr_path: PathBuf,
}

impl LogSink {
    /// Create `<working_dir>/logs` if needed and open both files in append mode
    pub fn open(working_dir: &Path, project: &str, started_at: DateTime<Local>) -> Result<Self> {
        let logs_dir = working_dir.join(LOG_DIR_NAME);
        fs::create_dir_all(&logs_dir).map_err(|e| {
            CoreError::InitializationError(format!(
                "Failed to create log directory {}: {}",
                logs_dir.display(),
                e
            ))
        })?;

        let stem = format!(
            "{}-{}",
            sanitize_name(project),
            started_at.format(LOG_TIMESTAMP_FORMAT)
        );
        let stdout_path = logs_dir.join(format!("{stem}.out"));
        let stderr_path = logs_dir.join(format!("{stem}.err"));

        let stdout = open_append(&stdout_path)?;
        let stderr = open_append(&stderr_path)?;
        debug!("Opened log sink {}", logs_dir.join(&stem).display());

        Ok(Self {
            stdout,
            stderr,
            stdout_path,
            stderr_path,
        })
    }

    /// Path of the stdout file
    pub fn stdout_path(&self) -> &Path {
        &self.stdout_path
    }

    /// Path of the stderr file
    pub fn stderr_path(&self) -> &Path {
        &self.stderr_path
    }

    /// Duplicate both handles for redirecting a child's output
    pub fn stdio(&self) -> Result<(Stdio, Stdio)> {
        Ok((
            Stdio::from(self.stdout.try_clone()?),
            Stdio::from(self.stderr.try_clone()?),
        ))
    }

    /// Flush both files to disk and release the handles
    ///
    /// The handles are released even when syncing fails; the error is only
    /// reported so the caller can log it.
    pub fn close(self) -> Result<()> {
        let LogSink {
            stdout,
            stderr,
            stdout_path,
            stderr_path,
        } = self;

        let mut failures = Vec::new();
        if let Err(e) = stdout.sync_all() {
            failures.push(format!("{}: {}", stdout_path.display(), e));
        }
        drop(stdout);
        if let Err(e) = stderr.sync_all() {
            failures.push(format!("{}: {}", stderr_path.display(), e));
        }
        drop(stderr);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CoreError::ResourceRelease(failures.join("; ")))
        }
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            CoreError::InitializationError(format!("Failed to open {}: {}", path.display(), e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn fixed_time() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2025, 3, 14, 9, 26, 53)
            .single()
            .expect("unambiguous local time")
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Employees_JSON"), "Employees_JSON");
        assert_eq!(sanitize_name("my project"), "my_project");
        assert_eq!(sanitize_name("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize_name("  "), "project");
        assert_eq!(sanitize_name(".."), "project");
    }

    #[test]
    fn test_open_creates_logs_dir_and_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let sink = LogSink::open(tmp.path(), "Warehouse YAML", fixed_time()).expect("open");

        assert_eq!(
            sink.stdout_path(),
            tmp.path().join("logs/Warehouse_YAML-20250314-092653.out")
        );
        assert_eq!(
            sink.stderr_path(),
            tmp.path().join("logs/Warehouse_YAML-20250314-092653.err")
        );
        assert!(sink.stdout_path().exists());
        assert!(sink.stderr_path().exists());
        sink.close().expect("close");
    }

    #[test]
    fn test_open_is_idempotent_and_appends() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = {
            let sink = LogSink::open(tmp.path(), "svc", fixed_time()).expect("first open");
            let mut out = sink.stdout.try_clone().expect("clone");
            out.write_all(b"first\n").expect("write");
            let path = sink.stdout_path().to_path_buf();
            sink.close().expect("close");
            path
        };

        let sink = LogSink::open(tmp.path(), "svc", fixed_time()).expect("second open");
        let mut out = sink.stdout.try_clone().expect("clone");
        out.write_all(b"second\n").expect("write");
        drop(out);
        sink.close().expect("close");

        let contents = fs::read_to_string(path).expect("read");
        assert_eq!(contents, "first\nsecond\n");
    }

    #[test]
    fn test_open_fails_when_logs_path_is_a_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(tmp.path().join(LOG_DIR_NAME), b"not a dir").expect("write");
        let err = LogSink::open(tmp.path(), "svc", fixed_time()).unwrap_err();
        assert!(matches!(err, CoreError::InitializationError(_)));
    }
}
