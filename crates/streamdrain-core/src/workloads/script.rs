//! External insert script workload.
//!
//! Runs `<shell> <script> <count>` and waits for it to exit. Stdout and stderr
//! are captured and kept as one block of text for diagnostics; nothing in
//! them is parsed.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::Instant;

use crate::error::{Result, StreamError};
use crate::traits::{WorkloadGenerator, WorkloadReport};

pub const DEFAULT_SHELL: &str = "/bin/bash";
pub const DEFAULT_SCRIPT: &str = "./scripts/insert_named_employees.sh";

/// Workload generator backed by an external script.
#[derive(Debug, Clone)]
pub struct ScriptWorkload {
    name: String,
    shell: PathBuf,
    script: PathBuf,
    working_dir: Option<PathBuf>,
}

impl ScriptWorkload {
    pub fn new(name: &str, shell: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            shell: shell.into(),
            script: script.into(),
            working_dir: None,
        }
    }

    /// Run the script from `dir` instead of the current directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    pub fn shell(&self) -> &Path {
        &self.shell
    }
}

impl Default for ScriptWorkload {
    fn default() -> Self {
        Self::new("insert-script", DEFAULT_SHELL, DEFAULT_SCRIPT)
    }
}

/// Stdout followed by stderr, lossily decoded.
fn combined_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut output = String::from_utf8_lossy(stdout).into_owned();
    if !stderr.is_empty() {
        if !output.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }
        output.push_str(&String::from_utf8_lossy(stderr));
    }
    output
}

#[async_trait]
impl WorkloadGenerator for ScriptWorkload {
    async fn generate(&self, count: u64) -> Result<WorkloadReport> {
        tracing::info!(
            generator = %self.name,
            script = %self.script.display(),
            count,
            "running insert script"
        );

        let mut command = Command::new(&self.shell);
        command
            .arg(&self.script)
            .arg(count.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let start = Instant::now();
        let output = command.output().await.map_err(|e| {
            StreamError::WorkloadGenerationFailed {
                reason: format!(
                    "failed to run {} {}: {}",
                    self.shell.display(),
                    self.script.display(),
                    e
                ),
                output: String::new(),
            }
        })?;
        let elapsed = start.elapsed();

        let report = WorkloadReport {
            requested: count,
            elapsed,
            output: combined_output(&output.stdout, &output.stderr),
            exit_code: output.status.code(),
            success: output.status.success(),
        };

        if report.success {
            tracing::info!(
                generator = %self.name,
                count,
                elapsed_ms = elapsed.as_millis() as u64,
                "insert script finished"
            );
        } else {
            tracing::error!(
                generator = %self.name,
                exit_code = ?report.exit_code,
                "insert script failed"
            );
        }
        Ok(report)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn script_file(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", body).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let workload = ScriptWorkload::default();
        assert_eq!(workload.shell(), Path::new("/bin/bash"));
        assert_eq!(
            workload.script(),
            Path::new("./scripts/insert_named_employees.sh")
        );
        assert_eq!(workload.name(), "insert-script");
    }

    #[test]
    fn test_combined_output() {
        assert_eq!(combined_output(b"out\n", b""), "out\n");
        assert_eq!(combined_output(b"out", b"err\n"), "out\nerr\n");
        assert_eq!(combined_output(b"", b"err"), "err");
    }

    #[tokio::test]
    async fn test_successful_script_passes_count() {
        let file = script_file(r#"echo "inserting $1 rows""#);
        let workload = ScriptWorkload::new("test", "/bin/sh", file.path());

        let report = workload.generate(250).await.unwrap();
        assert!(report.success);
        assert_eq!(report.exit_code, Some(0));
        assert_eq!(report.requested, 250);
        assert!(report.output.contains("inserting 250 rows"));
    }

    #[tokio::test]
    async fn test_failing_script_reports_output() {
        let file = script_file("echo 'connection refused' >&2\nexit 3");
        let workload = ScriptWorkload::new("test", "/bin/sh", file.path());

        let report = workload.generate(10).await.unwrap();
        assert!(!report.success);
        assert_eq!(report.exit_code, Some(3));
        assert!(report.output.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_missing_shell_is_generation_failure() {
        let workload = ScriptWorkload::new("test", "/nonexistent/shell", "script.sh");
        let err = workload.generate(1).await.unwrap_err();
        assert!(matches!(err, StreamError::WorkloadGenerationFailed { .. }));
    }

    #[tokio::test]
    async fn test_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("insert.sh"), "echo ok").unwrap();

        let workload =
            ScriptWorkload::new("test", "/bin/sh", "insert.sh").with_working_dir(dir.path());
        let report = workload.generate(1).await.unwrap();
        assert!(report.success, "output: {}", report.output);
        assert!(report.output.contains("ok"));
    }
}
