//! Centralized command execution with consistent error handling.
//!
//! Every external tool the pipeline drives (tar, patchelf, ldd, the
//! filesystem formatters, skopeo) goes through [`Cmd`]. Calls are blocking,
//! output is captured in full, and a non-zero exit becomes
//! [`SysextError::ExternalTool`] carrying the tool's diagnostics verbatim.

use std::path::Path;
use std::process::{Command, ExitStatus};

use crate::error::{Result, SysextError};
use crate::oplog::OpsLog;

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit status of the command.
    pub status: ExitStatus,
    /// Captured stdout as a string.
    pub stdout: String,
    /// Captured stderr as a string.
    pub stderr: String,
}

impl CommandResult {
    /// Returns true if the command exited successfully.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Get the exit code, or -1 if terminated by signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    /// Stdout followed by stderr, trimmed. What the user sees on failure.
    pub fn combined_output(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, _) => stderr.to_string(),
            (false, true) => stdout.to_string(),
            (false, false) => format!("{}\n{}", stdout, stderr),
        }
    }
}

/// Builder for configuring command execution.
pub struct Cmd<'a> {
    program: String,
    args: Vec<String>,
    ops: Option<&'a OpsLog>,
}

impl<'a> Cmd<'a> {
    /// Create a new command builder.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            ops: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Record the command line in the operations log before running it.
    pub fn record(mut self, ops: &'a OpsLog) -> Self {
        self.ops = Some(ops);
        self
    }

    /// The command line as it would be typed in a shell.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run the command and capture output.
    pub fn run(self) -> Result<CommandResult> {
        let line = self.command_line();
        tracing::debug!(command = %line, "Running external tool");
        if let Some(ops) = self.ops {
            ops.record(&line);
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        let output = cmd.output().map_err(|e| SysextError::ExternalTool {
            tool: self.program.clone(),
            code: -1,
            output: format!("failed to execute: {}. Is it installed?", e),
        })?;

        let result = CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() {
            tracing::error!(
                command = %line,
                code = result.code(),
                "External tool failed"
            );
            return Err(SysextError::ExternalTool {
                tool: self.program,
                code: result.code(),
                output: result.combined_output(),
            });
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_success() {
        let result = Cmd::new("echo").arg("hello").run().unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[test]
    fn test_run_failure_carries_output() {
        let err = Cmd::new("ls")
            .arg("/nonexistent_path_12345")
            .run()
            .unwrap_err();

        match err {
            SysextError::ExternalTool { tool, code, output } => {
                assert_eq!(tool, "ls");
                assert_ne!(code, 0);
                assert!(output.contains("nonexistent_path_12345"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_program_is_external_tool_failure() {
        let err = Cmd::new("nonexistent_program_12345").run().unwrap_err();
        assert!(matches!(err, SysextError::ExternalTool { code: -1, .. }));
    }

    #[test]
    fn test_command_is_recorded() {
        let temp = TempDir::new().unwrap();
        let ops = OpsLog::to_file(temp.path().join("ops.log"));

        Cmd::new("echo")
            .args(["one", "two"])
            .record(&ops)
            .run()
            .unwrap();

        let log = std::fs::read_to_string(temp.path().join("ops.log")).unwrap();
        assert_eq!(log.trim(), "echo one two");
    }

    #[test]
    fn test_combined_output_joins_streams() {
        let result = Cmd::new("sh")
            .args(["-c", "echo out; echo err >&2"])
            .run()
            .unwrap();
        assert_eq!(result.combined_output(), "out\nerr");
    }
}
