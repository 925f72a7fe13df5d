//! Shell tool: execute system commands.
//!
//! Supports command allowlisting and a wall-clock timeout. Outcomes are
//! framed as `SUCCESS`/`ERROR` observations with labelled stdout/stderr.

use async_trait::async_trait;
use ponder_core::error::ToolError;
use ponder_core::tool::{Tool, ToolResult, string_argument};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Execute shell commands with safety constraints.
pub struct ShellTool {
    /// If non-empty, only these commands are allowed.
    allowed_commands: Vec<String>,
    timeout: Duration,
}

impl ShellTool {
    pub fn new(allowed_commands: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            allowed_commands,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        if self.allowed_commands.is_empty() {
            return true; // No allowlist = all commands allowed
        }

        // Extract the base command (first word)
        let base_cmd = command
            .split_whitespace()
            .next()
            .unwrap_or("")
            .trim();

        self.allowed_commands.iter().any(|a| a == base_cmd)
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "run_shell_command"
    }

    fn description(&self) -> &str {
        "Executes a shell command (e.g. 'ls -l', 'python my_script.py') on the local machine \
         and returns its stdout and stderr. Input: the command line as plain text."
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let command = string_argument(&arguments, "command")
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        if !self.is_command_allowed(&command) {
            return Err(ToolError::PermissionDenied {
                tool_name: self.name().into(),
                reason: format!(
                    "Command '{}' not in allowlist",
                    command.split_whitespace().next().unwrap_or("")
                ),
            });
        }

        debug!(command = %command, timeout_secs = self.timeout.as_secs(), "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", &command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", &command]);
            c
        };
        cmd.kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?,
            Err(_) => {
                warn!(command = %command, "Command timed out");
                return Ok(ToolResult::failed(format!(
                    "ERROR: Command timed out after {} seconds.",
                    self.timeout.as_secs()
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            return Ok(ToolResult::failed(format!(
                "ERROR: Command failed with exit code {code}.\n[STDOUT]:\n{stdout}\n[STDERR]:\n{stderr}"
            )));
        }

        let text = match (stdout.is_empty(), stderr.is_empty()) {
            (false, false) => format!("SUCCESS:\n[STDOUT]:\n{stdout}\n[STDERR]:\n{stderr}"),
            (false, true) => format!("SUCCESS:\n[STDOUT]:\n{stdout}"),
            (true, false) => format!("SUCCESS (No STDOUT):\n[STDERR]:\n{stderr}"),
            (true, true) => "SUCCESS: Command ran with no output to STDOUT or STDERR.".into(),
        };

        Ok(ToolResult::ok(text))
    }
}
