//! Shell tool: run an allowlisted command inside the workspace.
//!
//! Only a single command is accepted. Chaining, redirection, pipes and
//! substitution are refused before anything is spawned.

use crate::workspace::truncate;
use async_trait::async_trait;
use lokal_core::error::ToolError;
use lokal_core::tool::{Tool, ToolResult};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

const FORBIDDEN_TOKENS: &[&str] = &["&&", "||", ";", ">", "<", "|", "%", "`", "$("];

pub struct ShellExecTool {
    /// If non-empty, only these base commands are allowed.
    allowed_commands: Vec<String>,
    workspace: PathBuf,
    timeout: Duration,
    max_output_chars: usize,
}

impl ShellExecTool {
    pub fn new(
        allowed_commands: Vec<String>,
        workspace: impl Into<PathBuf>,
        timeout: Duration,
        max_output_chars: usize,
    ) -> Self {
        Self {
            allowed_commands,
            workspace: workspace.into(),
            timeout,
            max_output_chars,
        }
    }

    fn check_command(&self, command: &str) -> Result<(), String> {
        if let Some(token) = FORBIDDEN_TOKENS.iter().find(|t| command.contains(**t)) {
            return Err(format!("Forbidden token '{token}' in command"));
        }

        if self.allowed_commands.is_empty() {
            return Ok(());
        }

        let base_cmd = command.split_whitespace().next().unwrap_or("").trim();
        if self.allowed_commands.iter().any(|a| a == base_cmd) {
            Ok(())
        } else {
            Err(format!("Command '{base_cmd}' not in allowlist"))
        }
    }
}

#[async_trait]
impl Tool for ShellExecTool {
    fn name(&self) -> &str {
        "shell_exec"
    }

    fn description(&self) -> &str {
        "Run a single read-only shell command (ls, cat, grep, git, ...) in the workspace and return stdout/stderr."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolResult, ToolError> {
        let command = arguments
            .get("command")
            .or_else(|| arguments.get("query"))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        self.check_command(command)
            .map_err(|reason| ToolError::PermissionDenied { tool_name: "shell_exec".into(), reason })?;

        debug!(command = %command, "Executing shell command");

        let child = Command::new("sh")
            .args(["-c", command])
            .current_dir(&self.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "shell_exec".into(),
                reason: e.to_string(),
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "shell_exec".into(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ToolError::Timeout {
                    tool_name: "shell_exec".into(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let success = output.status.success();

        let result_text = if success {
            if stderr.is_empty() {
                stdout
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            }
        } else {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            format!("[exit code: {code}]\n{stdout}\n{stderr}")
        };

        let text = truncate(result_text.trim(), self.max_output_chars);
        Ok(if success { ToolResult::ok(text) } else { ToolResult::failed(text) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn tool(allowed: &[&str], dir: &std::path::Path) -> ShellExecTool {
        ShellExecTool::new(
            allowed.iter().map(|s| s.to_string()).collect(),
            dir,
            Duration::from_secs(15),
            4000,
        )
    }

    #[test]
    fn allowlist_check() {
        let tool = tool(&["ls", "cat", "git"], std::path::Path::new("."));
        assert!(tool.check_command("ls -la").is_ok());
        assert!(tool.check_command("git status").is_ok());
        assert!(tool.check_command("rm -rf /").is_err());
        assert!(tool.check_command("sudo something").is_err());
    }

    #[test]
    fn chaining_is_refused_even_without_allowlist() {
        let tool = tool(&[], std::path::Path::new("."));
        assert!(tool.check_command("anything goes").is_ok());
        for cmd in ["ls && rm x", "ls; rm x", "cat a | sh", "echo $(id)", "echo `id`", "echo hi > f"] {
            assert!(tool.check_command(cmd).is_err(), "{cmd} should be refused");
        }
    }

    #[tokio::test]
    async fn execute_echo_in_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let result = tool(&["echo", "ls"], dir.path())
            .execute(args(serde_json::json!({"command": "ls"})))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("marker.txt"));
    }

    #[tokio::test]
    async fn blocked_command() {
        let dir = tempfile::tempdir().unwrap();
        let err = tool(&["ls"], dir.path())
            .execute(args(serde_json::json!({"command": "rm -rf /"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn failing_command_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let result = tool(&["cat"], dir.path())
            .execute(args(serde_json::json!({"command": "cat missing.txt"})))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.starts_with("[exit code: 1]"));
    }
}
