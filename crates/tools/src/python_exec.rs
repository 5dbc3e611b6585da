//! Python execution tool.
//!
//! Runs a snippet with the configured interpreter inside the workspace.
//! Figures left open by matplotlib are saved to `artifacts/`, and the newest
//! image produced by the run is reported with an `[IMAGE_GENERATED]:` line.

use crate::workspace::truncate;
use async_trait::async_trait;
use lokal_core::error::ToolError;
use lokal_core::tool::{IMAGE_MARKER, Tool, ToolResult};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime};
use tokio::process::Command;
use tracing::{debug, warn};

const ARTIFACT_DIR: &str = "artifacts";

const WRAPPER: &str = r#"
import os, sys, uuid
_code = sys.argv[1]
exec(compile(_code, "<snippet>", "exec"), {"__name__": "__main__"})
if "matplotlib.pyplot" in sys.modules:
    _plt = sys.modules["matplotlib.pyplot"]
    _dir = os.environ.get("LOKAL_ARTIFACT_DIR", "artifacts")
    os.makedirs(_dir, exist_ok=True)
    for _num in _plt.get_fignums():
        _plt.figure(_num).savefig(os.path.join(_dir, "plot_%s.png" % uuid.uuid4().hex[:8]))
    _plt.close("all")
"#;

pub struct PythonExecTool {
    python_bin: String,
    workspace: PathBuf,
    timeout: Duration,
    max_output_chars: usize,
}

impl PythonExecTool {
    pub fn new(
        python_bin: impl Into<String>,
        workspace: impl Into<PathBuf>,
        timeout: Duration,
        max_output_chars: usize,
    ) -> Self {
        Self {
            python_bin: python_bin.into(),
            workspace: workspace.into(),
            timeout,
            max_output_chars,
        }
    }

    fn artifact_dir(&self) -> PathBuf {
        self.workspace.join(ARTIFACT_DIR)
    }
}

/// Strip a surrounding markdown fence the model may have left on the code.
fn strip_fence(code: &str) -> &str {
    let trimmed = code.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

async fn list_images(dir: &Path) -> HashSet<PathBuf> {
    let mut found = HashSet::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return found;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg" | "svg"));
        if is_image {
            found.insert(path);
        }
    }
    found
}

async fn newest(paths: impl Iterator<Item = &PathBuf>) -> Option<PathBuf> {
    let mut best: Option<(SystemTime, PathBuf)> = None;
    for path in paths {
        let modified = tokio::fs::metadata(path)
            .await
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        if best.as_ref().is_none_or(|(t, _)| modified >= *t) {
            best = Some((modified, path.clone()));
        }
    }
    best.map(|(_, p)| p)
}

#[async_trait]
impl Tool for PythonExecTool {
    fn name(&self) -> &str {
        "python_exec"
    }

    fn description(&self) -> &str {
        "Execute Python code in the workspace and return its printed output. Use print() to show results. matplotlib figures are saved automatically."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Python source to execute"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolResult, ToolError> {
        let raw = arguments
            .get("code")
            .or_else(|| arguments.get("query"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'code' argument".into()))?;
        let code = strip_fence(raw);
        if code.is_empty() {
            return Err(ToolError::InvalidArguments("Code is empty".into()));
        }

        let artifacts = self.artifact_dir();
        tokio::fs::create_dir_all(&artifacts)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "python_exec".into(),
                reason: format!("cannot prepare workspace: {e}"),
            })?;
        let before = list_images(&artifacts).await;

        debug!(chars = code.len(), "Executing python snippet");

        let child = Command::new(&self.python_bin)
            .arg("-c")
            .arg(WRAPPER)
            .arg(code)
            .current_dir(&self.workspace)
            .env("MPLBACKEND", "Agg")
            .env("LOKAL_ARTIFACT_DIR", &artifacts)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "python_exec".into(),
                reason: format!("cannot start '{}': {e}", self.python_bin),
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "python_exec".into(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ToolError::Timeout {
                    tool_name: "python_exec".into(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let success = output.status.success();

        let mut text = if success {
            match (stdout.is_empty(), stderr.is_empty()) {
                (true, true) => "Code executed successfully.".to_string(),
                (false, true) => stdout,
                (true, false) => stderr,
                (false, false) => format!("{stdout}\n[stderr]: {stderr}"),
            }
        } else {
            warn!(exit_code = output.status.code().unwrap_or(-1), "Python snippet failed");
            format!("{stdout}\n{stderr}").trim().to_string()
        };
        text = truncate(&text, self.max_output_chars);

        let after = list_images(&artifacts).await;
        let created: Vec<PathBuf> = after.difference(&before).cloned().collect();
        let image = newest(created.iter()).await;
        if let Some(path) = &image {
            text.push_str(&format!("\n{IMAGE_MARKER} {}", path.display()));
        }

        let result = if success { ToolResult::ok(text) } else { ToolResult::failed(text) };
        Ok(result.with_data(serde_json::json!({
            "exit_code": output.status.code(),
            "image": image.map(|p| p.display().to_string()),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn tool(dir: &Path) -> PythonExecTool {
        PythonExecTool::new("python3", dir, Duration::from_secs(20), 4000)
    }

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_fence("```python\nprint(1)\n```"), "print(1)");
        assert_eq!(strip_fence("```\nx = 2\n```"), "x = 2");
        assert_eq!(strip_fence("  print(3)  "), "print(3)");
    }

    #[tokio::test]
    async fn missing_code_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let err = tool(dir.path()).execute(args(serde_json::json!({}))).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn prints_are_returned() {
        if !python_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let result = tool(dir.path())
            .execute(args(serde_json::json!({"code": "print(6 * 7)"})))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "42");
    }

    #[tokio::test]
    async fn silent_code_reports_success() {
        if !python_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let result = tool(dir.path())
            .execute(args(serde_json::json!({"query": "x = 1"})))
            .await
            .unwrap();
        assert_eq!(result.output, "Code executed successfully.");
    }

    #[tokio::test]
    async fn exceptions_are_failed_results() {
        if !python_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let result = tool(dir.path())
            .execute(args(serde_json::json!({"code": "raise ValueError('bad input')"})))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("ValueError: bad input"));
    }

    #[tokio::test]
    async fn saved_images_are_marked() {
        if !python_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let code = "open('artifacts/chart.png', 'wb').write(b'png')\nprint('saved')";
        let result = tool(dir.path())
            .execute(args(serde_json::json!({"code": code})))
            .await
            .unwrap();
        let (text, image) = lokal_core::tool::split_artifact(&result.output);
        assert_eq!(text, "saved");
        assert!(image.unwrap().ends_with("chart.png"));
    }

    #[tokio::test]
    async fn long_output_is_truncated() {
        if !python_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let result = PythonExecTool::new("python3", dir.path(), Duration::from_secs(20), 10)
            .execute(args(serde_json::json!({"code": "print('x' * 100)"})))
            .await
            .unwrap();
        assert_eq!(result.output, "xxxxxxxxxx...(truncated)");
    }
}
