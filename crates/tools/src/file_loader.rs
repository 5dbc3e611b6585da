//! File loader tool: read a text file from the workspace.

use crate::workspace::{resolve, truncate};
use async_trait::async_trait;
use lokal_core::error::ToolError;
use lokal_core::tool::{Tool, ToolResult};
use std::path::PathBuf;
use tracing::debug;

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "csv", "tsv", "json", "yaml", "yml", "toml", "xml", "html", "log", "py", "rs",
    "js", "ts", "sql", "ini", "cfg",
];

pub struct FileLoaderTool {
    workspace: PathBuf,
    max_chars: usize,
}

impl FileLoaderTool {
    pub fn new(workspace: impl Into<PathBuf>, max_chars: usize) -> Self {
        Self { workspace: workspace.into(), max_chars }
    }
}

fn is_text_file(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

#[async_trait]
impl Tool for FileLoaderTool {
    fn name(&self) -> &str {
        "file_loader"
    }

    fn description(&self) -> &str {
        "Load a text file (csv, json, md, txt, source code) from the workspace and return its contents."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the workspace"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolResult, ToolError> {
        let requested = arguments
            .get("path")
            .or_else(|| arguments.get("query"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let path = resolve(&self.workspace, requested).map_err(|e| ToolError::PermissionDenied {
            tool_name: "file_loader".into(),
            reason: e.to_string(),
        })?;

        if !is_text_file(&path) {
            return Err(ToolError::InvalidArguments(format!(
                "Unsupported file type: '{requested}'. Supported: {}",
                TEXT_EXTENSIONS.join(", ")
            )));
        }

        debug!(path = %path.display(), "Loading file");

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "file_loader".into(),
                reason: format!("Failed to read '{requested}': {e}"),
            })?;

        let total_chars = content.chars().count();
        let body = truncate(&content, self.max_chars);
        Ok(ToolResult::ok(format!("Contents of {requested} ({total_chars} chars):\n{body}"))
            .with_data(serde_json::json!({
                "path": path.display().to_string(),
                "chars": total_chars,
                "truncated": total_chars > self.max_chars,
            })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn loads_text_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sales.csv"), "month,total\njan,10\n").unwrap();
        let tool = FileLoaderTool::new(dir.path(), 20_000);

        let result = tool.execute(args(serde_json::json!({"path": "sales.csv"}))).await.unwrap();
        assert!(result.success);
        assert!(result.output.starts_with("Contents of sales.csv (19 chars):"));
        assert!(result.output.contains("jan,10"));
    }

    #[tokio::test]
    async fn raw_query_is_used_as_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.md"), "# hi").unwrap();
        let tool = FileLoaderTool::new(dir.path(), 20_000);
        let result = tool.execute(args(serde_json::json!({"query": "notes.md"}))).await.unwrap();
        assert!(result.output.ends_with("# hi"));
    }

    #[tokio::test]
    async fn large_files_are_truncated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), "a".repeat(50)).unwrap();
        let tool = FileLoaderTool::new(dir.path(), 10);
        let result = tool.execute(args(serde_json::json!({"path": "big.txt"}))).await.unwrap();
        assert!(result.output.ends_with("aaaaaaaaaa...(truncated)"));
        assert_eq!(result.data.unwrap()["truncated"], true);
    }

    #[tokio::test]
    async fn escapes_are_denied() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileLoaderTool::new(dir.path(), 100);
        let err = tool.execute(args(serde_json::json!({"path": "../etc/passwd.txt"}))).await.unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn binary_extensions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileLoaderTool::new(dir.path(), 100);
        let err = tool.execute(args(serde_json::json!({"path": "photo.png"}))).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileLoaderTool::new(dir.path(), 100);
        let err = tool.execute(args(serde_json::json!({"path": "nope.txt"}))).await.unwrap_err();
        assert!(err.to_string().contains("nope.txt"));
    }
}
