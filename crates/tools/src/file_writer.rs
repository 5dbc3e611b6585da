//! File writer tool: create or overwrite a file in the workspace.

use crate::workspace::resolve;
use async_trait::async_trait;
use lokal_core::error::ToolError;
use lokal_core::tool::{Tool, ToolResult};
use std::path::PathBuf;
use tracing::debug;

pub struct FileWriterTool {
    workspace: PathBuf,
}

impl FileWriterTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self { workspace: workspace.into() }
    }
}

#[async_trait]
impl Tool for FileWriterTool {
    fn name(&self) -> &str {
        "file_writer"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace. Creates parent directories and overwrites existing files."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "File path relative to the workspace"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["filename", "content"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolResult, ToolError> {
        let filename = arguments
            .get("filename")
            .or_else(|| arguments.get("path"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'filename' argument".into()))?;
        let content = arguments
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;

        let path = resolve(&self.workspace, filename).map_err(|e| ToolError::PermissionDenied {
            tool_name: "file_writer".into(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "file_writer".into(),
                    reason: format!("Failed to create directory: {e}"),
                })?;
        }

        debug!(path = %path.display(), bytes = content.len(), "Writing file");

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "file_writer".into(),
                reason: format!("Failed to write '{filename}': {e}"),
            })?;

        Ok(ToolResult::ok(format!("File created successfully at: {}", path.display()))
            .with_data(serde_json::json!({
                "path": path.display().to_string(),
                "bytes": content.len(),
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
    async fn writes_into_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileWriterTool::new(dir.path());
        let result = tool
            .execute(args(serde_json::json!({"filename": "out/report.md", "content": "# Report"})))
            .await
            .unwrap();
        assert!(result.output.starts_with("File created successfully at: "));
        let written = std::fs::read_to_string(dir.path().join("out/report.md")).unwrap();
        assert_eq!(written, "# Report");
    }

    #[tokio::test]
    async fn overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileWriterTool::new(dir.path());
        for body in ["one", "two"] {
            tool.execute(args(serde_json::json!({"filename": "a.txt", "content": body})))
                .await
                .unwrap();
        }
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "two");
    }

    #[tokio::test]
    async fn traversal_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileWriterTool::new(dir.path());
        let err = tool
            .execute(args(serde_json::json!({"filename": "../escape.txt", "content": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn content_is_required() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileWriterTool::new(dir.path());
        let err = tool
            .execute(args(serde_json::json!({"filename": "a.txt"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
