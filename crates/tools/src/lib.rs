//! Built-in tool implementations for lokal.
//!
//! Tools give the agent the ability to act: search the web, run Python,
//! read and write workspace files, query SQLite, draft plans and run a few
//! read-only shell commands.
//! File and code tools are confined to the configured workspace directory.

pub mod file_loader;
pub mod file_writer;
pub mod planning;
pub mod python_exec;
pub mod shell_exec;
pub mod sql_query;
pub mod web_search;
pub mod workspace;

use lokal_config::ToolsConfig;
use lokal_core::tool::ToolRegistry;
use std::time::Duration;

pub use lokal_core::tool::split_artifact;

const SHELL_TIMEOUT: Duration = Duration::from_secs(15);

/// Create a tool registry with every built-in tool, configured from `config`.
///
/// Which of these a turn may actually use is decided per mode by the
/// mode's allowed tool list.
pub fn default_registry(config: &ToolsConfig) -> ToolRegistry {
    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    let workspace = config.workspace_dir.clone();

    let mut registry = ToolRegistry::new().with_timeout(timeout);
    registry.register(Box::new(web_search::WebSearchTool::new(
        config.search_endpoint.clone(),
        config.search_api_key.clone(),
    )));
    registry.register(Box::new(python_exec::PythonExecTool::new(
        config.python_bin.clone(),
        workspace.clone(),
        timeout,
        config.max_output_chars,
    )));
    registry.register(Box::new(file_loader::FileLoaderTool::new(
        workspace.clone(),
        config.max_file_chars,
    )));
    registry.register(Box::new(file_writer::FileWriterTool::new(workspace.clone())));
    registry.register(Box::new(sql_query::SqlQueryTool::new(
        config.sql_database.clone(),
        workspace.clone(),
        config.max_output_chars,
    )));
    registry.register(Box::new(planning::PlanningTool));
    registry.register(Box::new(shell_exec::ShellExecTool::new(
        config.shell_allowlist.clone(),
        workspace,
        SHELL_TIMEOUT.min(timeout),
        config.max_output_chars,
    )));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_all_tools() {
        let registry = default_registry(&ToolsConfig::default());
        assert_eq!(
            registry.names(),
            vec!["file_loader", "file_writer", "planning", "python_exec", "shell_exec", "sql_query", "web_search"]
        );
    }

    #[tokio::test]
    async fn registry_confines_writes_to_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let config = ToolsConfig {
            workspace_dir: dir.path().to_path_buf(),
            ..ToolsConfig::default()
        };
        let registry = default_registry(&config);
        let obs = registry
            .execute(
                "file_writer",
                serde_json::json!({"filename": "../x.txt", "content": "no"}).into(),
                None,
            )
            .await;
        assert!(!obs.success);
        assert!(obs.text.starts_with("Error: "));
    }

    #[tokio::test]
    async fn registry_runs_planning_and_guards_sql() {
        let dir = tempfile::tempdir().unwrap();
        let config = ToolsConfig {
            workspace_dir: dir.path().to_path_buf(),
            sql_database: dir.path().join("data.db"),
            ..ToolsConfig::default()
        };
        let registry = default_registry(&config);

        let obs = registry
            .execute("planning", serde_json::json!({"goal": "fix the export bug"}).into(), None)
            .await;
        assert!(obs.success);
        assert!(obs.text.starts_with("Plan for: fix the export bug"));

        let obs = registry
            .execute("sql_query", serde_json::json!({"query": "DROP TABLE users"}).into(), None)
            .await;
        assert!(!obs.success);
        assert!(obs.text.contains("Only SELECT/PRAGMA/WITH"));
    }
}
