//! SQL tool: run a read-only query against a SQLite database.
//!
//! Only `SELECT`, `WITH` and `PRAGMA` statements are accepted, and the
//! connection itself is opened read-only. At most [`MAX_ROWS`] rows are
//! returned to the model.

use crate::workspace::{resolve, truncate};
use async_trait::async_trait;
use lokal_core::error::ToolError;
use lokal_core::tool::{Tool, ToolResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Column, ConnectOptions, Row, TypeInfo, ValueRef};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const MAX_ROWS: usize = 200;
/// Returned rows are cut to [`OVERSIZE_ROWS`] past this many characters.
const MAX_PAYLOAD_CHARS: usize = 2_000_000;
const OVERSIZE_ROWS: usize = 10;
const SAFE_PREFIXES: &[&str] = &["select", "pragma", "with"];

pub struct SqlQueryTool {
    database: PathBuf,
    workspace: PathBuf,
    max_output_chars: usize,
}

impl SqlQueryTool {
    pub fn new(database: impl Into<PathBuf>, workspace: impl Into<PathBuf>, max_output_chars: usize) -> Self {
        Self {
            database: database.into(),
            workspace: workspace.into(),
            max_output_chars,
        }
    }

    /// The database for this call: `db_path` inside the workspace, or the configured one.
    fn database_for(&self, requested: Option<&str>) -> Result<PathBuf, ToolError> {
        match requested {
            Some(path) => resolve(&self.workspace, path).map_err(|e| ToolError::PermissionDenied {
                tool_name: "sql_query".into(),
                reason: e.to_string(),
            }),
            None => Ok(self.database.clone()),
        }
    }
}

/// Whether `sql` starts with a read-only statement keyword.
pub fn is_read_only(sql: &str) -> bool {
    let lowered = sql.trim_start().to_ascii_lowercase();
    SAFE_PREFIXES.iter().any(|prefix| lowered.starts_with(prefix))
}

fn column_value(row: &SqliteRow, index: usize) -> serde_json::Value {
    let Ok(raw) = row.try_get_raw(index) else {
        return serde_json::Value::Null;
    };
    if raw.is_null() {
        return serde_json::Value::Null;
    }
    let kind = raw.type_info().name().to_ascii_uppercase();
    match kind.as_str() {
        "INTEGER" | "BOOLEAN" => row
            .try_get::<i64, _>(index)
            .map(serde_json::Value::from)
            .unwrap_or(serde_json::Value::Null),
        "REAL" => row
            .try_get::<f64, _>(index)
            .map(serde_json::Value::from)
            .unwrap_or(serde_json::Value::Null),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map(|bytes| serde_json::Value::from(format!("<{} bytes>", bytes.len())))
            .unwrap_or(serde_json::Value::Null),
        _ => row
            .try_get::<String, _>(index)
            .map(serde_json::Value::from)
            .unwrap_or(serde_json::Value::Null),
    }
}

fn row_to_json(row: &SqliteRow) -> serde_json::Map<String, serde_json::Value> {
    row.columns()
        .iter()
        .map(|column| (column.name().to_string(), column_value(row, column.ordinal())))
        .collect()
}

async fn run_query(database: &Path, sql: &str) -> Result<Vec<serde_json::Map<String, serde_json::Value>>, sqlx::Error> {
    let mut conn = SqliteConnectOptions::new()
        .filename(database)
        .read_only(true)
        .connect()
        .await?;
    let rows = sqlx::query(sql).fetch_all(&mut conn).await?;
    Ok(rows.iter().map(row_to_json).collect())
}

#[async_trait]
impl Tool for SqlQueryTool {
    fn name(&self) -> &str {
        "sql_query"
    }

    fn description(&self) -> &str {
        "Run a read-only SQL query (SELECT, WITH or PRAGMA) on a SQLite database and return the rows as JSON."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The SQL statement to run"
                },
                "db_path": {
                    "type": "string",
                    "description": "Optional SQLite file relative to the workspace"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolResult, ToolError> {
        let sql = arguments
            .get("query")
            .or_else(|| arguments.get("sql"))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("No query provided".into()))?;

        if !is_read_only(sql) {
            return Err(ToolError::PermissionDenied {
                tool_name: "sql_query".into(),
                reason: "Only SELECT/PRAGMA/WITH queries are allowed".into(),
            });
        }

        let database = self.database_for(arguments.get("db_path").and_then(|v| v.as_str()))?;
        if !database.exists() {
            return Err(ToolError::ExecutionFailed {
                tool_name: "sql_query".into(),
                reason: format!("Database not found: {}", database.display()),
            });
        }

        debug!(database = %database.display(), "Running SQL query");

        let mut rows = run_query(&database, sql).await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "sql_query".into(),
            reason: e.to_string(),
        })?;

        let rowcount = rows.len();
        rows.truncate(MAX_ROWS);
        let payload: usize = rows
            .iter()
            .flat_map(|row| row.values())
            .map(|v| v.to_string().len())
            .sum();
        if payload > MAX_PAYLOAD_CHARS {
            rows.truncate(OVERSIZE_ROWS);
        }

        let returned = rows.len();
        let body = serde_json::to_string_pretty(&rows).unwrap_or_default();
        let header = if returned < rowcount {
            format!("{rowcount} rows (showing first {returned}):")
        } else {
            format!("{rowcount} rows:")
        };

        Ok(ToolResult::ok(truncate(&format!("{header}\n{body}"), self.max_output_chars)).with_data(
            serde_json::json!({
                "query": sql,
                "rows": rows,
                "rowcount": rowcount,
                "rowcount_returned": returned,
                "db_path": database.display().to_string(),
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    async fn seeded(dir: &Path, rows: usize) -> PathBuf {
        let path = dir.join("sales.db");
        let mut conn = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .connect()
            .await
            .unwrap();
        sqlx::query("CREATE TABLE sales (id INTEGER PRIMARY KEY, region TEXT, total REAL, note TEXT)")
            .execute(&mut conn)
            .await
            .unwrap();
        for i in 0..rows {
            sqlx::query("INSERT INTO sales (region, total, note) VALUES (?, ?, NULL)")
                .bind(if i % 2 == 0 { "north" } else { "south" })
                .bind(i as f64 * 1.5)
                .execute(&mut conn)
                .await
                .unwrap();
        }
        path
    }

    #[test]
    fn read_only_prefixes() {
        assert!(is_read_only("SELECT * FROM t"));
        assert!(is_read_only("  with x as (select 1) select * from x"));
        assert!(is_read_only("PRAGMA table_info(t)"));
        assert!(!is_read_only("DELETE FROM t"));
        assert!(!is_read_only("drop table t"));
        assert!(!is_read_only("insert into t values (1)"));
    }

    #[tokio::test]
    async fn select_returns_typed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded(dir.path(), 3).await;
        let tool = SqlQueryTool::new(&db, dir.path(), 4000);

        let result = tool
            .execute(args(serde_json::json!({"query": "SELECT id, region, total, note FROM sales ORDER BY id"})))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.starts_with("3 rows:"));
        let data = result.data.unwrap();
        assert_eq!(data["rowcount"], 3);
        assert_eq!(data["rows"][0]["id"], 1);
        assert_eq!(data["rows"][0]["region"], "north");
        assert_eq!(data["rows"][1]["total"], 1.5);
        assert!(data["rows"][2]["note"].is_null());
    }

    #[tokio::test]
    async fn rows_are_capped() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded(dir.path(), MAX_ROWS + 50).await;
        let tool = SqlQueryTool::new(&db, dir.path(), 100);

        let result = tool
            .execute(args(serde_json::json!({"query": "SELECT id FROM sales"})))
            .await
            .unwrap();

        let data = result.data.unwrap();
        assert_eq!(data["rowcount"], MAX_ROWS + 50);
        assert_eq!(data["rowcount_returned"], MAX_ROWS);
        assert!(result.output.starts_with(&format!("{} rows (showing first {MAX_ROWS})", MAX_ROWS + 50)));
    }

    #[tokio::test]
    async fn writes_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded(dir.path(), 1).await;
        let tool = SqlQueryTool::new(&db, dir.path(), 4000);

        let err = tool
            .execute(args(serde_json::json!({"query": "DELETE FROM sales"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));

        // A write smuggled behind a read is stopped by the read-only connection
        let err = tool
            .execute(args(serde_json::json!({"query": "WITH x AS (SELECT 1) DELETE FROM sales"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn db_path_is_resolved_in_workspace() {
        let dir = tempfile::tempdir().unwrap();
        seeded(dir.path(), 2).await;
        let tool = SqlQueryTool::new(dir.path().join("missing.db"), dir.path(), 4000);

        let result = tool
            .execute(args(serde_json::json!({"query": "SELECT COUNT(*) AS n FROM sales", "db_path": "sales.db"})))
            .await
            .unwrap();
        assert_eq!(result.data.unwrap()["rows"][0]["n"], 2);

        let err = tool
            .execute(args(serde_json::json!({"query": "SELECT 1", "db_path": "../other.db"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn missing_database_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let tool = SqlQueryTool::new(dir.path().join("none.db"), dir.path(), 4000);

        let err = tool.execute(args(serde_json::json!({"query": "SELECT 1"}))).await.unwrap_err();
        assert!(err.to_string().contains("Database not found"));

        let err = tool.execute(args(serde_json::json!({"query": "  "}))).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
