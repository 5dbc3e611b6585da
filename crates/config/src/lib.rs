//! Configuration loading, validation, and management for lokal.
//!
//! Loads configuration from `~/.lokal/config.toml` with environment
//! variable overrides. Validates all settings at startup. [`LiveConfig`]
//! lets the running agent pick up changes between turns.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// The root configuration structure.
///
/// Maps directly to `~/.lokal/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model backend
    #[serde(default)]
    pub model: ModelConfig,

    /// Agent loop behaviour
    #[serde(default)]
    pub agent: AgentConfig,

    /// History windowing and summarization
    #[serde(default)]
    pub context: ContextConfig,

    /// Rule-based tool routing
    #[serde(default)]
    pub router: RouterConfig,

    /// Per-mode generation parameters, keyed by mode name
    #[serde(default = "default_modes")]
    pub modes: BTreeMap<String, ModeConfig>,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Conversation persistence
    #[serde(default)]
    pub store: StoreConfig,
}

// ── Model backend ──

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider label shown in logs (e.g. "llamacpp", "ollama")
    #[serde(default = "default_provider")]
    pub provider: String,

    /// OpenAI-compatible base URL, including the `/v1` suffix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    /// Bearer token, if the backend wants one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// HTTP request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_provider() -> String {
    "llamacpp".into()
}
fn default_base_url() -> String {
    "http://127.0.0.1:8080/v1".into()
}
fn default_model() -> String {
    "local-model".into()
}
fn default_request_timeout() -> u64 {
    300
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

// ── Agent loop ──

/// Output contract requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningFormat {
    /// A JSON object with thought / tool_name / tool_args / final_answer
    #[default]
    Json,
    /// `Thought:` / `Action:` / `Action Input:` / `Final Answer:` lines
    React,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Mode used when none is given
    #[serde(default = "default_mode")]
    pub default_mode: String,

    #[serde(default)]
    pub reasoning_format: ReasoningFormat,

    /// Number of past turns sent with every request and loaded on resume
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Stream model output to the caller while buffering it for parsing
    #[serde(default = "default_true")]
    pub stream: bool,

    /// Tool that receives code blocks the model emitted instead of JSON
    #[serde(default = "default_code_tool")]
    pub code_tool: String,

    /// Characters of tool output kept per step-log entry
    #[serde(default = "default_observation_budget")]
    pub observation_budget: usize,

    /// Upper bound on one model call, including streaming
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,
}

fn default_mode() -> String {
    "chat".into()
}
fn default_history_window() -> usize {
    20
}
fn default_true() -> bool {
    true
}
fn default_code_tool() -> String {
    "python_exec".into()
}
fn default_observation_budget() -> usize {
    500
}
fn default_generation_timeout() -> u64 {
    300
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_mode: default_mode(),
            reasoning_format: ReasoningFormat::default(),
            history_window: default_history_window(),
            stream: true,
            code_tool: default_code_tool(),
            observation_budget: default_observation_budget(),
            generation_timeout_secs: default_generation_timeout(),
        }
    }
}

// ── Context window ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// History length that triggers summarization
    #[serde(default = "default_summary_threshold")]
    pub summary_threshold: usize,

    /// Newest turns left verbatim after summarization
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,

    /// Latency budget for one summarizer call
    #[serde(default = "default_summarizer_timeout")]
    pub summarizer_timeout_secs: u64,

    /// Optional token budget applied to the request window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_budget: Option<usize>,
}

fn default_summary_threshold() -> usize {
    50
}
fn default_keep_recent() -> usize {
    10
}
fn default_summarizer_timeout() -> u64 {
    30
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            summary_threshold: default_summary_threshold(),
            keep_recent: default_keep_recent(),
            summarizer_timeout_secs: default_summarizer_timeout(),
            token_budget: None,
        }
    }
}

// ── Routing ──

/// One row of the keyword routing table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub tool: String,
    pub keywords: Vec<String>,
}

impl KeywordRule {
    pub fn new(tool: &str, keywords: &[&str]) -> Self {
        Self {
            tool: tool.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Modes in which routing may select a tool at all
    #[serde(default = "default_tool_enabled_modes")]
    pub tool_enabled_modes: Vec<String>,

    /// Ordered table; the first matching row wins
    #[serde(default = "default_keywords")]
    pub keywords: Vec<KeywordRule>,
}

fn default_tool_enabled_modes() -> Vec<String> {
    vec!["coder".into(), "analyst".into(), "agent".into()]
}

/// The built-in routing table. Row order is the tie-break.
pub fn default_keywords() -> Vec<KeywordRule> {
    vec![
        KeywordRule::new("web_search", &["search", "google", "web", "ara", "internet"]),
        KeywordRule::new("sql_query", &["sql", "query", "database", "db", "veritaban"]),
        KeywordRule::new("python_exec", &["run code", "python", "script", "kod", "hesapla"]),
        KeywordRule::new("file_loader", &["file", "pdf", "docx", "xlsx", "dosya", "upload"]),
        KeywordRule::new("planning", &["plan", "steps", "todo", "görev", "roadmap"]),
        KeywordRule::new("shell_exec", &["shell", "terminal", "command", "bash", "powershell"]),
    ]
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            tool_enabled_modes: default_tool_enabled_modes(),
            keywords: default_keywords(),
        }
    }
}

// ── Modes ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeConfig {
    /// Generate/execute cycles allowed per turn
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Generation attempts per step when the output does not parse
    #[serde(default = "default_retry_count")]
    pub retry_count: usize,

    /// Tools this mode may call
    #[serde(default)]
    pub allowed_tools: Vec<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,

    /// Prepended to the generated system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_steps() -> usize {
    10
}
fn default_retry_count() -> usize {
    3
}
fn default_temperature() -> f32 {
    0.7
}
fn default_top_p() -> f32 {
    0.9
}
fn default_max_tokens() -> u32 {
    4096
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            retry_count: default_retry_count(),
            allowed_tools: Vec::new(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            stop: Vec::new(),
            system_prompt: None,
        }
    }
}

impl ModeConfig {
    pub fn allowed_set(&self) -> HashSet<String> {
        self.allowed_tools.iter().cloned().collect()
    }
}

fn tools(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn default_modes() -> BTreeMap<String, ModeConfig> {
    let mut modes = BTreeMap::new();
    modes.insert(
        "chat".into(),
        ModeConfig {
            max_steps: 1,
            system_prompt: Some("You are a friendly, concise assistant.".into()),
            ..ModeConfig::default()
        },
    );
    modes.insert(
        "coder".into(),
        ModeConfig {
            max_steps: 6,
            temperature: 0.2,
            allowed_tools: tools(&["python_exec", "file_loader", "file_writer", "shell_exec"]),
            system_prompt: Some("You are a careful software engineer. Prefer running code to guessing.".into()),
            ..ModeConfig::default()
        },
    );
    modes.insert(
        "analyst".into(),
        ModeConfig {
            max_steps: 6,
            temperature: 0.3,
            allowed_tools: tools(&["python_exec", "file_loader", "web_search", "sql_query", "planning"]),
            system_prompt: Some("You are a data analyst. Compute, plot and cite your numbers.".into()),
            ..ModeConfig::default()
        },
    );
    modes.insert(
        "agent".into(),
        ModeConfig {
            allowed_tools: tools(&[
                "web_search",
                "python_exec",
                "file_loader",
                "file_writer",
                "shell_exec",
                "sql_query",
                "planning",
            ]),
            ..ModeConfig::default()
        },
    );
    modes
}

// ── Tools ──

#[derive(Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Per-call timeout for every tool
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,

    /// Directory file and code tools are confined to
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,

    /// Commands `shell_exec` may run
    #[serde(default = "default_shell_allowlist")]
    pub shell_allowlist: Vec<String>,

    /// Interpreter used by `python_exec`
    #[serde(default = "default_python_bin")]
    pub python_bin: String,

    #[serde(default = "default_search_endpoint")]
    pub search_endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_api_key: Option<String>,

    /// Characters of file content returned by `file_loader`
    #[serde(default = "default_max_file_chars")]
    pub max_file_chars: usize,

    /// Characters of process output returned by `python_exec`/`shell_exec`
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,

    /// SQLite database `sql_query` reads when no `db_path` is given
    #[serde(default = "default_sql_database")]
    pub sql_database: PathBuf,
}

fn default_tool_timeout() -> u64 {
    60
}
fn default_workspace_dir() -> PathBuf {
    AppConfig::config_dir().join("workspace")
}
fn default_shell_allowlist() -> Vec<String> {
    tools(&["ls", "cat", "head", "tail", "wc", "grep", "find", "echo", "pwd", "date", "git"])
}
fn default_python_bin() -> String {
    "python3".into()
}
fn default_search_endpoint() -> String {
    "https://api.search.brave.com/res/v1/web/search".into()
}
fn default_max_file_chars() -> usize {
    20_000
}
fn default_max_output_chars() -> usize {
    4000
}
fn default_sql_database() -> PathBuf {
    default_db_path()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout(),
            workspace_dir: default_workspace_dir(),
            shell_allowlist: default_shell_allowlist(),
            python_bin: default_python_bin(),
            search_endpoint: default_search_endpoint(),
            search_api_key: None,
            max_file_chars: default_max_file_chars(),
            max_output_chars: default_max_output_chars(),
            sql_database: default_sql_database(),
        }
    }
}

impl std::fmt::Debug for ToolsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsConfig")
            .field("timeout_secs", &self.timeout_secs)
            .field("workspace_dir", &self.workspace_dir)
            .field("shell_allowlist", &self.shell_allowlist)
            .field("python_bin", &self.python_bin)
            .field("search_endpoint", &self.search_endpoint)
            .field("search_api_key", &redact(&self.search_api_key))
            .field("max_file_chars", &self.max_file_chars)
            .field("max_output_chars", &self.max_output_chars)
            .field("sql_database", &self.sql_database)
            .finish()
    }
}

// ── Store ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    AppConfig::config_dir().join("lokal.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_db_path(),
        }
    }
}

// ── Loading ──

impl AppConfig {
    /// Load configuration from the default path (~/.lokal/config.toml).
    ///
    /// Environment variables override the file:
    /// - `LOKAL_MODEL`, `LOKAL_BASE_URL`, `LOKAL_API_KEY`, `LOKAL_MODE`
    /// - `WEB_SEARCH_API_KEY` for the search tool
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_path())
    }

    /// Load from a path, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("LOKAL_MODEL") {
            self.model.model = model;
        }
        if let Some(url) = lookup("LOKAL_BASE_URL") {
            self.model.base_url = url;
        }
        if let Some(key) = lookup("LOKAL_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Some(mode) = lookup("LOKAL_MODE") {
            self.agent.default_mode = mode;
        }
        if self.tools.search_api_key.is_none() {
            self.tools.search_api_key = lookup("WEB_SEARCH_API_KEY");
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".lokal")
    }

    /// Default config file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, mode) in &self.modes {
            if !(0.0..=2.0).contains(&mode.temperature) {
                return Err(ConfigError::ValidationError(format!(
                    "modes.{name}.temperature must be between 0.0 and 2.0"
                )));
            }
            if !(0.0..=1.0).contains(&mode.top_p) {
                return Err(ConfigError::ValidationError(format!(
                    "modes.{name}.top_p must be between 0.0 and 1.0"
                )));
            }
            if mode.max_steps == 0 {
                return Err(ConfigError::ValidationError(format!("modes.{name}.max_steps must be >= 1")));
            }
            if mode.retry_count == 0 {
                return Err(ConfigError::ValidationError(format!("modes.{name}.retry_count must be >= 1")));
            }
        }

        if self.context.summary_threshold <= self.context.keep_recent {
            return Err(ConfigError::ValidationError(
                "context.summary_threshold must be greater than context.keep_recent".into(),
            ));
        }

        if self.agent.history_window == 0 {
            return Err(ConfigError::ValidationError("agent.history_window must be >= 1".into()));
        }

        Ok(())
    }

    /// Parameters for a mode; unknown modes get a tool-less default.
    pub fn mode(&self, name: &str) -> ModeConfig {
        match self.modes.get(name) {
            Some(mode) => mode.clone(),
            None => {
                tracing::debug!(mode = %name, "Unknown mode, using defaults without tools");
                ModeConfig::default()
            }
        }
    }

    /// Whether routing may pick a tool in this mode.
    pub fn is_tool_enabled(&self, mode: &str) -> bool {
        self.router.tool_enabled_modes.iter().any(|m| m == mode)
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            agent: AgentConfig::default(),
            context: ContextConfig::default(),
            router: RouterConfig::default(),
            modes: default_modes(),
            tools: ToolsConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

// ── Hot swapping ──

/// Shared, swappable configuration.
///
/// Readers take a [`snapshot`](LiveConfig::snapshot) and keep it for the
/// duration of one turn; writers replace the whole document, so a turn never
/// sees a half-applied change.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    inner: Arc<RwLock<Arc<AppConfig>>>,
    source: Option<PathBuf>,
}

impl LiveConfig {
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
            source: None,
        }
    }

    /// Remember where the config came from so [`reload`](Self::reload) can re-read it.
    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// The current configuration.
    pub fn snapshot(&self) -> Arc<AppConfig> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the whole configuration after validating it.
    pub fn replace(&self, config: AppConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(config);
        Ok(())
    }

    /// Insert or replace one mode's parameters.
    pub fn update_mode(&self, name: &str, mode: ModeConfig) -> Result<(), ConfigError> {
        let mut next = (*self.snapshot()).clone();
        next.modes.insert(name.to_string(), mode);
        self.replace(next)?;
        tracing::info!(mode = %name, "Mode parameters updated");
        Ok(())
    }

    /// Re-read the source file. Without a source this is a no-op.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.source else {
            return Ok(());
        };
        let config = AppConfig::load_with_env(path)?;
        self.replace(config)?;
        tracing::info!(path = %path.display(), "Configuration reloaded");
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.default_mode, "chat");
        assert_eq!(config.agent.reasoning_format, ReasoningFormat::Json);
        assert_eq!(config.context.summary_threshold, 50);
        assert_eq!(config.modes.len(), 4);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model.base_url, config.model.base_url);
        assert_eq!(parsed.router.keywords, config.router.keywords);
        assert_eq!(parsed.modes["agent"], config.modes["agent"]);
    }

    #[test]
    fn keyword_table_order_is_preserved() {
        let tools: Vec<String> = default_keywords().into_iter().map(|r| r.tool).collect();
        assert_eq!(
            tools,
            vec!["web_search", "sql_query", "python_exec", "file_loader", "planning", "shell_exec"]
        );
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.modes.insert("hot".into(), ModeConfig { temperature: 5.0, ..ModeConfig::default() });
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_steps_rejected() {
        let err = AppConfig::from_toml_str("[modes.broken]\nmax_steps = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_steps"));
    }

    #[test]
    fn summary_threshold_must_exceed_keep_recent() {
        let err = AppConfig::from_toml_str("[context]\nsummary_threshold = 5\nkeep_recent = 10\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        let config = result.unwrap();
        assert_eq!(config.model.provider, "llamacpp");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
[agent]
reasoning_format = "react"

[[router.keywords]]
tool = "python_exec"
keywords = ["plot"]
"#,
        )
        .unwrap();
        assert_eq!(config.agent.reasoning_format, ReasoningFormat::React);
        assert_eq!(config.agent.history_window, 20);
        assert_eq!(config.router.keywords.len(), 1);
        assert_eq!(config.router.tool_enabled_modes, default_tool_enabled_modes());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[model]\nmodel = \"qwen2.5\"\n").unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.model.model, "qwen2.5");
    }

    #[test]
    fn parse_error_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[model\n").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("LOKAL_MODEL", "mistral"),
            ("LOKAL_MODE", "agent"),
            ("WEB_SEARCH_API_KEY", "brave-key"),
        ]
        .into();
        let mut config = AppConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.model.model, "mistral");
        assert_eq!(config.agent.default_mode, "agent");
        assert_eq!(config.tools.search_api_key.as_deref(), Some("brave-key"));
        assert_eq!(config.model.base_url, default_base_url());
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let mut config = AppConfig::default();
        config.model.api_key = Some("sk-secret".into());
        config.tools.search_api_key = Some("brave-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("brave-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn unknown_mode_has_no_tools() {
        let config = AppConfig::default();
        assert!(config.mode("nonexistent").allowed_tools.is_empty());
        assert!(config.mode("agent").allowed_set().contains("web_search"));
        assert!(config.mode("analyst").allowed_set().contains("sql_query"));
        assert!(config.mode("agent").allowed_set().contains("planning"));
        assert!(!config.mode("coder").allowed_set().contains("sql_query"));
        assert!(!config.is_tool_enabled("chat"));
        assert!(config.is_tool_enabled("agent"));
    }

    #[test]
    fn live_config_swaps_between_snapshots() {
        let live = LiveConfig::new(AppConfig::default());
        let before = live.snapshot();
        live.update_mode("agent", ModeConfig { max_steps: 2, ..ModeConfig::default() }).unwrap();
        let after = live.snapshot();
        assert_eq!(before.modes["agent"].max_steps, 10);
        assert_eq!(after.modes["agent"].max_steps, 2);
    }

    #[test]
    fn live_config_rejects_invalid_replacement() {
        let live = LiveConfig::new(AppConfig::default());
        let result = live.update_mode("agent", ModeConfig { retry_count: 0, ..ModeConfig::default() });
        assert!(result.is_err());
        assert_eq!(live.snapshot().modes["agent"].retry_count, 3);
    }

    #[test]
    fn live_config_reloads_from_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent]\nhistory_window = 8\n").unwrap();
        let live = LiveConfig::new(AppConfig::default()).with_source(&path);
        live.reload().unwrap();
        assert_eq!(live.snapshot().agent.history_window, 8);

        std::fs::write(&path, "[agent]\nhistory_window = 4\n").unwrap();
        live.reload().unwrap();
        assert_eq!(live.snapshot().agent.history_window, 4);
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("llamacpp"));
        assert!(toml_str.contains("web_search"));
    }
}
