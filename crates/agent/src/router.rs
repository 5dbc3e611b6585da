//! Rule-based routing: pick at most one tool for a user message.
//!
//! Order of checks:
//! 1. the mode must be tool-enabled,
//! 2. an explicit `/tool <name>` or `tool: <name>` directive wins outright,
//! 3. otherwise the first rule in the keyword table (table order) whose tool
//!    is allowed and whose keyword occurs in the message.
//!
//! Table order is the only tie-break between rules.

use lokal_config::{KeywordRule, RouterConfig};
use regex_lite::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

static EXPLICIT_TOOL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:/tool|tool:)\s*([a-zA-Z0-9_]+)").expect("static regex")
});

/// The routing verdict for one user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDecision {
    pub use_tool: bool,
    pub tool_name: Option<String>,
    /// Diagnostic only
    pub rationale: String,
}

impl RouteDecision {
    fn none(rationale: impl Into<String>) -> Self {
        Self {
            use_tool: false,
            tool_name: None,
            rationale: rationale.into(),
        }
    }

    fn tool(name: &str, rationale: impl Into<String>) -> Self {
        Self {
            use_tool: true,
            tool_name: Some(name.to_string()),
            rationale: rationale.into(),
        }
    }
}

/// Deterministic tool selection from mode, directives and keywords.
#[derive(Debug, Clone)]
pub struct RoutingPolicy {
    enabled_modes: HashSet<String>,
    rules: Vec<KeywordRule>,
}

impl RoutingPolicy {
    pub fn new(enabled_modes: impl IntoIterator<Item = String>, rules: Vec<KeywordRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| KeywordRule {
                tool: rule.tool,
                keywords: rule.keywords.iter().map(|k| k.to_lowercase()).collect(),
            })
            .collect();
        Self {
            enabled_modes: enabled_modes.into_iter().collect(),
            rules,
        }
    }

    pub fn from_config(config: &RouterConfig) -> Self {
        Self::new(config.tool_enabled_modes.iter().cloned(), config.keywords.clone())
    }

    pub fn is_enabled(&self, mode: &str) -> bool {
        self.enabled_modes.contains(mode)
    }

    /// Decide whether `message` in `mode` should use one of `allowed` tools.
    pub fn decide(&self, message: &str, mode: &str, allowed: &HashSet<String>) -> RouteDecision {
        if !self.is_enabled(mode) {
            return RouteDecision::none(format!("mode '{mode}' not tool-enabled"));
        }

        if let Some(requested) = explicit_tool(message) {
            let decision = if allowed.contains(&requested) {
                RouteDecision::tool(&requested, "explicit tool request")
            } else {
                RouteDecision::none(format!("tool '{requested}' not allowed"))
            };
            debug!(tool = %requested, use_tool = decision.use_tool, "Explicit tool directive");
            return decision;
        }

        let lower = message.to_lowercase();
        for rule in &self.rules {
            if !allowed.contains(&rule.tool) {
                continue;
            }
            if let Some(keyword) = rule.keywords.iter().find(|k| lower.contains(k.as_str())) {
                debug!(tool = %rule.tool, keyword = %keyword, "Keyword route");
                return RouteDecision::tool(&rule.tool, format!("keyword match: {keyword}"));
            }
        }

        RouteDecision::none("no match")
    }
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}

/// The tool named by an inline directive, lower-cased.
pub fn explicit_tool(message: &str) -> Option<String> {
    EXPLICIT_TOOL
        .captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}
