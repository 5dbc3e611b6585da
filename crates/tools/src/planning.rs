//! Planning tool: expand a goal into steps, a checklist and risks.
//!
//! Deterministic keyword heuristics, no model call. The agent uses it to
//! lay out multi-step work before acting.

use async_trait::async_trait;
use lokal_core::error::ToolError;
use lokal_core::tool::{Tool, ToolResult};
use serde::Serialize;
use std::collections::HashSet;

const DEFAULT_MAX_STEPS: usize = 8;

const BASE_STEPS: &[&str] = &[
    "Clarify requirements and success criteria.",
    "Inventory available context, assets, and constraints.",
    "Draft a step-by-step approach.",
    "Execute iteratively with checkpoints.",
    "Review results and adjust.",
];

/// Extra steps added when the goal mentions one of the keywords.
const DOMAIN_STEPS: &[(&[&str], &[&str])] = &[
    (
        &["bug", "fix", "regression", "error", "exception"],
        &[
            "Reproduce the issue and capture inputs/logs.",
            "Identify scope and recent changes.",
            "Patch, add regression test, and re-verify.",
        ],
    ),
    (
        &["feature", "implement", "add", "build"],
        &[
            "Define acceptance criteria and edge cases.",
            "Design the minimal change (data flow, API, UI).",
            "Implement incrementally and validate.",
        ],
    ),
    (
        &["refactor", "cleanup", "maintain"],
        &[
            "Identify risky areas and dependencies.",
            "Refactor in small commits with tests.",
            "Run checks and compare behavior vs baseline.",
        ],
    ),
    (
        &["data", "analysis", "metric", "report"],
        &[
            "Pin data sources and filters.",
            "Compute/validate metrics on a small sample.",
            "Summarize findings with assumptions and next steps.",
        ],
    ),
];

/// A plan for one goal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub goal: String,
    pub steps: Vec<String>,
    pub checklist: Vec<String>,
    pub risks: Vec<String>,
}

impl Plan {
    /// Build a plan from `goal`, starting from `seed` steps when given.
    pub fn build(goal: &str, seed: &[String], max_steps: usize, include_risks: bool) -> Self {
        let goal = goal.trim().to_string();
        let lowered = goal.to_lowercase();
        let max_steps = max_steps.max(1);

        let base: Vec<&str> = if seed.is_empty() {
            BASE_STEPS.to_vec()
        } else {
            seed.iter().map(String::as_str).collect()
        };
        let domain = DOMAIN_STEPS
            .iter()
            .filter(|(keywords, _)| keywords.iter().any(|k| lowered.contains(k)))
            .flat_map(|(_, steps)| steps.iter().copied());

        let mut seen = HashSet::new();
        let mut steps: Vec<String> = base
            .into_iter()
            .chain(domain)
            .map(str::trim)
            .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
            .map(String::from)
            .collect();
        if steps.is_empty() {
            steps = BASE_STEPS.iter().map(|s| s.to_string()).collect();
        }
        steps.truncate(max_steps);

        let checklist = checklist(&lowered, !steps.is_empty());
        let risks = if include_risks { risks(&lowered) } else { Vec::new() };

        Self {
            goal,
            steps,
            checklist,
            risks,
        }
    }

    /// Text shown to the model.
    pub fn render(&self) -> String {
        let goal = if self.goal.is_empty() { "[unspecified]" } else { &self.goal };
        let mut out = format!("Plan for: {goal}\n");
        for (i, step) in self.steps.iter().enumerate() {
            out.push_str(&format!("{}. {step}\n", i + 1));
        }
        out.push_str("\nChecklist:\n");
        for item in &self.checklist {
            out.push_str(&format!("- {item}\n"));
        }
        if !self.risks.is_empty() {
            out.push_str("\nRisks:\n");
            for risk in &self.risks {
                out.push_str(&format!("- {risk}\n"));
            }
        }
        out.trim_end().to_string()
    }
}

fn checklist(goal: &str, has_steps: bool) -> Vec<String> {
    let mut items = vec![
        "Confirm constraints (time, scope, approvals).".to_string(),
        "List dependencies/owners and data sources.".to_string(),
        "Define done/success criteria.".to_string(),
    ];
    if ["test", "qa", "verify", "regression"].iter().any(|k| goal.contains(k)) {
        items.push("Enumerate test cases (happy path, edge, failure).".into());
    }
    if has_steps {
        items.push("Add measurable checkpoints for each step.".into());
    }
    items
}

fn risks(goal: &str) -> Vec<String> {
    let mut risks = vec![
        "Hidden constraints or unstated requirements.".to_string(),
        "Insufficient context leading to rework.".to_string(),
        "Timeline slip if checkpoints are unclear.".to_string(),
    ];
    if ["prod", "production", "data loss", "outage"].iter().any(|k| goal.contains(k)) {
        risks.push("Impact to production/data integrity; require rollback plan.".into());
    }
    if ["security", "auth", "privacy"].iter().any(|k| goal.contains(k)) {
        risks.push("Security/privacy implications need review.".into());
    }
    risks
}

pub struct PlanningTool;

#[async_trait]
impl Tool for PlanningTool {
    fn name(&self) -> &str {
        "planning"
    }

    fn description(&self) -> &str {
        "Break a goal into ordered steps with a checklist and risks (deterministic, no model call)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "goal": {
                    "type": "string",
                    "description": "What should be accomplished"
                },
                "steps": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Optional draft steps to refine"
                },
                "max_steps": {
                    "type": "integer",
                    "description": "Maximum number of steps (default 8)"
                },
                "include_risks": {
                    "type": "boolean",
                    "description": "Whether to list risks (default true)"
                }
            },
            "required": ["goal"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolResult, ToolError> {
        let goal = arguments
            .get("goal")
            .or_else(|| arguments.get("query"))
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let seed: Vec<String> = arguments
            .get("steps")
            .and_then(|v| v.as_array())
            .map(|steps| steps.iter().filter_map(|s| s.as_str().map(String::from)).collect())
            .unwrap_or_default();
        let max_steps = arguments
            .get("max_steps")
            .and_then(|v| v.as_u64())
            .map_or(DEFAULT_MAX_STEPS, |n| n as usize);
        let include_risks = arguments
            .get("include_risks")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        let plan = Plan::build(goal, &seed, max_steps, include_risks);
        let data = serde_json::to_value(&plan).unwrap_or_default();
        Ok(ToolResult::ok(plan.render()).with_data(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn plain_goal_gets_base_steps() {
        let plan = Plan::build("organise the offsite", &[], 8, true);
        assert_eq!(plan.steps.len(), BASE_STEPS.len());
        assert_eq!(plan.steps[0], BASE_STEPS[0]);
        assert_eq!(plan.risks.len(), 3);
        assert_eq!(plan.checklist.last().map(String::as_str), Some("Add measurable checkpoints for each step."));
    }

    #[test]
    fn domain_keywords_add_steps_up_to_the_cap() {
        let plan = Plan::build("Fix the login bug", &[], 8, true);
        assert_eq!(plan.steps.len(), 8);
        assert_eq!(plan.steps[5], "Reproduce the issue and capture inputs/logs.");

        let plan = Plan::build("Fix the login bug", &[], 0, true);
        assert_eq!(plan.steps.len(), 1);
    }

    #[test]
    fn seed_steps_are_deduplicated() {
        let seed = vec![
            "Pin data sources and filters.".to_string(),
            "  pin DATA sources and filters.  ".to_string(),
            String::new(),
        ];
        let plan = Plan::build("monthly report", &seed, 10, false);
        assert_eq!(
            plan.steps,
            vec![
                "Pin data sources and filters.",
                "Compute/validate metrics on a small sample.",
                "Summarize findings with assumptions and next steps.",
            ]
        );
        assert!(plan.risks.is_empty());
    }

    #[test]
    fn sensitive_goals_add_risks_and_checks() {
        let plan = Plan::build("verify auth changes before production deploy", &[], 8, true);
        assert!(plan.risks.iter().any(|r| r.starts_with("Impact to production")));
        assert!(plan.risks.iter().any(|r| r.starts_with("Security/privacy")));
        assert!(plan.checklist.iter().any(|c| c.starts_with("Enumerate test cases")));
    }

    #[tokio::test]
    async fn execute_renders_plan() {
        let result = PlanningTool
            .execute(args(serde_json::json!({"query": "build a CSV export feature", "max_steps": 6})))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.starts_with("Plan for: build a CSV export feature\n1. Clarify"));
        assert!(result.output.contains("6. Define acceptance criteria and edge cases."));
        assert!(result.output.contains("\nRisks:\n"));
        assert_eq!(result.data.unwrap()["steps"].as_array().map(Vec::len), Some(6));
    }
}
