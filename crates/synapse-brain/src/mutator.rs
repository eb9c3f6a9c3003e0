//! Follow-up step generation from completed-step results.

use crate::types::{Step, StepOrigin, Task};
use chrono::Utc;
use serde_json::{json, Value};
use synapse_core::Params;
use tracing::debug;

/// A rule that may append one step after another completes.
pub struct FollowUpRule {
    /// Recorded as the generated step's origin.
    pub name: &'static str,
    pub id_prefix: &'static str,
    /// Tool the generated step is bound to.
    pub tool: &'static str,
    pub reasoning: &'static str,
    /// Returns the new step's parameters when the rule applies.
    pub build: fn(&Task, &Step, &Value) -> Option<Params>,
}

fn object(value: Value) -> Option<Params> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn has_step_with_tool(task: &Task, tool: &str) -> bool {
    task.steps.iter().any(|s| s.tool == tool)
}

fn flag(result: &Value, key: &str) -> bool {
    result.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Built-in follow-up rules, evaluated in order.
pub const FOLLOW_UP_RULES: &[FollowUpRule] = &[
    FollowUpRule {
        name: "web_content_analysis",
        id_prefix: "auto_analysis",
        tool: "analytics_brain",
        reasoning: "Auto-generated: Statistical analysis of web intelligence data",
        build: |_, step, result| {
            if step.tool != "web_intelligence" || result.get("content").is_none() {
                return None;
            }
            object(json!({ "action": "analyze", "data": result }))
        },
    },
    FollowUpRule {
        name: "stats_correlation",
        id_prefix: "auto_correlation",
        tool: "analytics_brain",
        reasoning: "Auto-generated: Correlation analysis of statistical results",
        build: |_, step, result| {
            if step.tool != "analytics_brain" {
                return None;
            }
            let data = match result.get("results") {
                Some(nested) if nested.get("descriptive_stats").is_some() => nested,
                _ if result.get("descriptive_stats").is_some() => result,
                _ => return None,
            };
            object(json!({ "action": "correlate", "data": data }))
        },
    },
    FollowUpRule {
        name: "extracted_text_analysis",
        id_prefix: "auto_text_analysis",
        tool: "analytics_brain",
        reasoning: "Auto-generated: Analysis of extracted text data",
        build: |_, step, result| {
            if step.tool != "vision_intelligence" {
                return None;
            }
            let text = result.pointer("/results/text")?;
            object(json!({ "action": "analyze", "data": text }))
        },
    },
    FollowUpRule {
        name: "chart_data_analysis",
        id_prefix: "auto_chart_data",
        tool: "analytics_brain",
        reasoning: "Auto-generated: Statistical analysis of chart data",
        build: |_, step, result| {
            if step.tool != "vision_intelligence" {
                return None;
            }
            let charts = result.pointer("/results/charts")?;
            object(json!({ "action": "analyze", "data": charts }))
        },
    },
    FollowUpRule {
        name: "disputed_fact_check",
        id_prefix: "auto_factcheck",
        tool: "cognitive_search",
        reasoning: "Auto-generated: Additional fact-checking due to disputed information",
        build: |task, step, result| {
            let disputed = result
                .pointer("/analysis/fact_check_status")
                .and_then(Value::as_str)
                == Some("disputed");
            if step.tool != "cognitive_search" || !disputed {
                return None;
            }
            object(json!({ "action": "fact_check", "query": task.description }))
        },
    },
    FollowUpRule {
        name: "requested_analysis",
        id_prefix: "auto_analysis",
        tool: "analytics_brain",
        reasoning: "Auto-generated: Analysis requested by previous result",
        build: |task, _, result| {
            if !flag(result, "requires_analysis") || has_step_with_tool(task, "analytics_brain") {
                return None;
            }
            let data = result.get("data").unwrap_or(result);
            object(json!({ "action": "analyze", "data": data }))
        },
    },
    FollowUpRule {
        name: "requested_verification",
        id_prefix: "auto_verification",
        tool: "cognitive_search",
        reasoning: "Auto-generated: Verification requested by previous result",
        build: |task, _, result| {
            if !flag(result, "needs_verification") || has_step_with_tool(task, "cognitive_search")
            {
                return None;
            }
            let query = result
                .get("content")
                .or_else(|| result.get("data"))
                .cloned()
                .unwrap_or_else(|| json!(task.description));
            object(json!({ "action": "fact_check", "query": query }))
        },
    },
];

/// Appends follow-up steps after a step completes.
pub struct StepMutator {
    rules: &'static [FollowUpRule],
    max_steps: usize,
}

impl StepMutator {
    pub fn new(max_steps: usize) -> Self {
        Self {
            rules: FOLLOW_UP_RULES,
            max_steps,
        }
    }

    /// Applies every matching rule to the completed step `step_id` and
    /// returns the ids of the appended steps.
    ///
    /// A rule never fires on a step it generated itself, and nothing is
    /// appended once the task holds `max_steps` steps.
    pub fn apply(&self, task: &mut Task, step_id: &str) -> Vec<String> {
        let Some(step) = task.step(step_id).cloned() else {
            return Vec::new();
        };
        let Some(result) = step.result.clone() else {
            return Vec::new();
        };

        let mut appended = Vec::new();
        for rule in self.rules {
            if task.steps.len() >= self.max_steps {
                debug!(task_id = %task.id, max_steps = self.max_steps, "Step limit reached, no follow-ups");
                break;
            }
            if step.origin == StepOrigin::AutoGenerated(rule.name.to_string()) {
                continue;
            }
            let Some(params) = (rule.build)(task, &step, &result) else {
                continue;
            };

            let id = format!(
                "{}_{}_{}",
                rule.id_prefix,
                Utc::now().timestamp_millis(),
                task.steps.len()
            );
            debug!(task_id = %task.id, step_id = %id, rule = rule.name, trigger = %step.id, "Appending follow-up step");
            task.steps.push(
                Step::new(id.clone(), rule.tool, params, rule.reasoning)
                    .with_dependencies(vec![step.id.clone()])
                    .with_origin(StepOrigin::AutoGenerated(rule.name.to_string())),
            );
            appended.push(id);
        }
        appended
    }
}
