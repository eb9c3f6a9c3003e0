//! Autonomous rethink: the last line of recovery for a failed step.
//!
//! [`rethink`] is a total function over the failure message. The first
//! matching rule decides whether the step is retried (with adjusted
//! parameters and possibly another tool), skipped, or given up on.

use crate::config::EngineConfig;
use crate::types::{Step, StepStatus, Task};
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;
use synapse_core::Params;

/// Decision produced for a failed step.
#[derive(Debug, Clone, PartialEq)]
pub enum RethinkVerdict {
    /// Run the step again with `params`, rebound to `tool` when set.
    Retry {
        params: Params,
        tool: Option<String>,
        reasoning: String,
    },
    /// Mark the step completed without a real result.
    Skip { reason: String, reasoning: String },
    /// Leave the step failed.
    GiveUp { reasoning: String },
}

impl RethinkVerdict {
    pub fn reasoning(&self) -> &str {
        match self {
            RethinkVerdict::Retry { reasoning, .. }
            | RethinkVerdict::Skip { reasoning, .. }
            | RethinkVerdict::GiveUp { reasoning } => reasoning,
        }
    }
}

const BASE_DELAY_MS: u64 = 1000;
const BASE_TIMEOUT_MS: u64 = 7500;

#[allow(clippy::expect_used)]
static REQUIRED_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([a-zA-Z_]+) parameter required").expect("required-parameter pattern is valid")
});

#[allow(clippy::expect_used)]
static MISSING_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)missing (?:required )?(?:parameter|field)[:\s]+['"`]?([a-zA-Z_]+)"#)
        .expect("missing-parameter pattern is valid")
});

/// Decides how to recover from `failure` on `step`.
///
/// `continuous_failures` is the number of consecutive failures in the
/// current execution, including this one.
pub fn rethink(
    task: &Task,
    step: &Step,
    failure: &str,
    continuous_failures: u32,
    config: &EngineConfig,
) -> RethinkVerdict {
    if let Some(verdict) = unavailable_skip(failure) {
        return verdict;
    }
    let msg = failure.to_lowercase();

    if continuous_failures >= config.escalation_threshold {
        if let Some(verdict) = alternative_approach(task, step, &msg) {
            return verdict;
        }
        if !is_critical(task, step, config) {
            return skip(
                "Non-critical step skipped after multiple failures",
                "Autonomous decision: Skipping to maintain progress",
            );
        }
    }

    if msg.contains("parameter required") || msg.contains("missing") {
        return retry(
            synthesize_params(task, step, failure),
            "Autonomous fix: Generated missing parameters from context",
        );
    }

    if msg.contains("rate limit") || msg.contains("too many requests") {
        let delay = doubled(&step.params, "delay", BASE_DELAY_MS);
        let mut params = step.params.clone();
        params.insert("delay".into(), json!(delay));
        return retry(
            params,
            format!("Autonomous fix: Backing off for {delay}ms before retrying"),
        );
    }

    if msg.contains("network") || msg.contains("timeout") || msg.contains("fetch") {
        let mut params = step.params.clone();
        params.insert(
            "timeout".into(),
            json!(doubled(&step.params, "timeout", BASE_TIMEOUT_MS)),
        );
        params.insert("retries".into(), json!(3));
        params.insert("fallback".into(), json!(true));
        return retry(params, "Autonomous fix: Enhanced network resilience");
    }

    if msg.contains("format") || msg.contains("parse") || msg.contains("invalid") {
        let mut params = step.params.clone();
        params.insert("format".into(), json!("json"));
        params.insert("strict".into(), json!(false));
        params.insert("fallback".into(), json!(true));
        return retry(params, "Autonomous fix: Relaxed format constraints");
    }

    if continuous_failures < config.max_continuous_failures {
        let mut params = step.params.clone();
        params.insert("simplified".into(), json!(true));
        params.insert("autonomous".into(), json!(true));
        return retry(
            params,
            format!(
                "Autonomous retry {continuous_failures}/{}: Progressive simplification",
                config.max_continuous_failures
            ),
        );
    }

    RethinkVerdict::GiveUp {
        reasoning: "Maximum retries exceeded".into(),
    }
}

/// Skip verdict for failures no retry or new tool can fix: missing
/// permissions and missing resources.
pub fn unavailable_skip(failure: &str) -> Option<RethinkVerdict> {
    let msg = failure.to_lowercase();
    if msg.contains("permission") || msg.contains("unauthorized") {
        Some(skip(
            "Insufficient permissions",
            "Autonomous decision: Access denied, skipping step",
        ))
    } else if msg.contains("not found") || msg.contains("404") {
        Some(skip(
            "Resource not available",
            "Autonomous decision: Resource missing, skipping step",
        ))
    } else {
        None
    }
}

fn retry(params: Params, reasoning: impl Into<String>) -> RethinkVerdict {
    RethinkVerdict::Retry {
        params,
        tool: None,
        reasoning: reasoning.into(),
    }
}

fn skip(reason: &str, reasoning: &str) -> RethinkVerdict {
    RethinkVerdict::Skip {
        reason: reason.into(),
        reasoning: reasoning.into(),
    }
}

fn doubled(params: &Params, key: &str, base: u64) -> u64 {
    params
        .get(key)
        .and_then(Value::as_u64)
        .filter(|v| *v > 0)
        .unwrap_or(base)
        .saturating_mul(2)
}

fn alternative_approach(task: &Task, step: &Step, msg: &str) -> Option<RethinkVerdict> {
    let (tool, params, reasoning) = match step.tool.as_str() {
        "web_intelligence" if msg.contains("network") => (
            "cognitive_search",
            json!({
                "action": "search",
                "query": task.description,
                "engines": ["duckduckgo"],
            }),
            "Switched to cognitive_search as alternative to web_intelligence",
        ),
        "cognitive_search" if msg.contains("timeout") => (
            "web_intelligence",
            json!({
                "action": "fetch",
                "query": task.description,
                "options": { "timeout": 5000 },
            }),
            "Switched to web_intelligence with reduced timeout",
        ),
        _ => return None,
    };

    let Value::Object(params) = params else {
        return None;
    };
    Some(RethinkVerdict::Retry {
        params,
        tool: Some(tool.to_string()),
        reasoning: format!("Autonomous rethink: {reasoning}"),
    })
}

fn is_critical(task: &Task, step: &Step, config: &EngineConfig) -> bool {
    config.critical_tools.iter().any(|t| t == &step.tool)
        || task.dependents_of(&step.id) >= config.critical_dependents
}

/// Fills in the parameter named by the failure message, if one is named.
fn synthesize_params(task: &Task, step: &Step, failure: &str) -> Params {
    let mut params = step.params.clone();
    let name = REQUIRED_PARAM
        .captures(failure)
        .or_else(|| MISSING_PARAM.captures(failure))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    if let Some(name) = name {
        let value = match name.as_str() {
            "query" | "description" => json!(task.description),
            "action" => json!(infer_action(&step.tool, &task.description)),
            "data" => earlier_data(task),
            _ => json!("auto-generated"),
        };
        params.insert(name, value);
    }
    params
}

/// Guesses an `action` for a tool from the task description.
pub fn infer_action(tool: &str, description: &str) -> &'static str {
    let lower = description.to_lowercase();
    match tool {
        "web_intelligence" if lower.contains("scrape") => "scrape",
        "web_intelligence" if lower.contains("analyze") => "analyze",
        "web_intelligence" => "fetch",
        "cognitive_search" if lower.contains("fact") => "fact_check",
        "cognitive_search" if lower.contains("trend") => "trend_analysis",
        "cognitive_search" => "search",
        _ => "default",
    }
}

/// The `data` field of the first completed result that carries one.
fn earlier_data(task: &Task) -> Value {
    task.steps
        .iter()
        .filter(|s| s.status == StepStatus::Completed)
        .filter_map(|s| task.results.get(&s.id))
        .filter_map(|r| r.get("data"))
        .find(|d| is_truthy(d))
        .cloned()
        .unwrap_or_else(|| json!({}))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
