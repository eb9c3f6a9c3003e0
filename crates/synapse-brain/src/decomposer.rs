//! Keyword-driven task decomposition.
//!
//! A description is matched against a fixed rule table in registration order.
//! Every matching rule contributes one step, so a single description can
//! produce several steps. Decomposition is a pure function of the description
//! and context.

use crate::types::Step;
use serde_json::{json, Value};
use synapse_core::{Context, Params};

/// Template that binds a step to the output of the step planned before it.
pub const PREVIOUS_RESULT: &str = "${previous.result}";

/// Template filled from the task context at execution time.
const IMAGE_URL: &str = "${image_url}";

/// One entry of the decomposition table.
pub struct DecompositionRule {
    /// Step id produced by this rule.
    pub id: &'static str,
    pub tool: &'static str,
    pub reasoning: &'static str,
    /// Whether the step consumes the previously planned step's result.
    pub chains_previous: bool,
    matches: fn(&str) -> bool,
    params: fn(&str, &Context) -> Params,
}

impl DecompositionRule {
    /// Evaluates the rule against an already lower-cased description.
    pub fn matches(&self, lower: &str) -> bool {
        (self.matches)(lower)
    }

    fn build(&self, description: &str, context: &Context, previous: Option<&str>) -> Step {
        let deps = match (self.chains_previous, previous) {
            (true, Some(prev)) => vec![prev.to_string()],
            _ => Vec::new(),
        };
        Step::new(
            self.id,
            self.tool,
            (self.params)(description, context),
            self.reasoning,
        )
        .with_dependencies(deps)
    }
}

fn any_of(lower: &str, words: &[&str]) -> bool {
    words.iter().any(|w| lower.contains(w))
}

fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}

/// The decomposition table, evaluated top to bottom.
pub const RULES: &[DecompositionRule] = &[
    DecompositionRule {
        id: "web_fetch",
        tool: "web_intelligence",
        reasoning: "Detected need for web data gathering based on keywords",
        chains_previous: false,
        matches: |l| any_of(l, &["web", "fetch", "scrape", "online"]),
        params: |d, ctx| params(json!({"action": "fetch", "query": d, "context": ctx})),
    },
    DecompositionRule {
        id: "cognitive_search",
        tool: "cognitive_search",
        reasoning: "Detected need for intelligent search and research capabilities",
        chains_previous: false,
        matches: |l| any_of(l, &["search", "find", "research", "investigate"]),
        params: |d, _| params(json!({"action": "search", "query": d})),
    },
    DecompositionRule {
        id: "fact_check",
        tool: "cognitive_search",
        reasoning: "Fact-checking required for information verification",
        chains_previous: false,
        matches: |l| any_of(l, &["fact", "verify", "truth", "check"]),
        params: |d, _| params(json!({"action": "fact_check", "query": d})),
    },
    DecompositionRule {
        id: "trend_analysis",
        tool: "cognitive_search",
        reasoning: "Trend analysis needed to understand current patterns",
        chains_previous: false,
        matches: |l| any_of(l, &["trend", "popular", "trending"]),
        params: |d, _| params(json!({"action": "trend_analysis", "query": d})),
    },
    DecompositionRule {
        id: "data_analysis",
        tool: "analytics_brain",
        reasoning: "Statistical analysis required for data insights",
        chains_previous: true,
        matches: |l| any_of(l, &["analyze", "statistical", "correlation", "data"]),
        params: |_, _| params(json!({"action": "analyze", "data": PREVIOUS_RESULT})),
    },
    DecompositionRule {
        id: "forecast_analysis",
        tool: "analytics_brain",
        reasoning: "Forecasting analysis needed for future predictions",
        chains_previous: true,
        matches: |l| any_of(l, &["forecast", "predict", "future"]),
        params: |_, _| {
            params(json!({
                "action": "forecast",
                "data": PREVIOUS_RESULT,
                "options": {"time_window": "30"},
            }))
        },
    },
    DecompositionRule {
        id: "anomaly_detection",
        tool: "analytics_brain",
        reasoning: "Anomaly detection needed to identify unusual patterns",
        chains_previous: true,
        matches: |l| any_of(l, &["anomaly", "outlier", "unusual"]),
        params: |_, _| params(json!({"action": "anomaly_detect", "data": PREVIOUS_RESULT})),
    },
    DecompositionRule {
        id: "image_analysis",
        tool: "vision_intelligence",
        reasoning: "Image analysis required for visual content understanding",
        chains_previous: false,
        matches: |l| any_of(l, &["image", "photo", "picture", "visual"]),
        params: |_, _| {
            params(json!({
                "action": "analyze",
                "image_url": IMAGE_URL,
                "options": {"extract_text": true, "detect_faces": true},
            }))
        },
    },
    DecompositionRule {
        id: "text_extraction",
        tool: "vision_intelligence",
        reasoning: "OCR needed to extract text from visual content",
        chains_previous: false,
        matches: |l| l.contains("ocr") || (l.contains("text") && any_of(l, &["extract", "read"])),
        params: |_, _| {
            params(json!({
                "action": "ocr",
                "image_url": IMAGE_URL,
                "options": {"language": "en"},
            }))
        },
    },
    DecompositionRule {
        id: "chart_analysis",
        tool: "vision_intelligence",
        reasoning: "Chart analysis needed to extract structured data from visuals",
        chains_previous: false,
        matches: |l| any_of(l, &["chart", "graph", "table"]),
        params: |_, _| {
            params(json!({
                "action": "extract_data",
                "image_url": IMAGE_URL,
                "options": {"analyze_charts": true},
            }))
        },
    },
    DecompositionRule {
        id: "data_transform",
        tool: "transform_data",
        reasoning: "Data transformation needed for optimal processing",
        chains_previous: true,
        matches: |l| any_of(l, &["transform", "convert", "format"]),
        params: |_, _| {
            params(json!({
                "data": PREVIOUS_RESULT,
                "from_format": "json",
                "to_format": "json",
            }))
        },
    },
];

/// Turns free text into an ordered list of steps.
pub struct TaskDecomposer {
    rules: &'static [DecompositionRule],
}

impl TaskDecomposer {
    pub fn new() -> Self {
        Self { rules: RULES }
    }

    /// Produces at least one step for any description.
    pub fn decompose(&self, description: &str, context: &Context) -> Vec<Step> {
        let lower = description.to_lowercase();
        let mut steps: Vec<Step> = Vec::new();

        for rule in self.rules.iter().filter(|r| r.matches(&lower)) {
            let previous = steps.last().map(|s| s.id.as_str());
            let step = rule.build(description, context, previous);
            steps.push(step);
        }

        if steps.len() > 1 {
            let all_ids = steps.iter().map(|s| s.id.clone()).collect();
            steps.push(
                Step::new(
                    "summary",
                    "log_message",
                    params(json!({
                        "message": "Task completed with cognitive orchestration",
                        "level": "info",
                    })),
                    "Summary step for cognitive closure and result presentation",
                )
                .with_dependencies(all_ids),
            );
        }

        if steps.is_empty() {
            steps.push(Step::new(
                "direct_execution",
                "log_message",
                params(json!({"message": description, "level": "info"})),
                "Direct execution as no complex patterns detected",
            ));
        }

        steps
    }
}

impl Default for TaskDecomposer {
    fn default() -> Self {
        Self::new()
    }
}
