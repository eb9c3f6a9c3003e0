//! Self-improvement: acquiring or upgrading a tool in response to a failure.
//!
//! The engine consults a [`SelfImprovement`] capability before falling back
//! to parameter-level retry heuristics. The default capability,
//! [`RegistryImprovementEngine`], diagnoses missing capabilities from task
//! keywords and "creates" tools by registering implementations in a
//! [`ToolRegistry`].

use crate::registry::{GeneratedTool, ToolRegistry};
use crate::types::{Step, Task};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use synapse_core::SynapseResult;
use tracing::{info, warn};

/// Kind of upgrade requested for an existing tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementCategory {
    OptimizePerformance,
    AddErrorHandling,
    AddLogging,
}

impl ImprovementCategory {
    /// Derives the category from failure text, if any applies.
    pub fn from_failure(message: &str) -> Option<Self> {
        let lower = message.to_lowercase();
        if lower.contains("timeout") || lower.contains("slow") {
            Some(ImprovementCategory::OptimizePerformance)
        } else if lower.contains("error") || lower.contains("exception") {
            Some(ImprovementCategory::AddErrorHandling)
        } else if lower.contains("debug") || lower.contains("trace") {
            Some(ImprovementCategory::AddLogging)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ImprovementCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImprovementCategory::OptimizePerformance => write!(f, "optimize_performance"),
            ImprovementCategory::AddErrorHandling => write!(f, "add_error_handling"),
            ImprovementCategory::AddLogging => write!(f, "add_logging"),
        }
    }
}

/// Description of a tool to be created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON-schema-like description of accepted parameters.
    pub parameters: Value,
    pub category: String,
    /// Values accepted for the `action` parameter.
    pub actions: Vec<String>,
}

/// A missing-capability diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementAnalysis {
    pub missing_capability: String,
    pub suggested_tool: ToolDefinition,
    /// Confidence in `0..=1`.
    pub confidence: f64,
    pub reasoning: String,
}

/// The capability consulted when a step fails.
#[async_trait]
pub trait SelfImprovement: Send + Sync {
    /// Diagnoses which capability the failed task was missing.
    async fn analyze_failure(
        &self,
        description: &str,
        reason: &str,
        available_tools: &[String],
    ) -> SynapseResult<Option<ImprovementAnalysis>>;

    /// Makes the suggested tool available. Returns whether it now exists.
    async fn create_tool(&self, definition: &ToolDefinition) -> SynapseResult<bool>;

    /// Applies an improvement to an existing tool. Returns whether it applied.
    async fn improve_tool(&self, name: &str, category: ImprovementCategory) -> SynapseResult<bool>;
}

/// Result of one self-improvement attempt.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImprovementOutcome {
    pub improved: bool,
    pub reasoning: String,
    /// Tool created for the step; the step should be rebound to it.
    pub new_tool: Option<String>,
    /// Existing tool that was upgraded in place.
    pub tool_modified: Option<String>,
}

impl ImprovementOutcome {
    fn unimproved(reasoning: impl Into<String>) -> Self {
        Self {
            improved: false,
            reasoning: reasoning.into(),
            ..Default::default()
        }
    }
}

/// Runs one self-improvement attempt for a failed step.
///
/// Never fails: capability errors become an unimproved outcome whose
/// reasoning carries the error message.
pub async fn attempt_self_improvement(
    improver: &dyn SelfImprovement,
    task: &Task,
    step: &Step,
    failure: &str,
    available_tools: &[String],
    confidence_threshold: f64,
) -> ImprovementOutcome {
    match try_improve(
        improver,
        task,
        step,
        failure,
        available_tools,
        confidence_threshold,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(task_id = %task.id, step_id = %step.id, error = %e, "Self-improvement failed");
            ImprovementOutcome::unimproved(format!("Self-improvement failed: {e}"))
        }
    }
}

async fn try_improve(
    improver: &dyn SelfImprovement,
    task: &Task,
    step: &Step,
    failure: &str,
    available_tools: &[String],
    confidence_threshold: f64,
) -> SynapseResult<ImprovementOutcome> {
    let analysis = improver
        .analyze_failure(&task.description, failure, available_tools)
        .await?;

    if let Some(analysis) = analysis {
        if analysis.confidence > confidence_threshold
            && improver.create_tool(&analysis.suggested_tool).await?
        {
            let name = analysis.suggested_tool.name.clone();
            info!(task_id = %task.id, step_id = %step.id, tool = %name, "Created tool for failed step");
            return Ok(ImprovementOutcome {
                improved: true,
                reasoning: format!(
                    "Created new tool '{name}' to handle {}",
                    analysis.missing_capability
                ),
                new_tool: Some(name),
                tool_modified: None,
            });
        }
    }

    if available_tools.iter().any(|t| t == &step.tool) {
        if let Some(category) = ImprovementCategory::from_failure(failure) {
            if improver.improve_tool(&step.tool, category).await? {
                info!(task_id = %task.id, tool = %step.tool, %category, "Improved existing tool");
                return Ok(ImprovementOutcome {
                    improved: true,
                    reasoning: format!("Improved existing tool '{}' with {category}", step.tool),
                    new_tool: None,
                    tool_modified: Some(step.tool.clone()),
                });
            }
        }
    }

    Ok(ImprovementOutcome::unimproved(
        "Self-improvement attempt unsuccessful",
    ))
}

/// Keyword-driven capability backed by a [`ToolRegistry`].
pub struct RegistryImprovementEngine {
    registry: Arc<ToolRegistry>,
}

impl RegistryImprovementEngine {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }
}

struct CapabilityRule {
    keywords: &'static [&'static str],
    capability: &'static str,
    tool: &'static str,
    description: &'static str,
    category: &'static str,
    actions: &'static [&'static str],
    confidence: f64,
    reasoning: &'static str,
}

const CAPABILITY_RULES: &[CapabilityRule] = &[
    CapabilityRule {
        keywords: &["api", "rest", "graphql"],
        capability: "API Integration",
        tool: "api_client",
        description: "Advanced API client for REST, GraphQL, and webhook integrations",
        category: "integration",
        actions: &["get", "post", "put", "delete", "graphql", "webhook"],
        confidence: 0.9,
        reasoning: "Task requires API integration capabilities not available in current toolset",
    },
    CapabilityRule {
        keywords: &["file", "document", "pdf"],
        capability: "File Processing",
        tool: "file_processor",
        description: "Advanced file processing for documents, PDFs, images, and archives",
        category: "utility",
        actions: &["read", "convert", "extract", "compress", "merge"],
        confidence: 0.85,
        reasoning: "Task requires file processing capabilities beyond current scope",
    },
    CapabilityRule {
        keywords: &["ml", "model", "train"],
        capability: "Machine Learning",
        tool: "ml_engine",
        description: "Machine learning model training, inference, and optimization",
        category: "ai",
        actions: &["train", "predict", "evaluate", "optimize"],
        confidence: 0.8,
        reasoning: "Task requires machine learning capabilities not in current toolset",
    },
];

impl CapabilityRule {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.tool.to_string(),
            description: self.description.to_string(),
            parameters: json!({
                "action": { "type": "string", "enum": self.actions },
            }),
            category: self.category.to_string(),
            actions: self.actions.iter().map(|a| (*a).to_string()).collect(),
        }
    }
}

fn generic_analysis() -> ImprovementAnalysis {
    ImprovementAnalysis {
        missing_capability: "Unknown".into(),
        suggested_tool: ToolDefinition {
            name: "generic_tool".into(),
            description: "Generic tool for unidentified capabilities".into(),
            parameters: json!({ "action": { "type": "string" }, "params": { "type": "object" } }),
            category: "utility".into(),
            actions: Vec::new(),
        },
        confidence: 0.3,
        reasoning: "Could not identify specific missing capability".into(),
    }
}

#[async_trait]
impl SelfImprovement for RegistryImprovementEngine {
    async fn analyze_failure(
        &self,
        description: &str,
        _reason: &str,
        available_tools: &[String],
    ) -> SynapseResult<Option<ImprovementAnalysis>> {
        let lower = description.to_lowercase();
        let analysis = CAPABILITY_RULES
            .iter()
            .find(|rule| {
                rule.keywords.iter().any(|k| lower.contains(k))
                    && !available_tools.iter().any(|t| t == rule.tool)
            })
            .map(|rule| ImprovementAnalysis {
                missing_capability: rule.capability.to_string(),
                suggested_tool: rule.definition(),
                confidence: rule.confidence,
                reasoning: rule.reasoning.to_string(),
            })
            .unwrap_or_else(generic_analysis);
        Ok(Some(analysis))
    }

    async fn create_tool(&self, definition: &ToolDefinition) -> SynapseResult<bool> {
        self.registry
            .register(Arc::new(GeneratedTool::new(definition.clone())))
            .await;
        Ok(true)
    }

    async fn improve_tool(&self, name: &str, category: ImprovementCategory) -> SynapseResult<bool> {
        Ok(self.registry.record_improvement(name, category).await)
    }
}
