use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use synapse_core::{Context, Params};
use uuid::Uuid;

/// Lifecycle status of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Planning,
    Executing,
    Completed,
    Failed,
    Rethinking,
    SelfImproving,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Planning => write!(f, "planning"),
            TaskStatus::Executing => write!(f, "executing"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Rethinking => write!(f, "rethinking"),
            TaskStatus::SelfImproving => write!(f, "self_improving"),
        }
    }
}

/// Status of a single step inside a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Where a step came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "kind", content = "source")]
pub enum StepOrigin {
    /// Produced by the decomposer at plan time.
    #[default]
    Planned,
    /// Appended at runtime by the named follow-up rule.
    AutoGenerated(String),
    /// Planned step moved to another tool during recovery; holds the
    /// originally planned tool.
    Rebound(String),
}

/// An atomic unit of work bound to one tool and one parameter set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub tool: String,
    pub params: Params,
    pub dependencies: Vec<String>,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub reasoning: String,
    #[serde(default)]
    pub origin: StepOrigin,
    /// Number of times the executor has been invoked for this step.
    #[serde(default)]
    pub attempts: u32,
}

impl Step {
    pub fn new(
        id: impl Into<String>,
        tool: impl Into<String>,
        params: Params,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            params,
            dependencies: Vec::new(),
            status: StepStatus::Pending,
            result: None,
            error: None,
            reasoning: reasoning.into(),
            origin: StepOrigin::Planned,
            attempts: 0,
        }
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_origin(mut self, origin: StepOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// True when the step is pending or failed and every dependency names a
    /// completed step. A dependency id that names no step keeps the step
    /// unrunnable.
    pub fn is_ready(&self, steps: &[Step]) -> bool {
        matches!(self.status, StepStatus::Pending | StepStatus::Failed)
            && self.dependencies.iter().all(|dep| {
                steps
                    .iter()
                    .find(|s| &s.id == dep)
                    .is_some_and(|s| s.status == StepStatus::Completed)
            })
    }

    /// Marks the step completed without running it.
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.status = StepStatus::Completed;
        self.result = Some(serde_json::json!({
            "skipped": true,
            "reason": reason.into(),
        }));
    }

    /// True when the step was completed by [`Step::skip`].
    pub fn is_skipped(&self) -> bool {
        self.status == StepStatus::Completed
            && self
                .result
                .as_ref()
                .and_then(|r| r.get("skipped"))
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }
}

/// An ordered, dynamically extensible collection of steps working toward one
/// described goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub steps: Vec<Step>,
    pub context: Context,
    pub status: TaskStatus,
    /// Results of completed steps keyed by step id.
    pub results: Map<String, Value>,
    pub errors: Vec<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub improvement_attempts: u32,
    /// Highest progress ever reported for this task.
    #[serde(default)]
    pub progress_high_water: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        description: impl Into<String>,
        context: Context,
        steps: Vec<Step>,
        max_retries: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: format!("task_{}", Uuid::new_v4().simple()),
            description: description.into(),
            steps,
            context,
            status: TaskStatus::Planning,
            results: Map::new(),
            errors: Vec::new(),
            retry_count: 0,
            max_retries,
            improvement_attempts: 0,
            progress_high_water: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// True while any step is still pending or running.
    pub fn has_incomplete_steps(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s.status, StepStatus::Pending | StepStatus::Running))
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_skipped()).count()
    }

    /// Number of steps that list `id` among their dependencies.
    pub fn dependents_of(&self, id: &str) -> usize {
        self.steps
            .iter()
            .filter(|s| s.dependencies.iter().any(|d| d == id))
            .count()
    }

    /// The most recently completed step by list order.
    pub fn last_completed(&self) -> Option<&Step> {
        self.steps
            .iter()
            .rev()
            .find(|s| s.status == StepStatus::Completed)
    }

    /// Raw completion percentage; 100 for a task with no steps.
    pub fn progress(&self) -> f64 {
        if self.steps.is_empty() {
            return 100.0;
        }
        self.count(StepStatus::Completed) as f64 / self.steps.len() as f64 * 100.0
    }

    /// Progress as reported to callers: never below a value reported earlier,
    /// even after follow-up steps grow the step list.
    pub fn reported_progress(&mut self) -> f64 {
        self.progress_high_water = self.progress_high_water.max(self.progress());
        self.progress_high_water
    }

    pub fn all_steps_completed(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }

    pub fn retry_budget_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Status reported to callers. Adds `planned` to the task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Planned,
    Executing,
    Completed,
    Failed,
    Rethinking,
    SelfImproving,
}

impl From<TaskStatus> for ResponseStatus {
    fn from(status: TaskStatus) -> Self {
        match status {
            // A task still in planning has only been planned from the caller's view.
            TaskStatus::Planning => ResponseStatus::Planned,
            TaskStatus::Executing => ResponseStatus::Executing,
            TaskStatus::Completed => ResponseStatus::Completed,
            TaskStatus::Failed => ResponseStatus::Failed,
            TaskStatus::Rethinking => ResponseStatus::Rethinking,
            TaskStatus::SelfImproving => ResponseStatus::SelfImproving,
        }
    }
}

/// Structured response returned by planning and execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CognitiveResponse {
    pub task_id: String,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    /// Completion percentage in `0..=100`.
    pub progress: f64,
    pub results: Map<String, Value>,
    pub next_actions: Vec<String>,
    pub reasoning: String,
    #[serde(default)]
    pub errors: Vec<String>,
}
