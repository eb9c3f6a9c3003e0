use crate::config::EngineConfig;
use crate::decomposer::TaskDecomposer;
use crate::executor::ToolExecutor;
use crate::improvement::{attempt_self_improvement, RegistryImprovementEngine, SelfImprovement};
use crate::mutator::StepMutator;
use crate::registry::ToolRegistry;
use crate::rethink::{rethink, unavailable_skip, RethinkVerdict};
use crate::store::{InMemoryTaskStore, TaskStore};
use crate::template::enrich_params;
use crate::types::{
    CognitiveResponse, ResponseStatus, StepOrigin, StepStatus, Task, TaskStatus,
};
use parking_lot::RwLock;
use serde_json::Map;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use synapse_core::{Context, SynapseError, SynapseResult};
use tracing::{debug, error, info, warn};

/// The cognitive task engine.
/// Implements the plan → execute → recover pattern over a task store.
pub struct CognitiveEngine {
    store: Arc<dyn TaskStore>,
    improver: Arc<dyn SelfImprovement>,
    decomposer: TaskDecomposer,
    mutator: StepMutator,
    config: EngineConfig,
    available_tools: RwLock<BTreeSet<String>>,
    autonomous_mode: AtomicBool,
}

impl CognitiveEngine {
    /// Create an engine with an in-memory store whose self-improvement
    /// registers new tools in `registry`. Tools already registered are
    /// known from the start.
    pub async fn new(config: EngineConfig, registry: Arc<ToolRegistry>) -> Self {
        let engine = Self::with_parts(
            config,
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(RegistryImprovementEngine::new(registry.clone())),
        );
        for name in registry.names().await {
            engine.add_dynamic_tool(&name);
        }
        engine
    }

    /// Create with a custom store and self-improvement capability.
    pub fn with_parts(
        config: EngineConfig,
        store: Arc<dyn TaskStore>,
        improver: Arc<dyn SelfImprovement>,
    ) -> Self {
        let available_tools: BTreeSet<String> = config.initial_tools().collect();
        let autonomous = config.autonomous_mode;
        Self {
            store,
            improver,
            decomposer: TaskDecomposer::new(),
            mutator: StepMutator::new(config.max_steps),
            config,
            available_tools: RwLock::new(available_tools),
            autonomous_mode: AtomicBool::new(autonomous),
        }
    }

    /// Decompose a description into a planned task and store it.
    pub async fn plan_task(
        &self,
        description: &str,
        context: Context,
    ) -> SynapseResult<CognitiveResponse> {
        let steps = self.decomposer.decompose(description, &context);
        let task = Task::new(description, context, steps, self.config.max_retries);

        info!(
            task_id = %task.id,
            step_count = task.steps.len(),
            "Planned task"
        );

        let response = CognitiveResponse {
            task_id: task.id.clone(),
            status: ResponseStatus::Planned,
            current_step: None,
            progress: 0.0,
            results: Map::new(),
            next_actions: task.steps.iter().map(|s| s.reasoning.clone()).collect(),
            reasoning: format!(
                "Decomposed task into {} steps based on cognitive analysis",
                task.steps.len()
            ),
            errors: Vec::new(),
        };

        self.store.insert(task).await?;
        Ok(response)
    }

    /// Run a planned task's steps against `executor` until nothing more can
    /// make progress.
    ///
    /// Fails only when the task cannot be loaded. Any other failure is reported in a
    /// `failed` response.
    pub async fn execute_task<E>(
        &self,
        task_id: &str,
        executor: &E,
    ) -> SynapseResult<CognitiveResponse>
    where
        E: ToolExecutor + ?Sized,
    {
        let mut task = self
            .store
            .get(task_id)
            .await?
            .ok_or_else(|| SynapseError::TaskNotFound(task_id.to_string()))?;

        info!(task_id = %task.id, steps = task.steps.len(), "Executing task");

        let outcome = match self.run_steps(&mut task, executor).await {
            Ok(()) => {
                finalize_status(&mut task);
                let response = build_response(&mut task);
                self.store.update(&task).await.map(|()| response)
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(response) => {
                info!(
                    task_id = %task.id,
                    status = %task.status,
                    progress = response.progress,
                    "Task execution finished"
                );
                Ok(response)
            }
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Task execution failed");
                task.status = TaskStatus::Failed;
                task.errors.push(e.to_string());
                task.touch();
                if let Err(store_err) = self.store.update(&task).await {
                    warn!(task_id = %task.id, error = %store_err, "Failed to persist failed task");
                }
                Ok(failure_response(&task))
            }
        }
    }

    pub async fn get_task(&self, task_id: &str) -> SynapseResult<Option<Task>> {
        self.store.get(task_id).await
    }

    pub fn set_autonomous_mode(&self, enabled: bool) {
        info!(enabled, "Autonomous mode updated");
        self.autonomous_mode.store(enabled, Ordering::Relaxed);
    }

    pub fn autonomous_mode(&self) -> bool {
        self.autonomous_mode.load(Ordering::Relaxed)
    }

    /// Register a tool name as available to diagnosis and recovery.
    pub fn add_dynamic_tool(&self, name: &str) {
        if self.available_tools.write().insert(name.to_string()) {
            info!(tool = %name, "Added dynamic tool");
        }
    }

    /// Sorted snapshot of known tool names.
    pub fn available_tools(&self) -> Vec<String> {
        self.available_tools.read().iter().cloned().collect()
    }

    async fn run_steps<E>(&self, task: &mut Task, executor: &E) -> SynapseResult<()>
    where
        E: ToolExecutor + ?Sized,
    {
        task.status = TaskStatus::Executing;
        task.touch();
        self.store.update(task).await?;

        let max_failures = self.config.max_continuous_failures;
        let mut continuous_failures = 0u32;

        while (task.has_incomplete_steps() || task.count(StepStatus::Failed) > 0)
            && continuous_failures < max_failures
        {
            let mut executed = false;
            // Steps appended during this pass wait for the next one.
            let snapshot_len = task.steps.len();

            for index in 0..snapshot_len {
                if continuous_failures >= max_failures {
                    break;
                }
                if !task.steps[index].is_ready(&task.steps) {
                    continue;
                }
                executed = true;
                self.run_step(task, index, executor, &mut continuous_failures)
                    .await?;
                task.touch();
                self.store.update(task).await?;
            }

            if !executed {
                debug!(task_id = %task.id, "No runnable steps left in pass");
                break;
            }
        }

        Ok(())
    }

    async fn run_step<E>(
        &self,
        task: &mut Task,
        index: usize,
        executor: &E,
        continuous_failures: &mut u32,
    ) -> SynapseResult<()>
    where
        E: ToolExecutor + ?Sized,
    {
        task.steps[index].status = StepStatus::Running;
        task.steps[index].attempts += 1;
        let params = enrich_params(&task.steps[index].params, task);
        let tool = task.steps[index].tool.clone();
        let step_id = task.steps[index].id.clone();

        debug!(task_id = %task.id, step_id = %step_id, tool = %tool, "Running step");

        match executor.execute(&tool, params).await {
            Ok(result) => {
                let step = &mut task.steps[index];
                step.status = StepStatus::Completed;
                step.error = None;
                step.result = Some(result.clone());
                task.results.insert(step_id.clone(), result);
                *continuous_failures = 0;

                info!(task_id = %task.id, step_id = %step_id, tool = %tool, "Step completed");

                let appended = self.mutator.apply(task, &step_id);
                if !appended.is_empty() {
                    info!(
                        task_id = %task.id,
                        step_id = %step_id,
                        follow_ups = appended.len(),
                        "Appended follow-up steps"
                    );
                }
                Ok(())
            }
            Err(e) => {
                let failure = e.failure_message();
                let step = &mut task.steps[index];
                step.status = StepStatus::Failed;
                step.error = Some(failure.clone());
                *continuous_failures += 1;

                warn!(
                    task_id = %task.id,
                    step_id = %step_id,
                    tool = %tool,
                    error = %failure,
                    continuous_failures = *continuous_failures,
                    "Step failed"
                );

                self.recover(task, index, &failure, continuous_failures)
                    .await
            }
        }
    }

    async fn recover(
        &self,
        task: &mut Task,
        index: usize,
        failure: &str,
        continuous_failures: &mut u32,
    ) -> SynapseResult<()> {
        if let Some(verdict) = unavailable_skip(failure) {
            apply_verdict(task, index, failure, verdict, continuous_failures);
            return Ok(());
        }

        if self.config.self_improvement_enabled
            && task.improvement_attempts < self.config.max_improvement_attempts
        {
            task.status = TaskStatus::SelfImproving;
            self.store.update(task).await?;

            let tools = self.available_tools();
            let outcome = attempt_self_improvement(
                self.improver.as_ref(),
                task,
                &task.steps[index],
                failure,
                &tools,
                self.config.improvement_confidence_threshold,
            )
            .await;
            task.status = TaskStatus::Executing;

            if outcome.improved {
                if let Some(new_tool) = &outcome.new_tool {
                    self.add_dynamic_tool(new_tool);
                }
                task.improvement_attempts += 1;
                let step = &mut task.steps[index];
                if let Some(new_tool) = outcome.new_tool {
                    let previous = std::mem::replace(&mut step.tool, new_tool);
                    if step.origin == StepOrigin::Planned {
                        step.origin = StepOrigin::Rebound(previous);
                    }
                }
                step.status = StepStatus::Pending;
                step.reasoning = outcome.reasoning;
                *continuous_failures = 0;

                info!(task_id = %task.id, step_id = %step.id, tool = %step.tool, "Step recovered by self-improvement");
                return Ok(());
            }
            debug!(task_id = %task.id, reasoning = %outcome.reasoning, "Self-improvement did not help");
        }

        task.status = TaskStatus::Rethinking;
        let verdict = rethink(
            task,
            &task.steps[index],
            failure,
            *continuous_failures,
            &self.config,
        );
        task.status = TaskStatus::Executing;
        apply_verdict(task, index, failure, verdict, continuous_failures);
        Ok(())
    }
}

fn apply_verdict(
    task: &mut Task,
    index: usize,
    failure: &str,
    verdict: RethinkVerdict,
    continuous_failures: &mut u32,
) {
    debug!(task_id = %task.id, step_id = %task.steps[index].id, reasoning = %verdict.reasoning(), "Rethink verdict");
    let step = &mut task.steps[index];
    match verdict {
        RethinkVerdict::Retry {
            params,
            tool,
            reasoning,
        } => {
            if let Some(tool) = tool {
                let previous = std::mem::replace(&mut step.tool, tool);
                if step.origin == StepOrigin::Planned {
                    step.origin = StepOrigin::Rebound(previous);
                }
            }
            step.params = params;
            step.status = StepStatus::Pending;
            step.reasoning = reasoning;
            task.retry_count += 1;
            debug!(task_id = %task.id, step_id = %task.steps[index].id, "Step scheduled for retry");
        }
        RethinkVerdict::Skip { reason, reasoning } => {
            info!(task_id = %task.id, step_id = %step.id, reason = %reason, "Skipping step");
            step.skip(reason);
            step.reasoning = reasoning;
            *continuous_failures = 0;
        }
        RethinkVerdict::GiveUp { reasoning } => {
            error!(task_id = %task.id, step_id = %step.id, error = %failure, "Giving up on step");
            step.reasoning = reasoning;
            let message = format!("Step {} failed: {failure}", step.id);
            task.errors.push(message);
        }
    }
}

fn finalize_status(task: &mut Task) {
    task.status = if task.all_steps_completed() {
        TaskStatus::Completed
    } else if !task.errors.is_empty() && task.retry_budget_exhausted() {
        TaskStatus::Failed
    } else {
        TaskStatus::Executing
    };
    task.touch();
}

fn build_response(task: &mut Task) -> CognitiveResponse {
    CognitiveResponse {
        task_id: task.id.clone(),
        status: task.status.into(),
        current_step: task
            .steps
            .iter()
            .find(|s| s.status == StepStatus::Running)
            .map(|s| s.id.clone()),
        progress: task.reported_progress(),
        results: task.results.clone(),
        next_actions: next_actions(task),
        reasoning: reasoning(task),
        errors: task.errors.clone(),
    }
}

fn failure_response(task: &Task) -> CognitiveResponse {
    CognitiveResponse {
        task_id: task.id.clone(),
        status: ResponseStatus::Failed,
        current_step: None,
        progress: 0.0,
        results: task.results.clone(),
        next_actions: vec!["Task failed - consider replanning".into()],
        reasoning: format!("Task execution failed: {}", task.errors.join(", ")),
        errors: task.errors.clone(),
    }
}

fn next_actions(task: &Task) -> Vec<String> {
    let mut actions = Vec::new();
    let pending = task.count(StepStatus::Pending);
    let failed = task.count(StepStatus::Failed);
    if pending > 0 {
        actions.push(format!("Execute {pending} pending steps"));
    }
    if failed > 0 {
        actions.push(format!("Rethink {failed} failed steps"));
    }
    if task.status == TaskStatus::Completed {
        actions.push("Task completed successfully".into());
    }
    actions
}

fn reasoning(task: &Task) -> String {
    let completed = task.count(StepStatus::Completed);
    let failed = task.count(StepStatus::Failed);
    let skipped = task.skipped_count();

    let mut text = format!(
        "Cognitive analysis: {completed}/{} steps completed",
        task.steps.len()
    );
    if failed > 0 {
        text.push_str(&format!(
            ", {failed} failed (retry count: {}/{})",
            task.retry_count, task.max_retries
        ));
    }
    if skipped > 0 {
        text.push_str(&format!(", {skipped} skipped"));
    }
    if task.improvement_attempts > 0 {
        text.push_str(&format!(
            ", {} self-improvements made",
            task.improvement_attempts
        ));
    }
    text.push_str(match task.status {
        TaskStatus::Completed => ". Task successfully completed through cognitive orchestration.",
        TaskStatus::Failed => ". Task failed after cognitive rethinking attempts.",
        _ => ". Continuing execution with adaptive reasoning.",
    });
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use crate::registry::EchoTool;
    use synapse_core::Params;

    async fn engine() -> CognitiveEngine {
        CognitiveEngine::new(EngineConfig::default(), Arc::new(ToolRegistry::new())).await
    }

    #[tokio::test]
    async fn test_plan_task_response() {
        let engine = engine().await;
        let resp = engine
            .plan_task("fetch data from the web and analyze it", Context::new())
            .await
            .unwrap();

        assert_eq!(resp.status, ResponseStatus::Planned);
        assert_eq!(resp.progress, 0.0);
        assert_eq!(resp.next_actions.len(), 3);
        assert_eq!(
            resp.reasoning,
            "Decomposed task into 3 steps based on cognitive analysis"
        );

        let task = engine.get_task(&resp.task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Planning);
        assert_eq!(task.max_retries, 3);
    }

    #[tokio::test]
    async fn test_execute_unknown_task() {
        let engine = engine().await;
        let exec = |_tool: String, _params: Params| async move { Ok::<_, SynapseError>(json!({})) };
        let err = engine.execute_task("task_missing", &exec).await.unwrap_err();
        assert!(matches!(err, SynapseError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn test_execute_direct_task_completes() {
        let engine = engine().await;
        let registry = ToolRegistry::with_builtins().await;
        let plan = engine.plan_task("", Context::new()).await.unwrap();

        let resp = engine.execute_task(&plan.task_id, &registry).await.unwrap();
        assert_eq!(resp.status, ResponseStatus::Completed);
        assert_eq!(resp.progress, 100.0);
        assert_eq!(resp.next_actions, vec!["Task completed successfully"]);
        assert!(resp.reasoning.starts_with("Cognitive analysis: 1/1 steps completed"));
        assert_eq!(resp.results["direct_execution"]["logged"], json!(true));
    }

    #[tokio::test]
    async fn test_dynamic_tools_and_mode() {
        let engine = engine().await;
        assert!(engine.available_tools().contains(&"log_message".to_string()));
        engine.add_dynamic_tool("api_client");
        assert!(engine.available_tools().contains(&"api_client".to_string()));

        let tools = engine.available_tools();
        let mut sorted = tools.clone();
        sorted.sort();
        assert_eq!(tools, sorted);

        assert!(engine.autonomous_mode());
        engine.set_autonomous_mode(false);
        assert!(!engine.autonomous_mode());
    }

    #[tokio::test]
    async fn test_registry_tools_are_known() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new("pdf_reader"))).await;
        let engine = CognitiveEngine::new(EngineConfig::default(), Arc::new(registry)).await;

        let tools = engine.available_tools();
        assert!(tools.contains(&"pdf_reader".to_string()));
        assert!(tools.contains(&"web_intelligence".to_string()));
    }

    #[tokio::test]
    async fn test_give_up_records_error() {
        let mut config = EngineConfig::default();
        config.self_improvement_enabled = false;
        config.max_retries = 1;
        let engine = CognitiveEngine::new(config, Arc::new(ToolRegistry::new())).await;
        let plan = engine.plan_task("search the archive", Context::new()).await.unwrap();

        let exec = |_tool: String, _params: Params| async move {
            Err::<Value, _>(SynapseError::tool("kaboom"))
        };
        let resp = engine.execute_task(&plan.task_id, &exec).await.unwrap();

        assert_eq!(resp.status, ResponseStatus::Failed);
        assert_eq!(resp.errors, vec!["Step cognitive_search failed: kaboom"]);
        assert_eq!(resp.next_actions, vec!["Rethink 1 failed steps"]);
        assert!(resp.reasoning.contains("1 failed (retry count: 4/1)"));

        let task = engine.get_task(&plan.task_id).await.unwrap().unwrap();
        assert_eq!(task.steps[0].attempts, 5);
        assert_eq!(task.steps[0].reasoning, "Maximum retries exceeded");
    }
}
