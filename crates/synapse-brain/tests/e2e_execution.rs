//! End-to-end execution tests.
//!
//! Drive planned tasks through the engine with scripted executors and check
//! dependency ordering, templating, recovery verdicts and follow-up steps.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use synapse_brain::*;
use synapse_core::{Context, Params, SynapseError, SynapseResult};

type Calls = Arc<Mutex<Vec<(String, Params)>>>;

async fn engine() -> CognitiveEngine {
    CognitiveEngine::new(EngineConfig::default(), Arc::new(ToolRegistry::new())).await
}

/// Executor that records every call and answers with `respond`.
fn recording<F>(
    calls: &Calls,
    respond: F,
) -> impl Fn(String, Params) -> std::future::Ready<SynapseResult<Value>> + Send + Sync
where
    F: Fn(&str, &Params, usize) -> SynapseResult<Value> + Send + Sync,
{
    let calls = calls.clone();
    move |tool: String, params: Params| {
        let mut log = calls.lock().unwrap();
        let result = respond(&tool, &params, log.len());
        log.push((tool, params));
        std::future::ready(result)
    }
}

async fn plan(engine: &CognitiveEngine, description: &str) -> String {
    engine
        .plan_task(description, Context::new())
        .await
        .unwrap()
        .task_id
}

#[tokio::test]
async fn test_web_fetch_then_analysis_in_dependency_order() {
    let engine = engine().await;
    let task_id = plan(&engine, "fetch data from the web and analyze it").await;

    let planned = engine.get_task(&task_id).await.unwrap().unwrap();
    let ids: Vec<&str> = planned.steps.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["web_fetch", "data_analysis", "summary"]);
    assert_eq!(planned.steps[1].dependencies, vec!["web_fetch".to_string()]);

    let calls: Calls = Arc::default();
    let exec = recording(&calls, |tool, _, _| match tool {
        "web_intelligence" => Ok(json!({"content": "page text"})),
        "analytics_brain" => Ok(json!({"summary": "ok"})),
        _ => Ok(json!({"logged": true})),
    });
    let resp = engine.execute_task(&task_id, &exec).await.unwrap();

    assert_eq!(resp.status, ResponseStatus::Completed);
    assert_eq!(resp.progress, 100.0);
    assert!(resp.errors.is_empty());

    let calls = calls.lock().unwrap();
    let tools: Vec<&str> = calls.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(
        tools,
        vec!["web_intelligence", "analytics_brain", "log_message", "analytics_brain"]
    );
    // `${previous.result}` resolved to the fetched page.
    assert_eq!(calls[1].1["data"], json!({"content": "page text"}));

    let task = engine.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.steps.len(), 4);
    let follow_up = &task.steps[3];
    assert_eq!(follow_up.dependencies, vec!["web_fetch".to_string()]);
    assert_eq!(
        follow_up.origin,
        StepOrigin::AutoGenerated("web_content_analysis".into())
    );
}

#[tokio::test]
async fn test_rate_limit_backs_off_then_skips_non_critical_step() {
    let engine = engine().await;
    let task_id = plan(&engine, "forecast sales").await;

    let calls: Calls = Arc::default();
    let exec = recording(&calls, |_, _, _| {
        Err(SynapseError::tool("rate limit exceeded"))
    });
    let resp = engine.execute_task(&task_id, &exec).await.unwrap();

    let delays: Vec<Option<Value>> = calls
        .lock()
        .unwrap()
        .iter()
        .map(|(_, p)| p.get("delay").cloned())
        .collect();
    assert_eq!(delays, vec![None, Some(json!(2000)), Some(json!(4000))]);

    let task = engine.get_task(&task_id).await.unwrap().unwrap();
    assert!(task.steps[0].is_skipped());
    assert_eq!(
        task.steps[0].result.as_ref().unwrap()["reason"],
        json!("Non-critical step skipped after multiple failures")
    );
    assert_eq!(task.retry_count, 2);
    assert_eq!(resp.status, ResponseStatus::Completed);
    assert!(resp.reasoning.contains("1 skipped"));
}

#[tokio::test]
async fn test_critical_step_stops_at_continuous_failure_limit() {
    let engine = engine().await;
    let task_id = plan(&engine, "research competitors").await;

    let calls: Calls = Arc::default();
    let exec = recording(&calls, |_, _, _| {
        Err(SynapseError::tool("rate limit exceeded"))
    });
    let resp = engine.execute_task(&task_id, &exec).await.unwrap();

    assert_eq!(calls.lock().unwrap().len(), 5);
    assert_eq!(resp.status, ResponseStatus::Executing);
    assert_eq!(resp.next_actions, vec!["Execute 1 pending steps"]);

    let task = engine.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.steps[0].status, StepStatus::Pending);
    assert_eq!(task.steps[0].params["delay"], json!(32000));
}

#[tokio::test]
async fn test_permission_denied_skips_once() {
    let engine = engine().await;
    let task_id = plan(&engine, "forecast sales").await;

    let calls: Calls = Arc::default();
    let exec = recording(&calls, |_, _, _| {
        Err(SynapseError::tool("permission denied"))
    });
    let resp = engine.execute_task(&task_id, &exec).await.unwrap();

    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(resp.status, ResponseStatus::Completed);

    let task = engine.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.steps[0].status, StepStatus::Completed);
    assert_eq!(
        task.steps[0].result,
        Some(json!({"skipped": true, "reason": "Insufficient permissions"}))
    );
    assert_eq!(task.retry_count, 0);
}

#[tokio::test]
async fn test_permission_denied_skips_before_self_improvement() {
    let registry = Arc::new(ToolRegistry::new());
    let engine = CognitiveEngine::new(EngineConfig::default(), registry.clone()).await;
    // "html" contains the "ml" capability keyword.
    let task_id = plan(&engine, "fetch the html page").await;

    let calls: Calls = Arc::default();
    let exec = recording(&calls, |_, _, _| {
        Err(SynapseError::tool("permission denied"))
    });
    let resp = engine.execute_task(&task_id, &exec).await.unwrap();

    let tools: Vec<String> = calls.lock().unwrap().iter().map(|(t, _)| t.clone()).collect();
    assert_eq!(tools, vec!["web_intelligence"]);
    assert_eq!(resp.status, ResponseStatus::Completed);
    assert!(!registry.contains("ml_engine").await);

    let task = engine.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.steps[0].tool, "web_intelligence");
    assert_eq!(task.steps[0].origin, StepOrigin::Planned);
    assert_eq!(
        task.steps[0].result.as_ref().unwrap()["reason"],
        json!("Insufficient permissions")
    );
    assert_eq!(task.improvement_attempts, 0);
}

#[tokio::test]
async fn test_not_found_skips() {
    let engine = engine().await;
    let task_id = plan(&engine, "forecast sales").await;
    let calls: Calls = Arc::default();
    let exec = recording(&calls, |_, _, _| {
        Err(SynapseError::tool("HTTP 404: resource not found"))
    });
    engine.execute_task(&task_id, &exec).await.unwrap();

    let task = engine.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(
        task.steps[0].result.as_ref().unwrap()["reason"],
        json!("Resource not available")
    );
}

#[tokio::test]
async fn test_timeout_doubles_then_recovers() {
    let engine = engine().await;
    let task_id = plan(&engine, "forecast sales").await;

    let calls: Calls = Arc::default();
    let exec = recording(&calls, |_, _, n| {
        if n < 2 {
            Err(SynapseError::tool("upstream timeout"))
        } else {
            Ok(json!({"forecast": [1, 2, 3]}))
        }
    });
    let resp = engine.execute_task(&task_id, &exec).await.unwrap();
    assert_eq!(resp.status, ResponseStatus::Completed);

    let timeouts: Vec<Option<Value>> = calls
        .lock()
        .unwrap()
        .iter()
        .map(|(_, p)| p.get("timeout").cloned())
        .collect();
    assert_eq!(timeouts, vec![None, Some(json!(15000)), Some(json!(30000))]);
}

#[tokio::test]
async fn test_empty_description_runs_log_message() {
    let engine = engine().await;
    let task_id = plan(&engine, "").await;

    let planned = engine.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(planned.steps.len(), 1);
    assert_eq!(planned.steps[0].id, "direct_execution");
    assert_eq!(planned.steps[0].tool, "log_message");

    let registry = ToolRegistry::with_builtins().await;
    let resp = engine.execute_task(&task_id, &registry).await.unwrap();
    assert_eq!(resp.status, ResponseStatus::Completed);
}

#[tokio::test]
async fn test_descriptive_stats_append_correlation_step() {
    let engine = engine().await;
    let task_id = plan(&engine, "forecast sales").await;

    let calls: Calls = Arc::default();
    let exec = recording(&calls, |_, _, _| {
        Ok(json!({"results": {"descriptive_stats": {"mean": 3.5}}}))
    });
    let resp = engine.execute_task(&task_id, &exec).await.unwrap();

    let task = engine.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.steps.len(), 2);
    let correlation = &task.steps[1];
    assert_eq!(correlation.params["action"], json!("correlate"));
    assert_eq!(correlation.dependencies, vec!["forecast_analysis".to_string()]);
    assert_eq!(correlation.status, StepStatus::Completed);
    assert_eq!(resp.status, ResponseStatus::Completed);
    assert_eq!(calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_self_improvement_creates_and_rebinds_tool() {
    let registry = Arc::new(ToolRegistry::new());
    let engine = CognitiveEngine::new(EngineConfig::default(), registry.clone()).await;
    let task_id = plan(&engine, "call the payments api").await;

    let calls: Calls = Arc::default();
    let exec = recording(&calls, |tool, _, _| {
        if tool == "log_message" {
            Err(SynapseError::tool("unsupported operation"))
        } else {
            Ok(json!({"status": 200}))
        }
    });
    let resp = engine.execute_task(&task_id, &exec).await.unwrap();

    assert_eq!(resp.status, ResponseStatus::Completed);
    assert!(resp.reasoning.contains("1 self-improvements made"));
    assert!(registry.contains("api_client").await);
    assert!(engine.available_tools().contains(&"api_client".to_string()));

    let task = engine.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.improvement_attempts, 1);
    assert_eq!(task.steps[0].tool, "api_client");
    assert_eq!(task.steps[0].origin, StepOrigin::Rebound("log_message".into()));
    assert_eq!(task.retry_count, 0);
}

#[tokio::test]
async fn test_registered_tool_is_not_recreated() {
    let registry = Arc::new(ToolRegistry::new());
    registry.register(Arc::new(EchoTool::new("api_client"))).await;
    let engine = CognitiveEngine::new(EngineConfig::default(), registry.clone()).await;
    let task_id = plan(&engine, "call the payments api").await;

    let calls: Calls = Arc::default();
    let exec = recording(&calls, |_, _, _| {
        Err(SynapseError::tool("unsupported operation"))
    });
    engine.execute_task(&task_id, &exec).await.unwrap();

    let task = engine.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.improvement_attempts, 0);
    assert_eq!(task.steps[0].tool, "log_message");
    assert!(task.steps[0].is_skipped());

    let descriptions = registry.descriptions().await;
    assert_eq!(
        descriptions,
        vec![(
            "api_client".to_string(),
            "Echo parameters back as the result".to_string()
        )]
    );
}

#[tokio::test]
async fn test_network_failures_switch_to_alternative_tool() {
    let engine = engine().await;
    let task_id = plan(&engine, "fetch news online").await;

    let calls: Calls = Arc::default();
    let exec = recording(&calls, |tool, _, _| match tool {
        "web_intelligence" => Err(SynapseError::tool("network unreachable")),
        _ => Ok(json!({"results": []})),
    });
    let resp = engine.execute_task(&task_id, &exec).await.unwrap();
    assert_eq!(resp.status, ResponseStatus::Completed);

    let tools: Vec<String> = calls.lock().unwrap().iter().map(|(t, _)| t.clone()).collect();
    assert_eq!(
        tools,
        vec![
            "web_intelligence",
            "web_intelligence",
            "web_intelligence",
            "cognitive_search"
        ]
    );

    let task = engine.get_task(&task_id).await.unwrap().unwrap();
    let step = &task.steps[0];
    assert_eq!(step.tool, "cognitive_search");
    assert_eq!(step.origin, StepOrigin::Rebound("web_intelligence".into()));
    assert_eq!(step.params["engines"], json!(["duckduckgo"]));
    assert_eq!(step.params["query"], json!("fetch news online"));
}

#[tokio::test]
async fn test_tool_improvement_resets_failure_streak() {
    let registry = Arc::new(ToolRegistry::new());
    registry.register(Arc::new(EchoTool::new("cognitive_search"))).await;
    let engine = CognitiveEngine::new(EngineConfig::default(), registry.clone()).await;
    let task_id = plan(&engine, "research competitors").await;

    // Four failures, then a slow response that upgrades the tool, then four
    // more failures. Without the reset the fifth failure would stop the loop.
    let calls: Calls = Arc::default();
    let exec = recording(&calls, |_, _, n| match n {
        3 => Err(SynapseError::tool("slow response")),
        8 => Ok(json!({"results": ["acme"]})),
        _ => Err(SynapseError::tool("boom")),
    });
    let resp = engine.execute_task(&task_id, &exec).await.unwrap();

    assert_eq!(resp.status, ResponseStatus::Completed);
    assert_eq!(calls.lock().unwrap().len(), 9);
    assert_eq!(
        registry.improvements_for("cognitive_search").await,
        vec![ImprovementCategory::OptimizePerformance]
    );

    let task = engine.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.improvement_attempts, 1);
    assert_eq!(task.steps[0].tool, "cognitive_search");
}

#[tokio::test]
async fn test_given_up_step_runs_again_on_next_call() {
    let engine = engine().await;
    let task_id = plan(&engine, "research and verify competitors").await;

    let first_calls: Calls = Arc::default();
    let failing = recording(&first_calls, |_, params, _| {
        if params.get("action") == Some(&json!("fact_check")) {
            Err(SynapseError::tool("boom"))
        } else {
            Ok(json!({"results": ["acme"]}))
        }
    });
    let first = engine.execute_task(&task_id, &failing).await.unwrap();
    assert_eq!(first.status, ResponseStatus::Failed);
    assert_eq!(first.errors, vec!["Step fact_check failed: boom"]);

    let task = engine.get_task(&task_id).await.unwrap().unwrap();
    let statuses: Vec<StepStatus> = task.steps.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![StepStatus::Completed, StepStatus::Failed, StepStatus::Pending]
    );

    let second_calls: Calls = Arc::default();
    let succeeding = recording(&second_calls, |_, _, _| Ok(json!({"ok": true})));
    let second = engine.execute_task(&task_id, &succeeding).await.unwrap();

    let tools: Vec<String> = second_calls
        .lock()
        .unwrap()
        .iter()
        .map(|(t, _)| t.clone())
        .collect();
    assert_eq!(tools, vec!["cognitive_search", "log_message"]);
    assert_eq!(second.status, ResponseStatus::Completed);
    assert_eq!(second.progress, 100.0);

    let task = engine.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.steps[1].id, "fact_check");
    assert_eq!(task.steps[1].status, StepStatus::Completed);
}

#[tokio::test]
async fn test_progress_is_monotonic_across_calls() {
    let engine = engine().await;
    let task_id = plan(&engine, "forecast sales").await;

    let first = engine
        .execute_task(&task_id, &|_t: String, _p: Params| async move {
            Ok::<_, SynapseError>(json!({"descriptive_stats": {"mean": 1}}))
        })
        .await
        .unwrap();
    let second = engine
        .execute_task(&task_id, &|_t: String, _p: Params| async move {
            Ok::<_, SynapseError>(json!({}))
        })
        .await
        .unwrap();
    assert!(second.progress >= first.progress);
}

struct BrokenStore {
    inner: InMemoryTaskStore,
}

#[async_trait]
impl TaskStore for BrokenStore {
    async fn insert(&self, task: Task) -> SynapseResult<()> {
        self.inner.insert(task).await
    }

    async fn get(&self, id: &str) -> SynapseResult<Option<Task>> {
        self.inner.get(id).await
    }

    async fn update(&self, _task: &Task) -> SynapseResult<()> {
        Err(SynapseError::Store("disk full".into()))
    }

    async fn list(&self) -> SynapseResult<Vec<String>> {
        self.inner.list().await
    }
}

#[tokio::test]
async fn test_store_failure_yields_failed_response() {
    let engine = CognitiveEngine::with_parts(
        EngineConfig::default(),
        Arc::new(BrokenStore {
            inner: InMemoryTaskStore::new(),
        }),
        Arc::new(RegistryImprovementEngine::new(Arc::new(ToolRegistry::new()))),
    );
    let task_id = plan(&engine, "forecast sales").await;

    let resp = engine
        .execute_task(&task_id, &|_t: String, _p: Params| async move {
            Ok::<_, SynapseError>(json!({}))
        })
        .await
        .unwrap();

    assert_eq!(resp.status, ResponseStatus::Failed);
    assert_eq!(resp.progress, 0.0);
    assert_eq!(resp.reasoning, "Task execution failed: Store error: disk full");
    assert_eq!(resp.next_actions, vec!["Task failed - consider replanning"]);
}

#[tokio::test]
async fn test_dangling_dependency_stalls_without_running() {
    let store = Arc::new(InMemoryTaskStore::new());
    let engine = CognitiveEngine::with_parts(
        EngineConfig::default(),
        store.clone(),
        Arc::new(RegistryImprovementEngine::new(Arc::new(ToolRegistry::new()))),
    );
    let step = Step::new("orphan", "log_message", Params::new(), "")
        .with_dependencies(vec!["ghost".into()]);
    let task = Task::new("orphaned", Context::new(), vec![step], 3);
    let task_id = task.id.clone();
    store.insert(task).await.unwrap();

    let calls: Calls = Arc::default();
    let exec = recording(&calls, |_, _, _| Ok(json!({})));
    let resp = engine.execute_task(&task_id, &exec).await.unwrap();

    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(resp.status, ResponseStatus::Executing);
    assert_eq!(resp.progress, 0.0);
}

#[tokio::test]
async fn test_dependency_cycle_stalls_with_steps_pending() {
    let store = Arc::new(InMemoryTaskStore::new());
    let engine = CognitiveEngine::with_parts(
        EngineConfig::default(),
        store.clone(),
        Arc::new(RegistryImprovementEngine::new(Arc::new(ToolRegistry::new()))),
    );
    let steps = vec![
        Step::new("a", "log_message", Params::new(), "").with_dependencies(vec!["b".into()]),
        Step::new("b", "log_message", Params::new(), "").with_dependencies(vec!["a".into()]),
    ];
    let task = Task::new("cyclic", Context::new(), steps, 3);
    let task_id = task.id.clone();
    store.insert(task).await.unwrap();

    let calls: Calls = Arc::default();
    let exec = recording(&calls, |_, _, _| Ok(json!({})));
    let resp = engine.execute_task(&task_id, &exec).await.unwrap();

    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(resp.status, ResponseStatus::Executing);
    assert_eq!(resp.next_actions, vec!["Execute 2 pending steps"]);

    let task = engine.get_task(&task_id).await.unwrap().unwrap();
    assert!(task.steps.iter().all(|s| s.status == StepStatus::Pending));
}
