use crate::executor::ToolExecutor;
use crate::improvement::{ImprovementCategory, ToolDefinition};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use synapse_core::{Params, SynapseError, SynapseResult};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// A callable tool implementation.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    async fn execute(&self, params: Params) -> SynapseResult<Value>;
}

/// Central registry mapping tool names to implementations.
///
/// Creating a tool at runtime means registering a new implementation here.
/// The registry is itself a [`ToolExecutor`], dispatching by name.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    improvements: RwLock<HashMap<String, Vec<ImprovementCategory>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            improvements: RwLock::new(HashMap::new()),
        }
    }

    /// A registry holding the built-in `log_message` tool.
    pub async fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(LogMessageTool)).await;
        registry
    }

    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        info!(tool = %name, "Registered tool");
        self.tools.write().await.insert(name, tool);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// Sorted names of every registered tool.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// `(name, description)` of every registered tool, sorted by name.
    pub async fn descriptions(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .tools
            .read()
            .await
            .iter()
            .map(|(name, tool)| (name.clone(), tool.description().to_string()))
            .collect();
        entries.sort();
        entries
    }

    pub async fn tool_count(&self) -> usize {
        self.tools.read().await.len()
    }

    /// Records an improvement against a registered tool.
    ///
    /// Returns `false` when no implementation with that name is registered.
    pub async fn record_improvement(&self, name: &str, category: ImprovementCategory) -> bool {
        if !self.contains(name).await {
            return false;
        }
        self.improvements
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .push(category);
        true
    }

    pub async fn improvements_for(&self, name: &str) -> Vec<ImprovementCategory> {
        self.improvements
            .read()
            .await
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, tool: &str, params: Params) -> SynapseResult<Value> {
        let implementation = self
            .get(tool)
            .await
            .ok_or_else(|| SynapseError::tool(format!("Unknown tool: {tool}")))?;
        implementation.execute(params).await
    }
}

/// No-op tool that writes its `message` parameter to the log.
pub struct LogMessageTool;

#[async_trait]
impl Tool for LogMessageTool {
    fn name(&self) -> &str {
        "log_message"
    }

    fn description(&self) -> &str {
        "Write a message to the engine log"
    }

    async fn execute(&self, params: Params) -> SynapseResult<Value> {
        let message = match params.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let level = params
            .get("level")
            .and_then(Value::as_str)
            .unwrap_or("info")
            .to_string();

        match level.as_str() {
            "error" => error!(target: "synapse::log_message", "{message}"),
            "warn" => warn!(target: "synapse::log_message", "{message}"),
            "debug" => debug!(target: "synapse::log_message", "{message}"),
            _ => info!(target: "synapse::log_message", "{message}"),
        }

        Ok(json!({ "logged": true, "message": message, "level": level }))
    }
}

/// Stand-in tool that returns its parameters unchanged.
pub struct EchoTool {
    name: String,
}

impl EchoTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Echo parameters back as the result"
    }

    async fn execute(&self, params: Params) -> SynapseResult<Value> {
        Ok(json!({ "tool": self.name, "echo": params }))
    }
}

/// Tool registered at runtime from a [`ToolDefinition`].
///
/// Every declared action succeeds with a placeholder result; undeclared
/// actions fail.
pub struct GeneratedTool {
    definition: ToolDefinition,
}

impl GeneratedTool {
    pub fn new(definition: ToolDefinition) -> Self {
        Self { definition }
    }
}

#[async_trait]
impl Tool for GeneratedTool {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn description(&self) -> &str {
        &self.definition.description
    }

    async fn execute(&self, params: Params) -> SynapseResult<Value> {
        let action = params
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("execute");

        let declared = (self.definition.actions.is_empty() && action == "execute")
            || self.definition.actions.iter().any(|a| a == action);
        if !declared {
            return Err(SynapseError::tool(format!(
                "{} execution failed: Unknown action: {action}",
                self.definition.name
            )));
        }

        Ok(json!({
            "success": true,
            "tool": self.definition.name,
            "action": action,
            "result": "Implementation needed",
        }))
    }
}
