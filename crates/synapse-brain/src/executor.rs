use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use synapse_core::{Params, SynapseResult};

/// Caller-supplied capability that runs one tool with resolved parameters.
///
/// A failure's message drives the recovery policy, so implementations should
/// return the tool's own wording (see [`synapse_core::SynapseError::tool`]).
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool: &str, params: Params) -> SynapseResult<Value>;
}

/// Any `Fn(tool, params) -> Future` closure is an executor.
#[async_trait]
impl<F, Fut> ToolExecutor for F
where
    F: Fn(String, Params) -> Fut + Send + Sync,
    Fut: Future<Output = SynapseResult<Value>> + Send,
{
    async fn execute(&self, tool: &str, params: Params) -> SynapseResult<Value> {
        (self)(tool.to_string(), params).await
    }
}
