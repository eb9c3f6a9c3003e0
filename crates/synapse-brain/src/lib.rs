//! Cognitive task engine: planning, execution and adaptive recovery.
//!
//! A free-text task description is decomposed into interdependent steps,
//! which are executed against a caller-supplied [`ToolExecutor`]. Failed
//! steps go through self-improvement and then autonomous rethink, which may
//! retry them with new parameters, move them to another tool, or skip them.
//! Completed steps may spawn follow-up steps.
//!
//! # Main types
//!
//! - [`CognitiveEngine`]: Plans tasks and drives their execution loop.
//! - [`TaskStore`]: Repository holding tasks for the life of the process.
//! - [`ToolRegistry`]: Named tool implementations; also a [`ToolExecutor`].
//! - [`SelfImprovement`]: Capability consulted to create or upgrade tools.
//! - [`EngineConfig`]: Limits and switches, loadable from TOML.

/// Engine configuration and default tool names.
pub mod config;
/// Keyword-driven task decomposition.
pub mod decomposer;
/// The planning and execution engine.
pub mod engine;
/// Tool invocation seam.
pub mod executor;
/// Self-improvement capability and attempt logic.
pub mod improvement;
/// Follow-up step generation.
pub mod mutator;
/// Tool registry and built-in tools.
pub mod registry;
/// Failure recovery heuristics.
pub mod rethink;
/// Task storage.
pub mod store;
/// `${path}` parameter templating.
pub mod template;
/// Task, step and response types.
pub mod types;

pub use config::{EngineConfig, DEFAULT_TOOLS};
pub use decomposer::TaskDecomposer;
pub use engine::CognitiveEngine;
pub use executor::ToolExecutor;
pub use improvement::{
    ImprovementAnalysis, ImprovementCategory, ImprovementOutcome, RegistryImprovementEngine,
    SelfImprovement, ToolDefinition,
};
pub use mutator::StepMutator;
pub use registry::{EchoTool, GeneratedTool, LogMessageTool, Tool, ToolRegistry};
pub use rethink::RethinkVerdict;
pub use store::{InMemoryTaskStore, TaskStore};
pub use types::{
    CognitiveResponse, ResponseStatus, Step, StepOrigin, StepStatus, Task, TaskStatus,
};
