use thiserror::Error;

/// A convenience `Result` alias using [`SynapseError`].
pub type SynapseResult<T> = Result<T, SynapseError>;

/// Top-level error type for the Synapse engine.
///
/// Each variant corresponds to a subsystem that can produce errors. Tool
/// failures carry the tool's own message untouched because the recovery
/// policy classifies failures by message content.
#[derive(Error, Debug)]
pub enum SynapseError {
    /// No task with the given id exists in the task store.
    #[error("Task {0} not found")]
    TaskNotFound(String),

    /// A tool invocation failed. The message is the tool's own.
    #[error("{0}")]
    Tool(String),

    /// The self-improvement capability failed while diagnosing or
    /// creating a tool.
    #[error("Improvement error: {0}")]
    Improvement(String),

    /// An error from the task store.
    #[error("Store error: {0}")]
    Store(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SynapseError {
    /// Builds a tool failure from any displayable message.
    pub fn tool(message: impl Into<String>) -> Self {
        SynapseError::Tool(message.into())
    }

    /// The message the recovery policy inspects for a failure.
    ///
    /// For tool failures this is the raw tool message; for every other
    /// variant it is the full display string.
    pub fn failure_message(&self) -> String {
        match self {
            SynapseError::Tool(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}
