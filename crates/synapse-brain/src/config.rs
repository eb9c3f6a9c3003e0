use serde::{Deserialize, Serialize};
use std::path::Path;
use synapse_core::{SynapseError, SynapseResult};

/// Tool names every engine knows about before any dynamic registration.
pub const DEFAULT_TOOLS: &[&str] = &[
    "typewrite",
    "infer_type",
    "cast_type",
    "log_message",
    "generate_n8n_workflow",
    "transform_data",
    "validate_data",
    "evaluate_expression",
    "manage_secrets",
    "web_intelligence",
    "cognitive_search",
    "analytics_brain",
    "vision_intelligence",
    "orchestrator_brain",
    "system_intelligence",
    "memory_brain",
    "database_intelligence",
];

/// Limits and switches for the execution loop and its recovery policy.
///
/// Every field has a serde default, so a partial TOML table (or none at all)
/// yields a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Consecutive step failures that stop the execution loop.
    #[serde(default = "default_max_continuous_failures")]
    pub max_continuous_failures: u32,
    /// Consecutive failures after which rethink looks for alternatives or skips.
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold: u32,
    /// Self-improvement attempts allowed per task.
    #[serde(default = "default_max_improvement_attempts")]
    pub max_improvement_attempts: u32,
    /// Retry budget stamped onto each new task.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_true")]
    pub self_improvement_enabled: bool,
    #[serde(default = "default_true")]
    pub autonomous_mode: bool,
    /// Diagnoses must be strictly more confident than this to create a tool.
    #[serde(default = "default_confidence_threshold")]
    pub improvement_confidence_threshold: f64,
    /// Tools whose steps are never skipped as non-critical.
    #[serde(default = "default_critical_tools")]
    pub critical_tools: Vec<String>,
    /// A step with at least this many dependents is critical.
    #[serde(default = "default_critical_dependents")]
    pub critical_dependents: usize,
    /// Follow-up rules stop appending once a task holds this many steps.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Extra tool names to treat as available on top of [`DEFAULT_TOOLS`].
    #[serde(default)]
    pub extra_tools: Vec<String>,
}

fn default_max_continuous_failures() -> u32 {
    5
}
fn default_escalation_threshold() -> u32 {
    3
}
fn default_max_improvement_attempts() -> u32 {
    2
}
fn default_max_retries() -> u32 {
    3
}
fn default_true() -> bool {
    true
}
fn default_confidence_threshold() -> f64 {
    0.7
}
fn default_critical_tools() -> Vec<String> {
    vec!["web_intelligence".into(), "cognitive_search".into()]
}
fn default_critical_dependents() -> usize {
    3
}
fn default_max_steps() -> usize {
    64
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_continuous_failures: default_max_continuous_failures(),
            escalation_threshold: default_escalation_threshold(),
            max_improvement_attempts: default_max_improvement_attempts(),
            max_retries: default_max_retries(),
            self_improvement_enabled: true,
            autonomous_mode: true,
            improvement_confidence_threshold: default_confidence_threshold(),
            critical_tools: default_critical_tools(),
            critical_dependents: default_critical_dependents(),
            max_steps: default_max_steps(),
            extra_tools: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> SynapseResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| SynapseError::Config(format!("Failed to parse engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    pub async fn from_file(path: impl AsRef<Path>) -> SynapseResult<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            SynapseError::Config(format!(
                "Failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> SynapseResult<()> {
        if self.max_continuous_failures == 0 {
            return Err(SynapseError::Config(
                "max_continuous_failures must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.improvement_confidence_threshold) {
            return Err(SynapseError::Config(format!(
                "improvement_confidence_threshold must be within 0..=1, got {}",
                self.improvement_confidence_threshold
            )));
        }
        Ok(())
    }

    /// Default tool names plus any configured extras.
    pub fn initial_tools(&self) -> impl Iterator<Item = String> + '_ {
        DEFAULT_TOOLS
            .iter()
            .map(|t| (*t).to_string())
            .chain(self.extra_tools.iter().cloned())
    }
}
