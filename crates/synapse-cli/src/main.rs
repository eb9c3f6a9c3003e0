//! `synapse` command-line front end for the cognitive task engine.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use synapse_brain::{CognitiveEngine, EchoTool, EngineConfig, ToolRegistry, DEFAULT_TOOLS};
use synapse_core::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "synapse", about = "Synapse: cognitive task planning and execution")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "synapse.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompose a task description and print the plan
    Plan {
        description: String,
        /// JSON object made available to `${...}` placeholders
        #[arg(long)]
        context: Option<String>,
    },
    /// Plan and execute a task against the tool registry
    Run {
        description: String,
        /// JSON object made available to `${...}` placeholders
        #[arg(long)]
        context: Option<String>,
        /// Register echo tools for every default tool name
        #[arg(long)]
        echo: bool,
    },
    /// List the tool names the engine knows about
    Tools,
}

async fn load_config(path: &Path) -> anyhow::Result<EngineConfig> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        info!(path = %path.display(), "No config file, using defaults");
        return Ok(EngineConfig::default());
    }
    Ok(EngineConfig::from_file(path).await?)
}

fn parse_context(raw: Option<&str>) -> anyhow::Result<Context> {
    match raw {
        None => Ok(Context::new()),
        Some(text) => match serde_json::from_str::<serde_json::Value>(text)? {
            serde_json::Value::Object(map) => Ok(map),
            other => anyhow::bail!("--context must be a JSON object, got {other}"),
        },
    }
}

/// One listing line per known tool, with the description of its registered
/// implementation when there is one.
fn tool_lines(tools: &[String], descriptions: &[(String, String)]) -> Vec<String> {
    tools
        .iter()
        .map(|tool| {
            match descriptions
                .iter()
                .find(|(name, desc)| name == tool && !desc.is_empty())
            {
                Some((_, desc)) => format!("{tool:<24} {desc}"),
                None => tool.clone(),
            }
        })
        .collect()
}

async fn build_registry(echo: bool) -> Arc<ToolRegistry> {
    let registry = ToolRegistry::with_builtins().await;
    if echo {
        for name in DEFAULT_TOOLS.iter().filter(|n| **n != "log_message") {
            registry.register(Arc::new(EchoTool::new(*name))).await;
        }
    }
    Arc::new(registry)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;

    match cli.command {
        Commands::Plan {
            description,
            context,
        } => {
            let engine = CognitiveEngine::new(config, build_registry(false).await).await;
            let context = parse_context(context.as_deref())?;
            let plan = engine.plan_task(&description, context).await?;

            if let Some(task) = engine.get_task(&plan.task_id).await? {
                println!("{}", serde_json::to_string_pretty(&task.steps)?);
            }
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Commands::Run {
            description,
            context,
            echo,
        } => {
            let registry = build_registry(echo).await;
            info!(tools = registry.tool_count().await, "Tool registry ready");

            let engine = CognitiveEngine::new(config, registry.clone()).await;
            let context = parse_context(context.as_deref())?;
            let plan = engine.plan_task(&description, context).await?;
            let response = engine.execute_task(&plan.task_id, registry.as_ref()).await?;

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Tools => {
            let registry = build_registry(false).await;
            let engine = CognitiveEngine::new(config, registry.clone()).await;
            let tools = engine.available_tools();
            println!("Available tools:");
            for line in tool_lines(&tools, &registry.descriptions().await) {
                println!("  {line}");
            }
            println!("\nTotal: {} tool(s)", tools.len());
        }
    }

    Ok(())
}
