//! Synergos command line
//!
//! Runs one objective through a coordinator and persists the session graph.
//!
//! ```bash
//! # Offline run against ./workspace
//! synergos --offline "Analyse app.log and write the report in report.md"
//!
//! # With a model endpoint
//! OPENAI_API_KEY=sk-... synergos --workspace ./data --max-depth 2
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use synergos::{ExecutionUnit, Orchestrator, SynergosConfig};

const FALLBACK_OBJECTIVE: &str = "Analyse the workspace files and write a summary report.";

/// Command-line arguments; each flag overrides its environment variable
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Objective for the coordinator; read from stdin when omitted
    objective: Option<String>,

    /// Workspace directory (overrides WORKSPACE_DIR)
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Consumption ceiling for the run (overrides SYNERGOS_TOKEN_BUDGET)
    #[arg(long)]
    budget: Option<u64>,

    /// Maximum delegation depth (overrides SYNERGOS_MAX_DEPTH)
    #[arg(long)]
    max_depth: Option<u32>,

    /// Where to write the session graph
    #[arg(long)]
    graph: Option<PathBuf>,

    /// Use the deterministic offline client even when an API key is set
    #[arg(long, default_value_t = false)]
    offline: bool,
}

impl Args {
    fn apply(&self, mut config: SynergosConfig) -> SynergosConfig {
        if let Some(workspace) = &self.workspace {
            config.workspace = workspace.clone();
        }
        if let Some(budget) = self.budget.filter(|b| *b > 0) {
            config.token_budget = budget;
        }
        if let Some(depth) = self.max_depth {
            config.max_depth = depth;
        }
        if self.graph.is_some() {
            config.graph_path = self.graph.clone();
        }
        if self.offline {
            config.api_key = None;
        }
        config
    }
}

async fn read_objective() -> Result<String> {
    eprint!("Objective: ");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("failed to read the objective from stdin")?;
    let line = line.trim();
    Ok(if line.is_empty() {
        FALLBACK_OBJECTIVE.to_string()
    } else {
        line.to_string()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = args.apply(SynergosConfig::from_env());
    let objective = match args.objective.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => read_objective().await?,
    };

    let engine = Orchestrator::from_config(&config).with_context(|| {
        format!(
            "failed to open workspace {}",
            config.workspace.display()
        )
    })?;
    tracing::info!(
        offline = config.is_offline(),
        client = engine.client_name(),
        "Starting run"
    );

    let outcome = match engine.spawn_coordinator("Coordinator", None) {
        Ok(coordinator) => Ok(coordinator.process(&objective).await),
        Err(e) => Err(e),
    };

    // The graph is written whether or not the run succeeded.
    let persisted = engine.persist_graph();

    let result = outcome.context("failed to create the coordinator")?;
    println!("{result}");
    println!();
    println!("{}", engine.snapshot().summary());

    let path = persisted.context("failed to persist the session graph")?;
    println!("Session graph written to {}", path.display());
    Ok(())
}
