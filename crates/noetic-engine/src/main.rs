//! ABOUTME: noeticd entrypoint: classifies the question, then either answers
//! ABOUTME: it directly or runs it through a root kernel cell

mod adapters;
mod cli;
mod context;

use std::io;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command, TraceLevel};
use context::EngineContext;
use noetic_classifier::{classify, ClassifyContext};
use noetic_cell::KernelCell;
use noetic_config::NoeticConfig;
use noetic_core::CellId;
use noetic_dispatch::{Dispatcher, TaskOutcome};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.trace);

    let config = match &cli.config {
        Some(path) => NoeticConfig::from_file(path)?,
        None => NoeticConfig::load()?,
    };

    match cli.command {
        Command::Ask { question, domain } => run_ask(config, question, domain).await,
        Command::DispatchOnce { limit } => run_dispatch_once(config, limit).await,
        Command::Health => run_health(config).await,
    }
}

async fn run_ask(config: NoeticConfig, question: String, domain: Option<String>) -> Result<()> {
    let classification = classify(&question, &ClassifyContext::default());
    info!(query_type = ?classification.query_type, bypass = classification.bypass_kernel, "classified question");

    if classification.bypass_kernel {
        println!(
            "{}",
            serde_json::json!({
                "bypassed": true,
                "query_type": classification.query_type,
                "detected_patterns": classification.detected_patterns,
            })
        );
        return Ok(());
    }

    let ctx = EngineContext::build(config, None).await?;
    let deps = ctx.cell_deps();

    let cell_id = CellId::root("ceo");
    let cell = KernelCell::root(cell_id, question, domain, deps);
    let envelope = cell.run().await;

    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

async fn run_dispatch_once(config: NoeticConfig, limit: i64) -> Result<()> {
    let ctx = EngineContext::build(config, None).await?;
    let Some(db) = &ctx.dispatch_db else {
        anyhow::bail!("dispatch database not configured");
    };

    let dispatcher = Dispatcher::new(db, Duration::from_secs(ctx.config.database.lease_ttl_secs));
    let leased = dispatcher.lease_tasks(limit).await?;
    info!(count = leased.len(), "leased tasks");

    for task in leased {
        let result = ctx.tools.call_tool(&task.tool_name, task.parameters.clone()).await;
        match result {
            Ok(value) => {
                dispatcher
                    .complete_task(task.task_id, TaskOutcome::Completed, Some(&value.to_string()), None)
                    .await?;
            }
            Err(e) => {
                warn!(task_id = %task.task_id, error = %e, "micro task failed");
                dispatcher.complete_task(task.task_id, TaskOutcome::Failed, None, Some(&e.to_string())).await?;
            }
        }
    }
    Ok(())
}

async fn run_health(config: NoeticConfig) -> Result<()> {
    let ctx = EngineContext::build(config, None).await?;
    let state = ctx.governor.check_health();
    println!(
        "{}",
        serde_json::json!({
            "cpu_percent": state.cpu_percent,
            "memory_percent": state.memory_percent,
            "active_agents": state.active_agents,
            "status": format!("{:?}", state.status),
        })
    );
    Ok(())
}

/// Priority: RUST_LOG > --trace flag > default. Tracing goes to stderr so
/// stdout stays reserved for a command's actual output (envelope JSON,
/// health readings).
fn setup_tracing(trace_level: TraceLevel) {
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(io::stderr)
            .with_target(false)
            .init();
    } else {
        let level: tracing::Level = trace_level.into();
        tracing_subscriber::fmt().with_max_level(level).with_writer(io::stderr).with_target(false).init();
    }
}
