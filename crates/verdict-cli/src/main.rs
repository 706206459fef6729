//! Verdict operator CLI.
//!
//! `verdict run` starts the periodic evaluation loop; the other commands
//! are one-shot operator paths over the same wiring.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use verdict_core::VerdictConfig;
use verdict_core::traits::{Reasoner, TreeStore};
use verdict_core::types::TreeNode;
use verdict_engine::{ActionExecutor, Dispatcher, EvaluationService, EvaluationWorker};
use verdict_market::{Enricher, FinnhubClient, ValidationCache};
use verdict_providers::create_reasoner;
use verdict_store::VerdictDb;

#[derive(Parser)]
#[command(name = "verdict", about = "Scheduled decision-tree evaluation", version)]
struct Cli {
    /// Config file path (default: ~/.verdict/config.toml)
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the periodic evaluation loop
    Run,
    /// Run one dispatch cycle and wait for its workers
    Trigger,
    /// Evaluate one tree right now and print the summary
    Eval {
        #[arg(long)]
        tree_id: String,
        /// Comparison window in days
        #[arg(long, default_value_t = 1)]
        days: u32,
    },
    /// Create a schedule
    Schedule {
        #[arg(long)]
        tree_id: String,
        /// RFC 3339 time for a one-shot schedule
        #[arg(long, conflicts_with = "cron")]
        at: Option<DateTime<Utc>>,
        /// Cron cadence for a recurring schedule
        #[arg(long)]
        cron: Option<String>,
        #[arg(long, default_value_t = 1)]
        days: u32,
        /// Linked action id, fired on a positive decision
        #[arg(long)]
        action_id: Option<String>,
    },
    /// Import tree nodes from a JSON file (array of nodes)
    ImportTree {
        file: std::path::PathBuf,
    },
    /// Show schedule counts per status
    Status,
}

struct Stack {
    db: Arc<VerdictDb>,
    service: EvaluationService,
    dispatcher: Arc<Dispatcher>,
    config: VerdictConfig,
}

fn build_stack(config: VerdictConfig) -> Result<Stack> {
    let db = Arc::new(VerdictDb::open(&config.store.db_path()).context("open store")?);
    let reasoner: Arc<dyn Reasoner> =
        Arc::from(create_reasoner(&config).context("create reasoner")?);

    let enricher = if config.market.enabled {
        let client = FinnhubClient::from_config(&config.market).context("market client")?;
        let cache = ValidationCache::new(
            Duration::from_secs(config.market.cache_ttl_secs),
            config.market.cache_capacity,
        );
        Arc::new(Enricher::new(Arc::new(client), cache))
    } else {
        Arc::new(Enricher::disabled())
    };

    let executor = Arc::new(ActionExecutor::with_defaults(
        db.clone(),
        reasoner.clone(),
        db.clone(),
    ));
    let worker = Arc::new(EvaluationWorker::new(
        db.clone(),
        db.clone(),
        db.clone(),
        db.clone(),
        reasoner,
        enricher,
        executor,
    ));
    let dispatcher = Arc::new(Dispatcher::new(worker.clone(), db.clone(), &config.scheduler));
    let service = EvaluationService::new(db.clone(), db.clone(), dispatcher.clone(), worker);

    Ok(Stack {
        db,
        service,
        dispatcher,
        config,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => VerdictConfig::load_from(path)?,
        None => VerdictConfig::load()?,
    };
    let stack = build_stack(config)?;

    match cli.command {
        Command::Run => {
            let scheduler = stack.config.scheduler.clone();
            verdict_engine::spawn_evaluation_loop(stack.dispatcher, scheduler).await;
        }
        Command::Trigger => {
            let launched = stack.dispatcher.run_cycle(Utc::now()).await;
            println!("Launched {launched} worker(s)");
            wait_for_drain(&stack).await?;
            println!("Worker failures so far: {}", stack.dispatcher.failure_count());
        }
        Command::Eval { tree_id, days } => {
            let summary = stack.service.execute_for_tree(&tree_id, days).await?;
            println!("{summary}");
        }
        Command::Schedule {
            tree_id,
            at,
            cron,
            days,
            action_id,
        } => {
            let schedule = match (at, cron) {
                (_, Some(cron)) => {
                    stack
                        .service
                        .create_recurring_schedule(&cron, &tree_id, days, action_id)?
                }
                (Some(at), None) => stack.service.create_schedule(&tree_id, at, days, action_id)?,
                (None, None) => anyhow::bail!("pass either --at or --cron"),
            };
            println!("Created schedule {} for {}", schedule.id, schedule.scheduled_time);
        }
        Command::ImportTree { file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("read {}", file.display()))?;
            let nodes: Vec<TreeNode> = serde_json::from_str(&json).context("parse tree nodes")?;
            anyhow::ensure!(!nodes.is_empty(), "file contains no nodes");
            stack.db.save_nodes(&nodes)?;
            println!("Imported {} node(s) into tree {}", nodes.len(), nodes[0].tree_id);
        }
        Command::Status => {
            for (status, count) in stack.service.schedule_status_counts()? {
                println!("{status:>12}: {count}");
            }
        }
    }

    Ok(())
}

/// Wait for in-flight workers after a manual trigger. The loop itself
/// never needs this — workers are fire-and-forget there.
async fn wait_for_drain(stack: &Stack) -> Result<()> {
    for _ in 0..120 {
        let counts = stack.service.schedule_status_counts()?;
        if counts.get("IN_PROGRESS").copied().unwrap_or(0) == 0 {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    tracing::warn!("⚠️ Workers still in flight after 60s, leaving them to finish");
    Ok(())
}
