//! # Verdict Engine
//!
//! The scheduled evaluation pipeline. A periodic trigger starts a dispatch
//! cycle; the dispatcher finds due schedules and fans each one out to an
//! evaluation worker on a bounded pool; every worker drives its schedule
//! through an explicit state machine with per-item failure isolation.
//!
//! ## Architecture
//! ```text
//! Trigger (interval or cron)
//!   └── Dispatcher.run_cycle
//!         ├── find_due: PENDING within [now − 5m, now + 1m]
//!         └── one EvaluationWorker task per schedule (semaphore-bounded)
//!               ├── fetch + validate tree          → INVALID_TREE
//!               ├── [Enricher: real market data]
//!               ├── reasoning call (no retry)      → ERROR
//!               ├── Response Parser (fail-closed)
//!               ├── audit log append (always)
//!               ├── decision == true → Action Executor
//!               └── COMPLETED
//! ```

pub mod actions;
pub mod cron;
pub mod dispatcher;
pub mod parser;
pub mod service;
pub mod tree;
pub mod worker;

use std::sync::Arc;

use chrono::Utc;
use verdict_core::config::SchedulerConfig;

pub use actions::{ActionContext, ActionExecutor, ActionHandler, ActionKind};
pub use cron::CronSchedule;
pub use dispatcher::Dispatcher;
pub use parser::{ParsedDecision, parse};
pub use service::EvaluationService;
pub use worker::EvaluationWorker;

/// Run dispatch cycles forever on the configured cadence.
///
/// A new cycle never cancels the previous cycle's in-flight workers; a
/// worker always runs to a terminal status or the process exits.
pub async fn spawn_evaluation_loop(dispatcher: Arc<Dispatcher>, config: SchedulerConfig) {
    if !config.cron.is_empty() {
        match CronSchedule::parse(&config.cron) {
            Some(cadence) => {
                tracing::info!("⏰ Evaluation loop started (cron '{}')", config.cron);
                run_cron_loop(dispatcher, cadence).await;
            }
            None => {
                tracing::warn!(
                    "⚠️ Unsupported cron '{}', falling back to {}s interval",
                    config.cron,
                    config.interval_secs
                );
                run_interval_loop(dispatcher, config.interval_secs).await;
            }
        }
    } else {
        tracing::info!("⏰ Evaluation loop started (every {}s)", config.interval_secs);
        run_interval_loop(dispatcher, config.interval_secs).await;
    }
}

async fn run_interval_loop(dispatcher: Arc<Dispatcher>, interval_secs: u64) {
    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
    loop {
        interval.tick().await;
        dispatcher.run_cycle(Utc::now()).await;
    }
}

async fn run_cron_loop(dispatcher: Arc<Dispatcher>, cadence: CronSchedule) {
    loop {
        let now = Utc::now();
        let Some(next) = cadence.next_after(now) else {
            tracing::error!("Cron cadence produced no next tick, stopping loop");
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        dispatcher.run_cycle(Utc::now()).await;
    }
}
