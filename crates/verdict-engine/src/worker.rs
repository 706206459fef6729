//! Evaluation worker — one schedule, one invocation, one terminal status.
//!
//! State machine: `PENDING → IN_PROGRESS → {COMPLETED, INVALID_TREE,
//! ERROR}`. The in-progress transition is persisted before any external
//! call so a crash mid-evaluation is observable rather than silently
//! re-picked. Failures never escape `process` — every error maps to a
//! terminal status plus a best-effort audit entry, and a failure of that
//! secondary logging is swallowed: logging must not crash the worker.
//!
//! No step retries. The reasoning call is not idempotent (its output
//! varies run to run), so the only retry mechanism is the next periodic
//! trigger rediscovering a schedule that never advanced past `PENDING`.

use std::sync::Arc;

use verdict_core::error::{Result, VerdictError};
use verdict_core::traits::{ActionStore, AuditLog, Reasoner, ScheduleStore, TreeStore};
use verdict_core::types::{AuditLogEntry, EvaluationResult, Schedule, ScheduleStatus};
use verdict_market::Enricher;

use crate::actions::{ActionContext, ActionExecutor};
use crate::parser;
use crate::tree;

/// Per-schedule unit of work. One instance is shared by all spawned
/// worker tasks; every collaborator behind it is thread-safe.
pub struct EvaluationWorker {
    schedules: Arc<dyn ScheduleStore>,
    trees: Arc<dyn TreeStore>,
    audit: Arc<dyn AuditLog>,
    actions: Arc<dyn ActionStore>,
    reasoner: Arc<dyn Reasoner>,
    enricher: Arc<Enricher>,
    executor: Arc<ActionExecutor>,
}

impl EvaluationWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        trees: Arc<dyn TreeStore>,
        audit: Arc<dyn AuditLog>,
        actions: Arc<dyn ActionStore>,
        reasoner: Arc<dyn Reasoner>,
        enricher: Arc<Enricher>,
        executor: Arc<ActionExecutor>,
    ) -> Self {
        Self {
            schedules,
            trees,
            audit,
            actions,
            reasoner,
            enricher,
            executor,
        }
    }

    /// Drive one schedule to a terminal status. Infallible by contract:
    /// all errors are mapped, logged, and audited here.
    pub async fn process(&self, mut schedule: Schedule) -> ScheduleStatus {
        tracing::info!(
            "🌳 Processing schedule {} for tree {}",
            schedule.id,
            schedule.tree_id
        );

        // Step 1: claim the schedule. If this persist fails nothing has
        // changed, so the schedule stays PENDING and the next cycle
        // retries it.
        schedule.status = ScheduleStatus::InProgress;
        if let Err(e) = self.schedules.save(&schedule) {
            tracing::error!("Could not mark schedule {} in progress: {e}", schedule.id);
            return ScheduleStatus::Pending;
        }

        match self.evaluate(&schedule.tree_id, schedule.comparison_days).await {
            Ok(result) => {
                if result.decision {
                    if let Err(e) = self.fire_linked_action(&schedule, &result).await {
                        match e {
                            VerdictError::UnsupportedAction(kind) => {
                                tracing::warn!(
                                    "⚠️ Unsupported action type '{kind}' on schedule {} — schedule still completes",
                                    schedule.id
                                );
                            }
                            other => return self.fail(schedule, other),
                        }
                    }
                } else {
                    tracing::info!(
                        "Schedule {} evaluated negative — no action fired",
                        schedule.id
                    );
                }
                self.finish(schedule, ScheduleStatus::Completed)
            }
            Err(VerdictError::InvalidTree(msg)) => {
                tracing::warn!("Tree for schedule {} is invalid: {msg}", schedule.id);
                self.audit_failure(&schedule.tree_id, &format!("Invalid tree structure: {msg}"));
                self.finish(schedule, ScheduleStatus::InvalidTree)
            }
            Err(e) => self.fail(schedule, e),
        }
    }

    /// The evaluation pipeline without schedule bookkeeping: fetch,
    /// validate, enrich, reason, parse, audit. Shared by scheduled runs
    /// and the ad-hoc `execute_for_tree` path.
    pub async fn evaluate(&self, tree_id: &str, comparison_days: u32) -> Result<EvaluationResult> {
        let nodes = self.trees.find_by_tree_id(tree_id)?;
        if nodes.is_empty() {
            return Err(VerdictError::TreeNotFound(tree_id.to_string()));
        }

        let report = tree::validate(&nodes)?;
        tracing::debug!(
            "Tree {tree_id}: {} nodes, {} roots, {} leaves",
            report.node_count,
            report.root_ids.len(),
            report.leaf_count
        );

        let tree_json = serde_json::to_string(&nodes)
            .map_err(|e| VerdictError::InvalidTree(format!("serialize tree: {e}")))?;

        let (system, mut user) = build_prompts(&tree_json, comparison_days);
        let mut data_sources = vec!["reasoning web search".to_string()];
        let mut enriched = false;

        if self.enricher.detect(&tree_json) {
            tracing::info!("📊 Market criteria detected, enriching prompt with real market data");
            let (enriched_prompt, did_enrich) =
                self.enricher.enrich(&user, &tree_json, comparison_days).await;
            user = enriched_prompt;
            enriched = did_enrich;
            if did_enrich {
                data_sources.push("market data API".to_string());
            }
        }

        // The single most failure-prone step. No retry: the call is not
        // idempotent, and a timeout is the same as any other failure.
        let raw = self
            .reasoner
            .complete_recent(&system, &user, comparison_days)
            .await?;

        let parsed = parser::parse(&raw);
        let result = EvaluationResult {
            decision: parsed.decision,
            rationale: parsed.rationale,
            data_sources,
            enriched,
        };

        // Audit every attempt, positive or negative or parse-fallback.
        self.audit.append(&AuditLogEntry::new(
            tree_id,
            &tree_json,
            result.decision,
            &result.rationale,
        ))?;

        tracing::info!(
            "Evaluation of tree {tree_id}: decision={}, rationale {} chars, enriched={}",
            result.decision,
            result.rationale.len(),
            result.enriched
        );
        Ok(result)
    }

    async fn fire_linked_action(
        &self,
        schedule: &Schedule,
        result: &EvaluationResult,
    ) -> Result<()> {
        let action_id = match &schedule.action_id {
            Some(id) => id,
            None => return Ok(()),
        };

        let action = match self.actions.find_by_id(action_id)? {
            Some(action) => action,
            None => {
                tracing::warn!(
                    "Linked action {action_id} on schedule {} no longer exists",
                    schedule.id
                );
                return Ok(());
            }
        };

        let ctx = ActionContext {
            tree_id: schedule.tree_id.clone(),
            schedule_id: schedule.id.clone(),
            decision: result.decision,
            rationale: result.rationale.clone(),
        };
        self.executor.execute(&action, &ctx).await
    }

    /// Persist a terminal status. A failed persist is logged and the
    /// intended status returned — the row stays IN_PROGRESS in the store,
    /// which operators can see via the status counts.
    fn finish(&self, mut schedule: Schedule, status: ScheduleStatus) -> ScheduleStatus {
        schedule.status = status;
        if let Err(e) = self.schedules.save(&schedule) {
            tracing::error!(
                "Could not persist terminal status {status} for schedule {}: {e}",
                schedule.id
            );
        } else {
            tracing::info!("✅ Schedule {} finished: {status}", schedule.id);
        }
        status
    }

    fn fail(&self, schedule: Schedule, error: VerdictError) -> ScheduleStatus {
        tracing::error!("❌ Schedule {} failed: {error}", schedule.id);
        self.audit_failure(&schedule.tree_id, &format!("Evaluation failed: {error}"));
        self.finish(schedule, ScheduleStatus::Error)
    }

    /// Best-effort failure audit. A secondary logging failure is
    /// swallowed — it must never escalate past the worker.
    fn audit_failure(&self, tree_id: &str, message: &str) {
        let entry = AuditLogEntry::new(tree_id, "", false, message);
        if let Err(e) = self.audit.append(&entry) {
            tracing::warn!("Failure audit for tree {tree_id} could not be written: {e}");
        }
    }
}

/// Build the system and user prompts for one evaluation.
fn build_prompts(tree_json: &str, comparison_days: u32) -> (String, String) {
    let timeframe = timeframe_label(comparison_days);

    let system = format!(
        "You are evaluating a decision tree against today's latest information \
         compared to data from {timeframe}.\n\n\
         Walk the provided tree node by node and follow its branch logic exactly.\n\n\
         Response format:\n\
         DECISION: true|false\n\
         CRITERIA: [step-by-step traversal results and {comparison_days}-day comparison data]\n"
    );
    let user = format!(
        "Run through this decision tree and provide decision + detailed criteria \
         analysis comparing today's data with data from {timeframe} \
         ({comparison_days} days ago):\n{tree_json}"
    );
    (system, user)
}

fn timeframe_label(days: u32) -> String {
    match days {
        1 => "yesterday".to_string(),
        7 => "last week (7 days ago)".to_string(),
        30 => "last month (30 days ago)".to_string(),
        d => format!("{d} days ago"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_labels() {
        assert_eq!(timeframe_label(1), "yesterday");
        assert_eq!(timeframe_label(7), "last week (7 days ago)");
        assert_eq!(timeframe_label(3), "3 days ago");
    }

    #[test]
    fn test_prompt_shape() {
        let (system, user) = build_prompts("[]", 7);
        assert!(system.contains("DECISION: true|false"));
        assert!(system.contains("last week"));
        assert!(user.ends_with("[]"));
    }
}
