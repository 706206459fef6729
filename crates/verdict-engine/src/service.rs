//! Evaluation service facade — the operations the (out-of-scope) API
//! layer calls. Input validation happens here, before any work begins;
//! downstream failures keep their original message for operators.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use verdict_core::error::{Result, VerdictError};
use verdict_core::traits::{ActionStore, ScheduleStore};
use verdict_core::types::{Schedule, ScheduleStatus};

use crate::cron::CronSchedule;
use crate::dispatcher::Dispatcher;
use crate::worker::EvaluationWorker;

/// Accepted comparison window, in days.
pub const COMPARISON_DAYS_RANGE: std::ops::RangeInclusive<u32> = 1..=365;

/// Facade over the pipeline for schedule and evaluation operations.
pub struct EvaluationService {
    schedules: Arc<dyn ScheduleStore>,
    actions: Arc<dyn ActionStore>,
    dispatcher: Arc<Dispatcher>,
    worker: Arc<EvaluationWorker>,
}

impl EvaluationService {
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        actions: Arc<dyn ActionStore>,
        dispatcher: Arc<Dispatcher>,
        worker: Arc<EvaluationWorker>,
    ) -> Self {
        Self {
            schedules,
            actions,
            dispatcher,
            worker,
        }
    }

    /// Create a one-shot schedule.
    pub fn create_schedule(
        &self,
        tree_id: &str,
        scheduled_time: DateTime<Utc>,
        comparison_days: u32,
        action_id: Option<String>,
    ) -> Result<Schedule> {
        validate_comparison_days(comparison_days)?;
        if tree_id.is_empty() {
            return Err(VerdictError::InvalidRequest("tree_id must not be empty".into()));
        }

        let schedule = Schedule::new(tree_id, scheduled_time, comparison_days, action_id);
        self.schedules.save(&schedule)?;
        tracing::info!(
            "📅 Schedule {} created for tree {tree_id} at {scheduled_time}",
            schedule.id
        );
        Ok(schedule)
    }

    /// Create a recurring schedule: the first occurrence lands one minute
    /// out, and the cadence is recorded on the linked action for the
    /// repair path that re-arms completed recurrences.
    pub fn create_recurring_schedule(
        &self,
        cron_expression: &str,
        tree_id: &str,
        comparison_days: u32,
        action_id: Option<String>,
    ) -> Result<Schedule> {
        if CronSchedule::parse(cron_expression).is_none() {
            return Err(VerdictError::InvalidRequest(format!(
                "unsupported cron expression: {cron_expression}"
            )));
        }

        let first_occurrence = Utc::now() + Duration::minutes(1);
        let schedule =
            self.create_schedule(tree_id, first_occurrence, comparison_days, action_id.clone())?;

        if let Some(action_id) = action_id {
            if let Some(mut action) = self.actions.find_by_id(&action_id)? {
                if !action.params.is_object() {
                    action.params = json!({});
                }
                if let Some(obj) = action.params.as_object_mut() {
                    obj.insert("cron_expression".into(), json!(cron_expression));
                    obj.insert("is_recurring".into(), json!(true));
                }
                self.actions.save(&action)?;
            }
        }

        Ok(schedule)
    }

    /// Fire-and-forget dispatch cycle. Returns immediately; outcomes land
    /// in the store and the dispatcher's failure counter.
    pub fn process_due_schedules(&self) {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            let launched = dispatcher.run_cycle(Utc::now()).await;
            tracing::info!("Dispatch cycle launched {launched} worker(s)");
        });
        tracing::info!("Schedule processing initiated, continuing in background");
    }

    /// One-shot evaluation of a tree outside any schedule. Returns an
    /// operator-readable summary.
    pub async fn execute_for_tree(&self, tree_id: &str, comparison_days: u32) -> Result<String> {
        validate_comparison_days(comparison_days)?;

        let result = self.worker.evaluate(tree_id, comparison_days).await?;
        Ok(format!(
            "tree={tree_id} decision={} enriched={} sources=[{}]\n{}",
            result.decision,
            result.enriched,
            result.data_sources.join(", "),
            result.rationale
        ))
    }

    /// Schedule counts per status, for operator visibility (including
    /// IN_PROGRESS rows stranded by a crash).
    pub fn schedule_status_counts(&self) -> Result<BTreeMap<&'static str, u64>> {
        let mut counts = BTreeMap::new();
        for status in [
            ScheduleStatus::Pending,
            ScheduleStatus::InProgress,
            ScheduleStatus::Completed,
            ScheduleStatus::InvalidTree,
            ScheduleStatus::Error,
        ] {
            counts.insert(status.as_str(), self.schedules.count_by_status(status)?);
        }
        Ok(counts)
    }
}

fn validate_comparison_days(days: u32) -> Result<()> {
    if !COMPARISON_DAYS_RANGE.contains(&days) {
        return Err(VerdictError::InvalidRequest(format!(
            "comparison_days must be within {}..={}, got {days}",
            COMPARISON_DAYS_RANGE.start(),
            COMPARISON_DAYS_RANGE.end()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_days_bounds() {
        assert!(validate_comparison_days(0).is_err());
        assert!(validate_comparison_days(1).is_ok());
        assert!(validate_comparison_days(365).is_ok());
        assert!(validate_comparison_days(366).is_err());
    }
}
