//! Schedule dispatcher — finds due work and fans it out.
//!
//! Each due schedule gets its own tokio task; a semaphore bounds how many
//! run at once, and when every permit is taken the dispatching loop blocks
//! on acquisition (caller-blocks backpressure) instead of piling up
//! unbounded tasks. Worker outcomes only feed a failure counter — a
//! worker can never fail the dispatcher or a sibling.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Semaphore;
use verdict_core::config::SchedulerConfig;
use verdict_core::error::Result;
use verdict_core::traits::ScheduleStore;
use verdict_core::types::{Schedule, ScheduleStatus};

use crate::worker::EvaluationWorker;

/// Dispatches due schedules onto a bounded worker pool.
pub struct Dispatcher {
    worker: Arc<EvaluationWorker>,
    schedules: Arc<dyn ScheduleStore>,
    limiter: Arc<Semaphore>,
    /// How far past due a PENDING schedule is still picked up.
    late_tolerance: Duration,
    /// How far ahead of its time a schedule may fire.
    early_tolerance: Duration,
    /// Shared with spawned workers, which may outlive a dispatch call.
    failures: Arc<AtomicU64>,
}

impl Dispatcher {
    pub fn new(
        worker: Arc<EvaluationWorker>,
        schedules: Arc<dyn ScheduleStore>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            worker,
            schedules,
            limiter: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            late_tolerance: Duration::minutes(config.late_tolerance_mins),
            early_tolerance: Duration::minutes(config.early_tolerance_mins),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// PENDING schedules inside `[now − late_tolerance, now + early_tolerance]`.
    ///
    /// The window bounds both missed-trigger catch-up and double-firing
    /// risk: a schedule older than the late tolerance is never picked up
    /// again, and nothing fires more than the early tolerance ahead.
    pub fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<Schedule>> {
        self.schedules.find_in_window(
            now - self.late_tolerance,
            now + self.early_tolerance,
            ScheduleStatus::Pending,
        )
    }

    /// Launch one worker per schedule without waiting for completion.
    ///
    /// Returns once every task is spawned; spawning blocks while the pool
    /// is saturated. The completion callback only updates the failure
    /// counter, never rethrows.
    pub async fn dispatch_all(&self, schedules: Vec<Schedule>) -> usize {
        let launched = schedules.len();
        for schedule in schedules {
            let permit = match self.limiter.clone().acquire_owned().await {
                Ok(permit) => permit,
                // The semaphore is never closed; treat it as shutdown
                Err(_) => break,
            };

            let worker = self.worker.clone();
            let failures = self.failures.clone();
            tokio::spawn(async move {
                let schedule_id = schedule.id.clone();
                let status = worker.process(schedule).await;
                if status == ScheduleStatus::Error {
                    failures.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("Worker for schedule {schedule_id} ended in ERROR");
                }
                drop(permit);
            });
        }
        launched
    }

    /// One dispatch cycle: discover and fan out.
    ///
    /// A discovery failure (storage unavailable) skips the whole cycle —
    /// it is retried by the next periodic trigger, never within the cycle.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> usize {
        let due = match self.find_due(now) {
            Ok(due) => due,
            Err(e) => {
                tracing::error!("⚠️ Could not discover due schedules, skipping cycle: {e}");
                return 0;
            }
        };

        if due.is_empty() {
            tracing::debug!("No due schedules at {now}");
            return 0;
        }

        tracing::info!("🔔 Found {} due schedule(s) to process", due.len());
        self.dispatch_all(due).await
    }

    /// Total workers that ended in ERROR since startup.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
