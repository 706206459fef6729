//! Collaborator traits — every external dependency of the evaluation
//! pipeline is injected behind one of these, so the engine can be exercised
//! with in-memory doubles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{Action, AuditLogEntry, Quote, Schedule, ScheduleStatus, SymbolMetrics, TreeNode};

/// The external reasoning capability: non-deterministic text completion
/// over live information. Its output correctness is out of our control —
/// the pipeline's job is robust orchestration and parsing around it.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Plain completion with a system and user message.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// Completion restricted to information from the last `recency_days`
    /// days. Providers without a recency filter fall back to `complete`.
    async fn complete_recent(&self, system: &str, user: &str, recency_days: u32) -> Result<String> {
        let _ = recency_days;
        self.complete(system, user).await
    }
}

/// Verifiable reference data for short all-caps identifiers (tickers).
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Current quote. An unknown symbol is an `Err`, not a zeroed quote.
    async fn quote(&self, symbol: &str) -> Result<Quote>;

    /// 52-week reference metrics used as the historical comparison point.
    async fn metrics(&self, symbol: &str) -> Result<SymbolMetrics>;
}

/// Schedule persistence. Row-level isolation is sufficient — schedules are
/// independent units of work and exactly one worker owns an invocation.
pub trait ScheduleStore: Send + Sync {
    fn save(&self, schedule: &Schedule) -> Result<()>;

    fn find_by_id(&self, id: &str) -> Result<Option<Schedule>>;

    /// Schedules with the given status inside `[from, to]`.
    fn find_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        status: ScheduleStatus,
    ) -> Result<Vec<Schedule>>;

    fn count_by_status(&self, status: ScheduleStatus) -> Result<u64>;
}

/// Tree node persistence.
pub trait TreeStore: Send + Sync {
    /// All nodes sharing a tree id. Empty vec = tree does not exist.
    fn find_by_tree_id(&self, tree_id: &str) -> Result<Vec<TreeNode>>;

    /// Upsert nodes by `(node_id, tree_id)`.
    fn save_nodes(&self, nodes: &[TreeNode]) -> Result<()>;
}

/// Append-only evaluation audit log.
pub trait AuditLog: Send + Sync {
    fn append(&self, entry: &AuditLogEntry) -> Result<()>;

    fn recent_for_tree(&self, tree_id: &str, limit: usize) -> Result<Vec<AuditLogEntry>>;

    fn in_time_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<AuditLogEntry>>;
}

/// Action persistence.
pub trait ActionStore: Send + Sync {
    fn save(&self, action: &Action) -> Result<()>;

    fn find_by_id(&self, id: &str) -> Result<Option<Action>>;
}
