//! Data model for scheduled tree evaluations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scheduled evaluation binding a tree, a time, a comparison window, and
/// an optional follow-up action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    /// Unique schedule ID.
    pub id: String,
    /// When the evaluation should run.
    pub scheduled_time: DateTime<Utc>,
    /// The tree to evaluate.
    pub tree_id: String,
    /// How many days back the evaluation compares against.
    pub comparison_days: u32,
    /// Current lifecycle status.
    pub status: ScheduleStatus,
    /// Action to fire on a positive decision (None = evaluate only).
    pub action_id: Option<String>,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
}

impl Schedule {
    /// Create a new pending schedule.
    pub fn new(
        tree_id: &str,
        scheduled_time: DateTime<Utc>,
        comparison_days: u32,
        action_id: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            scheduled_time,
            tree_id: tree_id.to_string(),
            comparison_days,
            status: ScheduleStatus::Pending,
            action_id,
            created_at: Utc::now(),
        }
    }
}

/// Schedule lifecycle status.
///
/// `Completed`, `InvalidTree`, and `Error` are terminal for an invocation —
/// re-processing requires a new schedule record, never a status reset.
/// `InvalidTree` means the data was unusable, not that the pipeline failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleStatus {
    Pending,
    InProgress,
    Completed,
    InvalidTree,
    Error,
}

impl ScheduleStatus {
    /// Canonical string tag, as stored and queried.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "PENDING",
            ScheduleStatus::InProgress => "IN_PROGRESS",
            ScheduleStatus::Completed => "COMPLETED",
            ScheduleStatus::InvalidTree => "INVALID_TREE",
            ScheduleStatus::Error => "ERROR",
        }
    }

    /// Parse a stored tag. Unknown tags map to `Error` rather than panic —
    /// a row written by a newer version must not wedge the dispatcher.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "PENDING" => ScheduleStatus::Pending,
            "IN_PROGRESS" => ScheduleStatus::InProgress,
            "COMPLETED" => ScheduleStatus::Completed,
            "INVALID_TREE" => ScheduleStatus::InvalidTree,
            _ => ScheduleStatus::Error,
        }
    }

    /// Whether this status ends the invocation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScheduleStatus::Completed | ScheduleStatus::InvalidTree | ScheduleStatus::Error
        )
    }
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of a decision tree.
///
/// Node identity is the pair `(node_id, tree_id)`. Nodes are immutable
/// inputs to an evaluation — the pipeline never mutates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub node_id: String,
    pub tree_id: String,
    /// Human-readable description of the decision point.
    pub content: String,
    /// The criteria the reasoning service evaluates at this node.
    pub criteria: String,
    /// Branch label (e.g. "yes"/"no") → child node id.
    #[serde(default)]
    pub children: BTreeMap<String, String>,
}

impl TreeNode {
    /// Leaf nodes carry the terminal recommendation.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Outcome of one evaluation run. In-memory only — consumed by the action
/// executor and the audit logger, then discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// The parsed decision. `false` whenever the response was ambiguous.
    pub decision: bool,
    /// The reasoning service's analysis text.
    pub rationale: String,
    /// Which sources contributed (reasoning search, market data API).
    pub data_sources: Vec<String>,
    /// Whether real market data was injected into the request.
    pub enriched: bool,
}

/// Append-only record of one evaluation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub tree_id: String,
    /// Snapshot of the tree as evaluated.
    pub tree_json: String,
    pub decision: bool,
    pub rationale: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(tree_id: &str, tree_json: &str, decision: bool, rationale: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tree_id: tree_id.to_string(),
            tree_json: tree_json.to_string(),
            decision,
            rationale: rationale.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// A follow-up action fired on a positive decision.
///
/// `params` carries the type-specific payload; executed runs are appended
/// to a `params.executions` array and never overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    /// Type tag, e.g. "EMAIL_ALERT", "API_CALL", "NOTIFY", "REFINE_TREE".
    pub kind: String,
    pub params: serde_json::Value,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Action {
    pub fn new(kind: &str, params: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            params,
            last_executed_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Current quote for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub price: f64,
    pub previous_close: f64,
}

/// Longer-horizon reference metrics for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolMetrics {
    pub week52_low: f64,
    pub week52_high: f64,
    pub average_volume: u64,
    /// Market capitalization in millions.
    pub market_cap: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            ScheduleStatus::Pending,
            ScheduleStatus::InProgress,
            ScheduleStatus::Completed,
            ScheduleStatus::InvalidTree,
            ScheduleStatus::Error,
        ] {
            assert_eq!(ScheduleStatus::parse(status.as_str()), status);
        }
        // Unknown tags never panic and never resurrect as PENDING
        assert_eq!(ScheduleStatus::parse("FAILED"), ScheduleStatus::Error);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ScheduleStatus::Pending.is_terminal());
        assert!(!ScheduleStatus::InProgress.is_terminal());
        assert!(ScheduleStatus::Completed.is_terminal());
        assert!(ScheduleStatus::InvalidTree.is_terminal());
        assert!(ScheduleStatus::Error.is_terminal());
    }

    #[test]
    fn test_node_json_shape() {
        let json = r#"{"nodeId":"n1","treeId":"t1","content":"root","criteria":"price up?","children":{"yes":"n2","no":"n3"}}"#;
        let node: TreeNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.node_id, "n1");
        assert_eq!(node.children.get("yes").unwrap(), "n2");
        assert!(!node.is_leaf());
    }

    #[test]
    fn test_schedule_defaults() {
        let s = Schedule::new("t1", Utc::now(), 7, None);
        assert_eq!(s.status, ScheduleStatus::Pending);
        assert!(s.action_id.is_none());
    }
}
