//! SQLite-backed persistence for Verdict.
//!
//! One database file holds schedules, tree nodes, the append-only audit
//! log, and actions. Tables are created on open. Timestamps are RFC 3339
//! text; node children and action params are JSON columns.
//!
//! The connection sits behind a `Mutex` — store calls are short, and
//! schedules are independent rows, so row-level isolation is all the
//! concurrency the pipeline needs.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use verdict_core::error::{Result, VerdictError};
use verdict_core::traits::{ActionStore, AuditLog, ScheduleStore, TreeStore};
use verdict_core::types::{Action, AuditLogEntry, Schedule, ScheduleStatus, TreeNode};

/// SQLite store implementing all Verdict persistence traits.
pub struct VerdictDb {
    conn: Mutex<rusqlite::Connection>,
}

fn store_err(e: impl std::fmt::Display) -> VerdictError {
    VerdictError::Store(e.to_string())
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl VerdictDb {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = rusqlite::Connection::open(path).map_err(store_err)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// In-memory database, for tests and ad-hoc runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(store_err)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schedules (
                id TEXT PRIMARY KEY,
                scheduled_time TEXT NOT NULL,
                tree_id TEXT NOT NULL,
                comparison_days INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL DEFAULT 'PENDING',
                action_id TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_schedules_due
                ON schedules (status, scheduled_time);

            CREATE TABLE IF NOT EXISTS tree_nodes (
                node_id TEXT NOT NULL,
                tree_id TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT '',
                criteria TEXT NOT NULL DEFAULT '',
                children TEXT NOT NULL DEFAULT '{}',   -- JSON: branch label -> child node id
                PRIMARY KEY (node_id, tree_id)
            );

            -- Append-only: no UPDATE or DELETE is ever issued against this table.
            CREATE TABLE IF NOT EXISTS audit_log (
                id TEXT PRIMARY KEY,
                tree_id TEXT NOT NULL,
                tree_json TEXT NOT NULL DEFAULT '',
                decision INTEGER NOT NULL DEFAULT 0,
                rationale TEXT NOT NULL DEFAULT '',
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_audit_tree
                ON audit_log (tree_id, timestamp);

            CREATE TABLE IF NOT EXISTS actions (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                params TEXT NOT NULL DEFAULT '{}',     -- JSON payload incl. executions history
                last_executed_at TEXT,
                created_at TEXT NOT NULL
            );
            ",
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|_| VerdictError::Store("connection mutex poisoned".into()))
    }
}

impl ScheduleStore for VerdictDb {
    fn save(&self, schedule: &Schedule) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO schedules
             (id, scheduled_time, tree_id, comparison_days, status, action_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                schedule.id,
                schedule.scheduled_time.to_rfc3339(),
                schedule.tree_id,
                schedule.comparison_days,
                schedule.status.as_str(),
                schedule.action_id,
                schedule.created_at.to_rfc3339(),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Schedule>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, scheduled_time, tree_id, comparison_days, status, action_id, created_at
                 FROM schedules WHERE id = ?1",
            )
            .map_err(store_err)?;
        let mut rows = stmt
            .query_map([id], decode_schedule)
            .map_err(store_err)?;
        match rows.next() {
            Some(row) => Ok(Some(row.map_err(store_err)?)),
            None => Ok(None),
        }
    }

    fn find_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        status: ScheduleStatus,
    ) -> Result<Vec<Schedule>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, scheduled_time, tree_id, comparison_days, status, action_id, created_at
                 FROM schedules
                 WHERE status = ?1 AND scheduled_time >= ?2 AND scheduled_time <= ?3
                 ORDER BY scheduled_time",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(
                rusqlite::params![status.as_str(), from.to_rfc3339(), to.to_rfc3339()],
                decode_schedule,
            )
            .map_err(store_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(store_err)
    }

    fn count_by_status(&self, status: ScheduleStatus) -> Result<u64> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM schedules WHERE status = ?1",
            [status.as_str()],
            |row| row.get::<_, u64>(0),
        )
        .map_err(store_err)
    }
}

fn decode_schedule(row: &rusqlite::Row<'_>) -> rusqlite::Result<Schedule> {
    let scheduled_time: String = row.get(1)?;
    let status: String = row.get(4)?;
    let created_at: String = row.get(6)?;
    Ok(Schedule {
        id: row.get(0)?,
        scheduled_time: parse_ts(&scheduled_time),
        tree_id: row.get(2)?,
        comparison_days: row.get(3)?,
        status: ScheduleStatus::parse(&status),
        action_id: row.get(5)?,
        created_at: parse_ts(&created_at),
    })
}

impl TreeStore for VerdictDb {
    fn find_by_tree_id(&self, tree_id: &str) -> Result<Vec<TreeNode>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT node_id, tree_id, content, criteria, children
                 FROM tree_nodes WHERE tree_id = ?1 ORDER BY node_id",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map([tree_id], |row| {
                let children_json: String = row.get(4)?;
                let children: BTreeMap<String, String> =
                    serde_json::from_str(&children_json).unwrap_or_default();
                Ok(TreeNode {
                    node_id: row.get(0)?,
                    tree_id: row.get(1)?,
                    content: row.get(2)?,
                    criteria: row.get(3)?,
                    children,
                })
            })
            .map_err(store_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(store_err)
    }

    fn save_nodes(&self, nodes: &[TreeNode]) -> Result<()> {
        let conn = self.conn()?;
        for node in nodes {
            let children = serde_json::to_string(&node.children)
                .map_err(|e| VerdictError::Store(format!("Serialize children: {e}")))?;
            conn.execute(
                "INSERT OR REPLACE INTO tree_nodes (node_id, tree_id, content, criteria, children)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![node.node_id, node.tree_id, node.content, node.criteria, children],
            )
            .map_err(store_err)?;
        }
        tracing::debug!("💾 Saved {} tree nodes", nodes.len());
        Ok(())
    }
}

impl AuditLog for VerdictDb {
    fn append(&self, entry: &AuditLogEntry) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO audit_log (id, tree_id, tree_json, decision, rationale, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                entry.id,
                entry.tree_id,
                entry.tree_json,
                entry.decision as i32,
                entry.rationale,
                entry.timestamp.to_rfc3339(),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn recent_for_tree(&self, tree_id: &str, limit: usize) -> Result<Vec<AuditLogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, tree_id, tree_json, decision, rationale, timestamp
                 FROM audit_log WHERE tree_id = ?1
                 ORDER BY timestamp DESC LIMIT ?2",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(rusqlite::params![tree_id, limit as i64], decode_audit)
            .map_err(store_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(store_err)
    }

    fn in_time_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<AuditLogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, tree_id, tree_json, decision, rationale, timestamp
                 FROM audit_log WHERE timestamp >= ?1 AND timestamp <= ?2
                 ORDER BY timestamp",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(
                rusqlite::params![from.to_rfc3339(), to.to_rfc3339()],
                decode_audit,
            )
            .map_err(store_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(store_err)
    }
}

fn decode_audit(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditLogEntry> {
    let decision: i32 = row.get(3)?;
    let timestamp: String = row.get(5)?;
    Ok(AuditLogEntry {
        id: row.get(0)?,
        tree_id: row.get(1)?,
        tree_json: row.get(2)?,
        decision: decision != 0,
        rationale: row.get(4)?,
        timestamp: parse_ts(&timestamp),
    })
}

impl ActionStore for VerdictDb {
    fn save(&self, action: &Action) -> Result<()> {
        let conn = self.conn()?;
        let params = serde_json::to_string(&action.params)
            .map_err(|e| VerdictError::Store(format!("Serialize action params: {e}")))?;
        conn.execute(
            "INSERT OR REPLACE INTO actions (id, kind, params, last_executed_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                action.id,
                action.kind,
                params,
                action.last_executed_at.map(|t| t.to_rfc3339()),
                action.created_at.to_rfc3339(),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Action>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, kind, params, last_executed_at, created_at
                 FROM actions WHERE id = ?1",
            )
            .map_err(store_err)?;
        let mut rows = stmt
            .query_map([id], |row| {
                let params_json: String = row.get(2)?;
                let last_executed: Option<String> = row.get(3)?;
                let created_at: String = row.get(4)?;
                Ok(Action {
                    id: row.get(0)?,
                    kind: row.get(1)?,
                    params: serde_json::from_str(&params_json)
                        .unwrap_or(serde_json::Value::Null),
                    last_executed_at: last_executed.as_deref().map(parse_ts),
                    created_at: parse_ts(&created_at),
                })
            })
            .map_err(store_err)?;
        match rows.next() {
            Some(row) => Ok(Some(row.map_err(store_err)?)),
            None => Ok(None),
        }
    }
}
