//! End-to-end pipeline tests against the real SQLite store (in-memory)
//! with scripted reasoning and disabled enrichment.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use verdict_core::error::{Result, VerdictError};
use verdict_core::traits::{ActionStore, AuditLog, Reasoner, ScheduleStore, TreeStore};
use verdict_core::types::{Action, Schedule, ScheduleStatus, TreeNode};
use verdict_engine::actions::ActionExecutor;
use verdict_engine::dispatcher::Dispatcher;
use verdict_engine::service::EvaluationService;
use verdict_engine::worker::EvaluationWorker;
use verdict_market::Enricher;
use verdict_store::VerdictDb;

/// Reasoner double: canned reply, or a timeout-style failure when `None`.
struct ScriptedReasoner {
    reply: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedReasoner {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(text.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Some(text) => Ok(text.clone()),
            None => Err(VerdictError::Provider("read timeout after 120s".into())),
        }
    }
}

struct Harness {
    db: Arc<VerdictDb>,
    reasoner: Arc<ScriptedReasoner>,
    worker: Arc<EvaluationWorker>,
}

fn harness(reasoner: Arc<ScriptedReasoner>) -> Harness {
    let db = Arc::new(VerdictDb::open_in_memory().expect("in-memory db"));
    let schedules: Arc<dyn ScheduleStore> = db.clone();
    let trees: Arc<dyn TreeStore> = db.clone();
    let audit: Arc<dyn AuditLog> = db.clone();
    let actions: Arc<dyn ActionStore> = db.clone();

    let executor = Arc::new(ActionExecutor::with_defaults(
        actions.clone(),
        reasoner.clone(),
        trees.clone(),
    ));
    let worker = Arc::new(EvaluationWorker::new(
        schedules,
        trees,
        audit,
        actions,
        reasoner.clone(),
        Arc::new(Enricher::disabled()),
        executor,
    ));

    Harness {
        db,
        reasoner,
        worker,
    }
}

fn single_node_tree(tree_id: &str) -> Vec<TreeNode> {
    vec![TreeNode {
        node_id: "n1".into(),
        tree_id: tree_id.into(),
        content: "trend check".into(),
        criteria: "has the trend strengthened since the reference period?".into(),
        children: Default::default(),
    }]
}

#[tokio::test]
async fn scenario_a_positive_decision_completes_and_fires_action_once() {
    let h = harness(ScriptedReasoner::replying("DECISION: true\nCRITERIA: strong trend"));
    h.db.save_nodes(&single_node_tree("t1")).unwrap();

    let action = Action::new("NOTIFY", serde_json::json!({"message": "tree fired"}));
    ActionStore::save(h.db.as_ref(), &action).unwrap();

    let schedule = Schedule::new("t1", Utc::now(), 7, Some(action.id.clone()));
    ScheduleStore::save(h.db.as_ref(), &schedule).unwrap();

    let status = h.worker.process(schedule.clone()).await;
    assert_eq!(status, ScheduleStatus::Completed);

    let stored = ScheduleStore::find_by_id(h.db.as_ref(), &schedule.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ScheduleStatus::Completed);

    // Audit captured the positive decision and the parsed rationale
    let entries = h.db.recent_for_tree("t1", 10).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].decision);
    assert_eq!(entries[0].rationale, "strong trend");

    // The linked action executed exactly once, immutably recorded
    let executed = ActionStore::find_by_id(h.db.as_ref(), &action.id)
        .unwrap()
        .unwrap();
    assert!(executed.last_executed_at.is_some());
    let history = executed.params["executions"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["context"]["schedule_id"], schedule.id.as_str());
}

#[tokio::test]
async fn scenario_b_missing_tree_errors_without_reasoning_call() {
    let h = harness(ScriptedReasoner::replying("DECISION: true"));

    let schedule = Schedule::new("ghost", Utc::now(), 1, None);
    ScheduleStore::save(h.db.as_ref(), &schedule).unwrap();

    let status = h.worker.process(schedule.clone()).await;
    assert_eq!(status, ScheduleStatus::Error);
    assert_eq!(h.reasoner.call_count(), 0);

    let stored = ScheduleStore::find_by_id(h.db.as_ref(), &schedule.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ScheduleStatus::Error);
}

#[tokio::test]
async fn scenario_c_reasoning_timeout_errors_with_failure_audit() {
    let h = harness(ScriptedReasoner::failing());
    h.db.save_nodes(&single_node_tree("t1")).unwrap();

    let action = Action::new("NOTIFY", serde_json::json!({"message": "never"}));
    ActionStore::save(h.db.as_ref(), &action).unwrap();

    let schedule = Schedule::new("t1", Utc::now(), 7, Some(action.id.clone()));
    ScheduleStore::save(h.db.as_ref(), &schedule).unwrap();

    let status = h.worker.process(schedule).await;
    assert_eq!(status, ScheduleStatus::Error);

    // Exactly one failure audit entry, decision false
    let entries = h.db.recent_for_tree("t1", 10).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].decision);
    assert!(entries[0].rationale.contains("Evaluation failed"));

    // The action was never invoked
    let untouched = ActionStore::find_by_id(h.db.as_ref(), &action.id)
        .unwrap()
        .unwrap();
    assert!(untouched.last_executed_at.is_none());
}

#[tokio::test]
async fn scenario_d_unparseable_response_fails_closed_and_completes() {
    let h = harness(ScriptedReasoner::replying("Overall sentiment is mixed."));
    h.db.save_nodes(&single_node_tree("t1")).unwrap();

    let schedule = Schedule::new("t1", Utc::now(), 1, None);
    ScheduleStore::save(h.db.as_ref(), &schedule).unwrap();

    let status = h.worker.process(schedule).await;
    assert_eq!(status, ScheduleStatus::Completed);

    let entries = h.db.recent_for_tree("t1", 10).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].decision);
    assert_eq!(entries[0].rationale, "Overall sentiment is mixed.");
}

#[tokio::test]
async fn invalid_tree_is_soft_terminal() {
    let h = harness(ScriptedReasoner::replying("DECISION: true"));
    let mut nodes = single_node_tree("t1");
    nodes[0].criteria = String::new();
    h.db.save_nodes(&nodes).unwrap();

    let schedule = Schedule::new("t1", Utc::now(), 1, None);
    ScheduleStore::save(h.db.as_ref(), &schedule).unwrap();

    let status = h.worker.process(schedule.clone()).await;
    assert_eq!(status, ScheduleStatus::InvalidTree);
    assert_eq!(h.reasoner.call_count(), 0);

    let stored = ScheduleStore::find_by_id(h.db.as_ref(), &schedule.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ScheduleStatus::InvalidTree);
}

#[tokio::test]
async fn unsupported_action_type_does_not_block_completion() {
    let h = harness(ScriptedReasoner::replying("DECISION: true\nCRITERIA: go"));
    h.db.save_nodes(&single_node_tree("t1")).unwrap();

    let action = Action::new("TELEPORT", serde_json::json!({}));
    ActionStore::save(h.db.as_ref(), &action).unwrap();

    let schedule = Schedule::new("t1", Utc::now(), 1, Some(action.id.clone()));
    ScheduleStore::save(h.db.as_ref(), &schedule).unwrap();

    let status = h.worker.process(schedule).await;
    assert_eq!(status, ScheduleStatus::Completed);

    // No execution record for the unsupported action
    let untouched = ActionStore::find_by_id(h.db.as_ref(), &action.id)
        .unwrap()
        .unwrap();
    assert!(untouched.last_executed_at.is_none());
}

#[tokio::test]
async fn audit_log_is_append_only_across_runs() {
    let h = harness(ScriptedReasoner::replying("DECISION: false\nCRITERIA: flat"));
    h.db.save_nodes(&single_node_tree("t1")).unwrap();

    for _ in 0..2 {
        let schedule = Schedule::new("t1", Utc::now(), 1, None);
        ScheduleStore::save(h.db.as_ref(), &schedule).unwrap();
        h.worker.process(schedule).await;
    }

    // Two runs, two entries — never an overwrite
    let entries = h.db.recent_for_tree("t1", 10).unwrap();
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn dispatcher_window_excludes_out_of_range_schedules() {
    let h = harness(ScriptedReasoner::replying("DECISION: false"));
    let config = verdict_core::config::SchedulerConfig::default();
    let dispatcher = Dispatcher::new(h.worker.clone(), h.db.clone(), &config);

    let now = Utc::now();
    let in_window = Schedule::new("t1", now - Duration::minutes(3), 1, None);
    let too_old = Schedule::new("t1", now - Duration::minutes(6), 1, None);
    let too_far_out = Schedule::new("t1", now + Duration::minutes(2), 1, None);
    for s in [&in_window, &too_old, &too_far_out] {
        ScheduleStore::save(h.db.as_ref(), s).unwrap();
    }

    let due = dispatcher.find_due(now).unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, in_window.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dispatch_cycle_runs_workers_to_terminal_status() {
    let h = harness(ScriptedReasoner::replying("DECISION: true\nCRITERIA: up"));
    h.db.save_nodes(&single_node_tree("t1")).unwrap();
    let config = verdict_core::config::SchedulerConfig::default();
    let dispatcher = Arc::new(Dispatcher::new(h.worker.clone(), h.db.clone(), &config));

    let schedule = Schedule::new("t1", Utc::now(), 1, None);
    ScheduleStore::save(h.db.as_ref(), &schedule).unwrap();

    let launched = dispatcher.run_cycle(Utc::now()).await;
    assert_eq!(launched, 1);

    // Fire-and-forget: poll the store until the worker lands
    let mut status = ScheduleStatus::Pending;
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        status = ScheduleStore::find_by_id(h.db.as_ref(), &schedule.id)
            .unwrap()
            .unwrap()
            .status;
        if status.is_terminal() {
            break;
        }
    }
    assert_eq!(status, ScheduleStatus::Completed);
    assert_eq!(dispatcher.failure_count(), 0);
}

#[tokio::test]
async fn service_rejects_bad_input_before_any_work() {
    let h = harness(ScriptedReasoner::replying("DECISION: false"));
    let config = verdict_core::config::SchedulerConfig::default();
    let dispatcher = Arc::new(Dispatcher::new(h.worker.clone(), h.db.clone(), &config));
    let service = EvaluationService::new(
        h.db.clone(),
        h.db.clone(),
        dispatcher,
        h.worker.clone(),
    );

    let err = service
        .create_schedule("t1", Utc::now(), 0, None)
        .unwrap_err();
    assert!(matches!(err, VerdictError::InvalidRequest(_)));

    let err = service.execute_for_tree("t1", 9999).await.unwrap_err();
    assert!(matches!(err, VerdictError::InvalidRequest(_)));
    assert_eq!(h.reasoner.call_count(), 0);
}

#[tokio::test]
async fn service_records_recurring_cadence_on_action() {
    let h = harness(ScriptedReasoner::replying("DECISION: false"));
    let config = verdict_core::config::SchedulerConfig::default();
    let dispatcher = Arc::new(Dispatcher::new(h.worker.clone(), h.db.clone(), &config));
    let service = EvaluationService::new(
        h.db.clone(),
        h.db.clone(),
        dispatcher,
        h.worker.clone(),
    );

    let action = Action::new("NOTIFY", serde_json::json!({"message": "tick"}));
    ActionStore::save(h.db.as_ref(), &action).unwrap();

    let schedule = service
        .create_recurring_schedule("*/5 * * * *", "t1", 7, Some(action.id.clone()))
        .unwrap();
    assert_eq!(schedule.status, ScheduleStatus::Pending);
    assert!(schedule.scheduled_time > Utc::now());

    let updated = ActionStore::find_by_id(h.db.as_ref(), &action.id)
        .unwrap()
        .unwrap();
    assert_eq!(updated.params["cron_expression"], "*/5 * * * *");
    assert_eq!(updated.params["is_recurring"], true);

    let err = service
        .create_recurring_schedule("not-cron", "t1", 7, None)
        .unwrap_err();
    assert!(matches!(err, VerdictError::InvalidRequest(_)));
}
