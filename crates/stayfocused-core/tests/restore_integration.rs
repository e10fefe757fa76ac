//! Integration tests for restart recovery.
//!
//! Each "process" is a fresh `FocusManager` over the same on-disk database,
//! with rules and alarms persisted in their SQLite tables the way the CLI
//! runs them.

use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use std::sync::Arc;

use stayfocused_core::{
    AlarmHost, AlarmTable, BlockRule, ChannelBroadcaster, Database, FireOutcome, FocusManager,
    ManualClock, RuleEnforcer, RuleTable, SessionPlan, StartRequest, END_FOCUS_ALARM,
};

struct Process {
    manager: FocusManager,
    rules: Arc<RuleTable>,
    alarms: Arc<AlarmTable>,
}

fn spawn(path: &Path, now: DateTime<Utc>) -> Process {
    let db = Arc::new(Database::open_at(path).unwrap());
    let rules = Arc::new(RuleTable::new(db.clone()));
    let alarms = Arc::new(AlarmTable::new(db.clone()));
    let manager = FocusManager::new(
        db,
        rules.clone(),
        alarms.clone(),
        Arc::new(ChannelBroadcaster::new()),
        Arc::new(ManualClock::new(now)),
    );
    Process {
        manager,
        rules,
        alarms,
    }
}

async fn rules_of(p: &Process) -> Vec<BlockRule> {
    p.rules.dynamic_rules().await.unwrap()
}

fn one_hour() -> StartRequest {
    StartRequest::now(SessionPlan::Timed {
        hours: 1,
        minutes: 0,
    })
}

#[tokio::test]
async fn test_restore_before_end_rearms_exact_end_time() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stayfocused.db");
    let t0 = Utc::now();

    let first = spawn(&path, t0);
    first.manager.initialize().await.unwrap();
    let status = first.manager.start_session(one_hour()).await.unwrap();
    let end = status.end_time.unwrap();
    let rules_before = rules_of(&first).await;
    drop(first);

    // The host may have dropped alarms while the process was gone.
    let second = spawn(&path, t0 + Duration::minutes(20));
    second.alarms.clear(END_FOCUS_ALARM).await.unwrap();
    let restored = second.manager.initialize().await.unwrap();

    assert!(restored.active);
    assert_eq!(restored.end_time, Some(end));
    let alarm = second.alarms.get(END_FOCUS_ALARM).await.unwrap().unwrap();
    assert_eq!(alarm.scheduled_time, end);
    assert_eq!(rules_of(&second).await, rules_before);
}

#[tokio::test]
async fn test_restore_after_end_equals_explicit_stop() {
    let dir = tempfile::tempdir().unwrap();
    let t0 = Utc::now();

    // Path A: stop explicitly before the restart.
    let path_a = dir.path().join("a.db");
    let a = spawn(&path_a, t0);
    a.manager.initialize().await.unwrap();
    a.manager.start_session(one_hour()).await.unwrap();
    a.manager.stop_session().await.unwrap();
    drop(a);
    let a = spawn(&path_a, t0 + Duration::hours(2));
    let status_a = a.manager.initialize().await.unwrap();

    // Path B: let the end pass while nothing runs.
    let path_b = dir.path().join("b.db");
    let b = spawn(&path_b, t0);
    b.manager.initialize().await.unwrap();
    b.manager.start_session(one_hour()).await.unwrap();
    drop(b);
    let b = spawn(&path_b, t0 + Duration::hours(2));
    let status_b = b.manager.initialize().await.unwrap();

    assert_eq!(status_a, status_b);
    assert!(!status_b.active);
    assert!(rules_of(&a).await.is_empty());
    assert!(rules_of(&b).await.is_empty());
    assert!(b.alarms.get(END_FOCUS_ALARM).await.unwrap().is_none());
}

#[tokio::test]
async fn test_indefinite_session_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stayfocused.db");
    let t0 = Utc::now();

    let first = spawn(&path, t0);
    first.manager.initialize().await.unwrap();
    first
        .manager
        .start_session(StartRequest::now(SessionPlan::Indefinite))
        .await
        .unwrap();
    drop(first);

    let second = spawn(&path, t0 + Duration::days(3));
    let status = second.manager.initialize().await.unwrap();
    assert!(status.active);
    assert!(status.end_time.is_none());
    assert_eq!(rules_of(&second).await.len(), 5);
    assert!(second.alarms.all().unwrap().is_empty());
}

#[tokio::test]
async fn test_due_alarm_after_restart_expires_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stayfocused.db");
    let t0 = Utc::now();

    let first = spawn(&path, t0);
    first.manager.initialize().await.unwrap();
    let end = first
        .manager
        .start_session(one_hour())
        .await
        .unwrap()
        .end_time
        .unwrap();
    drop(first);

    // Alarm delivered by the poll loop of the next process, before restore.
    let second = spawn(&path, end);
    let due = second.alarms.take_due(end).unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(
        second.manager.on_alarm(&due[0]).await.unwrap(),
        FireOutcome::Expired
    );
    assert!(rules_of(&second).await.is_empty());
    assert!(second.alarms.take_due(end).unwrap().is_empty());
}

#[tokio::test]
async fn test_leftover_rules_are_cleared_on_inactive_restore() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stayfocused.db");

    let p = spawn(&path, Utc::now());
    p.manager.initialize().await.unwrap();
    p.rules
        .update_dynamic_rules(vec![], vec![BlockRule::redirect(1, "stale.com", "/pages/blocked.html")])
        .await
        .unwrap();

    p.manager.restore().await.unwrap();
    assert!(rules_of(&p).await.is_empty());
}
