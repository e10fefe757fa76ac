//! Integration tests for the focus session lifecycle.
//!
//! These tests drive a `FocusManager` over an in-memory database, the
//! in-memory rule engine and in-process alarms, and check what ends up
//! installed after each transition.

use chrono::{Duration, Utc};
use std::sync::Arc;

use stayfocused_core::error::ValidationError;
use stayfocused_core::focus::{is_valid_domain, normalize_domain, ClockTime};
use stayfocused_core::{
    BlockMode, ChannelBroadcaster, Clock, CoreError, Database, Event, FireOutcome, FocusManager,
    ManualClock, MemoryRuleEnforcer, RuleEnforcer, SessionPlan, StartRequest, TokioAlarms,
};

struct Setup {
    manager: FocusManager,
    enforcer: Arc<MemoryRuleEnforcer>,
    clock: Arc<ManualClock>,
    events: tokio::sync::mpsc::UnboundedReceiver<Event>,
}

async fn setup() -> Setup {
    let enforcer = Arc::new(MemoryRuleEnforcer::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let (alarms, _fired) = TokioAlarms::new();
    let broadcaster = Arc::new(ChannelBroadcaster::new());
    let events = broadcaster.register("options");

    let manager = FocusManager::new(
        Arc::new(Database::open_memory().unwrap()),
        enforcer.clone(),
        Arc::new(alarms),
        broadcaster,
        clock.clone(),
    );
    manager.initialize().await.unwrap();
    Setup {
        manager,
        enforcer,
        clock,
        events,
    }
}

async fn installed(enforcer: &MemoryRuleEnforcer) -> Vec<(u32, String)> {
    enforcer
        .dynamic_rules()
        .await
        .unwrap()
        .iter()
        .map(|r| (r.id, r.domain().to_string()))
        .collect()
}

fn until(time: &str) -> SessionPlan {
    SessionPlan::UntilClockTime {
        until: time.parse::<ClockTime>().unwrap(),
    }
}

#[tokio::test]
async fn test_start_then_stop_leaves_no_rules_for_every_mode() {
    for plan in [
        SessionPlan::Timed {
            hours: 0,
            minutes: 30,
        },
        until("06:15"),
        SessionPlan::Indefinite,
    ] {
        let s = setup().await;
        let status = s.manager.start_session(StartRequest::now(plan)).await.unwrap();
        assert!(status.active);
        assert_eq!(status.mode, plan.mode());
        assert!(!installed(&s.enforcer).await.is_empty());

        let status = s.manager.stop_session().await.unwrap();
        assert!(!status.active);
        assert!(installed(&s.enforcer).await.is_empty());
        assert!(s.manager.scheduler().pending().await.unwrap().is_none());
    }
}

#[tokio::test]
async fn test_allow_list_scenario() {
    let s = setup().await;
    s.manager
        .update_site_lists(
            Some(vec!["a.com".into(), "b.com".into(), "c.com".into()]),
            Some(vec!["b.com".into()]),
        )
        .await
        .unwrap();
    s.manager
        .start_session(StartRequest::now(SessionPlan::Timed {
            hours: 1,
            minutes: 0,
        }))
        .await
        .unwrap();

    assert_eq!(
        installed(&s.enforcer).await,
        vec![(1, "a.com".to_string()), (2, "c.com".to_string())]
    );
}

#[tokio::test]
async fn test_zero_duration_is_rejected() {
    let s = setup().await;
    let err = s
        .manager
        .start_session(StartRequest::now(SessionPlan::Timed {
            hours: 0,
            minutes: 0,
        }))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::ZeroDuration)
    ));
    assert!(!s.manager.get_status().await.unwrap().active);
    assert!(installed(&s.enforcer).await.is_empty());
}

#[tokio::test]
async fn test_indefinite_session() {
    let mut s = setup().await;
    let status = s
        .manager
        .start_session(StartRequest::now(SessionPlan::Indefinite))
        .await
        .unwrap();

    assert!(status.active);
    assert_eq!(status.mode, BlockMode::Indefinite);
    assert!(status.end_time.is_none());
    assert!(s.manager.scheduler().pending().await.unwrap().is_none());

    // Default lists: the allow-list does not overlap the block-list.
    let domains: Vec<String> = installed(&s.enforcer).await.into_iter().map(|(_, d)| d).collect();
    assert_eq!(
        domains,
        vec!["facebook.com", "twitter.com", "youtube.com", "instagram.com", "reddit.com"]
    );

    assert_eq!(
        s.events.recv().await.unwrap(),
        Event::FocusModeStarted {
            mode: BlockMode::Indefinite,
            start_time: s.clock.now(),
            end_time: None,
        }
    );
}

#[tokio::test]
async fn test_until_time_ends_after_start_within_a_day() {
    let s = setup().await;
    let status = s
        .manager
        .start_session(StartRequest::now(until("00:00")))
        .await
        .unwrap();

    let start = status.start_time.unwrap();
    let end = status.end_time.unwrap();
    assert!(end > start);
    // DST transitions can stretch a local day by an hour.
    assert!(end - start <= Duration::hours(25));
}

#[tokio::test]
async fn test_updating_lists_twice_is_idempotent() {
    let s = setup().await;
    s.manager
        .start_session(StartRequest::now(SessionPlan::Indefinite))
        .await
        .unwrap();

    let lists = (
        Some(vec!["x.io".to_string(), "y.io".to_string()]),
        Some(vec!["y.io".to_string()]),
    );
    s.manager
        .update_site_lists(lists.0.clone(), lists.1.clone())
        .await
        .unwrap();
    let first = installed(&s.enforcer).await;
    s.manager.update_site_lists(lists.0, lists.1).await.unwrap();
    let second = installed(&s.enforcer).await;

    assert_eq!(first, second);
    assert_eq!(first, vec![(1, "x.io".to_string())]);
}

#[tokio::test]
async fn test_expiry_returns_to_inactive() {
    let mut s = setup().await;
    let status = s
        .manager
        .start_session(StartRequest::now(SessionPlan::Timed {
            hours: 0,
            minutes: 1,
        }))
        .await
        .unwrap();
    s.events.recv().await.unwrap();

    let end = status.end_time.unwrap();
    s.clock.set(end);
    let alarm = s.manager.scheduler().pending().await.unwrap().unwrap();
    s.manager.on_alarm(&alarm).await.unwrap();

    assert!(!s.manager.get_status().await.unwrap().active);
    assert!(installed(&s.enforcer).await.is_empty());
    assert_eq!(
        s.events.recv().await.unwrap(),
        Event::FocusModeEnded { end_time: end }
    );
}

#[tokio::test]
async fn test_start_stop_start_again() {
    let s = setup().await;
    let plan = SessionPlan::Timed {
        hours: 0,
        minutes: 10,
    };
    let first = s.manager.start_session(StartRequest::now(plan)).await.unwrap();
    let first_end = first.end_time.unwrap();
    s.manager.stop_session().await.unwrap();
    s.clock.advance(Duration::minutes(1));

    let status = s.manager.start_session(StartRequest::now(plan)).await.unwrap();
    assert!(status.active);
    assert_eq!(
        s.manager.scheduler().pending().await.unwrap().unwrap().scheduled_time,
        status.end_time.unwrap()
    );

    // The first session's end arrives while the second is still running.
    s.clock.advance(Duration::minutes(9));
    assert_eq!(
        s.manager.expiry_fire(first_end).await.unwrap(),
        FireOutcome::Stale
    );
    let after = s.manager.get_status().await.unwrap();
    assert!(after.active);
    assert_eq!(after.end_time, status.end_time);
    assert_eq!(installed(&s.enforcer).await.len(), 5);
}

#[tokio::test]
async fn test_oversized_duration_is_rejected() {
    let s = setup().await;
    let plan = SessionPlan::Timed {
        hours: u32::MAX,
        minutes: 0,
    };
    let err = s.manager.start_session(StartRequest::now(plan)).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::InvalidValue { .. })
    ));
    assert!(!s.manager.get_status().await.unwrap().active);
}

#[test]
fn test_domain_validation() {
    for bad in ["not a domain", "-bad.com", "bad-.com", "localhost", "a.c", "exa_mple.com", ""] {
        assert!(!is_valid_domain(&normalize_domain(bad)), "{bad} accepted");
    }
    for good in ["example.co.uk", "sub.example.com", "x.io", "  Example.COM "] {
        assert!(is_valid_domain(&normalize_domain(good)), "{good} rejected");
    }
}
