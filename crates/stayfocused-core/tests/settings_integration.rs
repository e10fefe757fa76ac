//! Integration tests for settings import/export and preferences.

use std::sync::Arc;

use stayfocused_core::storage::{export_settings, keys, Config};
use stayfocused_core::{
    BlockMode, ChannelBroadcaster, Database, FocusManager, MemoryRuleEnforcer, Preferences,
    SessionPlan, SettingsStore, StartRequest, SystemClock, TokioAlarms,
};

async fn manager_over(db: Arc<Database>) -> FocusManager {
    let (alarms, _fired) = TokioAlarms::new();
    let manager = FocusManager::new(
        db,
        Arc::new(MemoryRuleEnforcer::new()),
        Arc::new(alarms),
        Arc::new(ChannelBroadcaster::new()),
        Arc::new(SystemClock),
    );
    manager.initialize().await.unwrap();
    manager
}

#[tokio::test]
async fn test_export_import_roundtrip() {
    let source_db = Arc::new(Database::open_memory().unwrap());
    let source = manager_over(source_db.clone()).await;
    source
        .update_site_lists(Some(vec!["hn.com".into(), "lobste.rs".into()]), None)
        .await
        .unwrap();
    let mut prefs = Preferences::default();
    prefs.default_duration_min = 50;
    prefs.notify_attempt = false;
    prefs.save(source_db.as_ref()).await.unwrap();
    source.set_toggle("adBlocker", true).await.unwrap();

    let exported = export_settings(source_db.as_ref()).await.unwrap();

    let target_db = Arc::new(Database::open_memory().unwrap());
    let target = manager_over(target_db.clone()).await;
    target.import_settings(&exported).await.unwrap();

    assert_eq!(
        target.get_site_lists().await.unwrap(),
        source.get_site_lists().await.unwrap()
    );
    assert_eq!(Preferences::load(target_db.as_ref()).await.unwrap(), prefs);
    assert_eq!(target.toggles().await.unwrap().get("adBlocker"), Some(&true));
}

#[tokio::test]
async fn test_import_never_starts_a_session() {
    let source_db = Arc::new(Database::open_memory().unwrap());
    let source = manager_over(source_db.clone()).await;
    source
        .start_session(StartRequest::now(SessionPlan::Indefinite))
        .await
        .unwrap();
    let exported = export_settings(source_db.as_ref()).await.unwrap();

    let target = manager_over(Arc::new(Database::open_memory().unwrap())).await;
    target.import_settings(&exported).await.unwrap();
    assert!(!target.get_status().await.unwrap().active);
}

#[tokio::test]
async fn test_preferences_keep_running_session_mode() {
    let db = Arc::new(Database::open_memory().unwrap());
    let manager = manager_over(db.clone()).await;
    manager
        .start_session(StartRequest::now(SessionPlan::Indefinite))
        .await
        .unwrap();

    let prefs = Preferences {
        default_block_mode: BlockMode::Timed,
        ..Preferences::default()
    };
    prefs.save(db.as_ref()).await.unwrap();

    let status = manager.get_status().await.unwrap();
    assert_eq!(status.mode, BlockMode::Indefinite);
    assert!(status.end_time.is_none());
}

#[tokio::test]
async fn test_export_contains_every_seeded_key() {
    let db = Arc::new(Database::open_memory().unwrap());
    manager_over(db.clone()).await;
    let exported: serde_json::Value =
        serde_json::from_str(&export_settings(db.as_ref()).await.unwrap()).unwrap();

    for key in [keys::BLACKLIST, keys::WHITELIST, keys::FOCUS_STATE, keys::BLOCK_MODE] {
        assert!(exported.get(key).is_some(), "{key} missing from export");
    }
    let all = db.get_all().await.unwrap();
    assert_eq!(exported.as_object().unwrap().len(), all.len());
}

#[test]
fn test_config_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let created = Config::load_from(&path).unwrap();
    assert!(path.exists());
    assert_eq!(created.blocking.max_rules, 50);

    let mut config = created;
    config.set("blocking.redirect_path", "/blocked.html").unwrap();
    config.set("alarms.poll_interval_secs", "5").unwrap();
    config.save_to(&path).unwrap();

    let reloaded = Config::load_from(&path).unwrap();
    assert_eq!(reloaded.get("blocking.redirect_path").as_deref(), Some("/blocked.html"));
    assert_eq!(reloaded.alarms.poll_interval_secs, 5);
    assert!(Config::default().set("blocking.nope", "1").is_err());
}
