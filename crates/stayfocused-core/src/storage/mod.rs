//! Persisted settings storage.
//!
//! All durable state (site lists, session fields, preferences, toggles) lives
//! behind the [`SettingsStore`] trait as independently addressable JSON
//! values. No component caches what it reads: every operation consults the
//! store fresh, so a restarted process picks up exactly where the last one
//! left off.

mod config;
pub mod database;
pub mod migrations;
pub mod preferences;

pub use config::{AlarmsConfig, BlockingConfig, Config};
pub use database::Database;
pub use preferences::{export_settings, Preferences, ScheduleWindow};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::broadcast;

use crate::error::{ConfigError, HostApiError};

/// Storage key names.
pub mod keys {
    pub const BLACKLIST: &str = "blacklist";
    pub const WHITELIST: &str = "whitelist";
    pub const FOCUS_STATE: &str = "focusState";
    pub const START_TIME: &str = "startTime";
    pub const END_TIME: &str = "endTime";
    pub const BLOCK_MODE: &str = "blockMode";
    pub const NOTIFY_END: &str = "notifyEnd";
    pub const NOTIFY_ATTEMPT: &str = "notifyAttempt";
    pub const SOUND_ENABLED: &str = "soundEnabled";
    pub const DEFAULT_DURATION: &str = "defaultDuration";
    pub const SCHEDULE_ENABLED: &str = "scheduleEnabled";
    pub const SCHEDULE_DAYS: &str = "scheduleDays";
    pub const SCHEDULE_START: &str = "scheduleStart";
    pub const SCHEDULE_END: &str = "scheduleEnd";
    pub const TOGGLES: &str = "toggles";

    /// Keys holding the focus session.
    pub const SESSION: [&str; 4] = [FOCUS_STATE, START_TIME, END_TIME, BLOCK_MODE];
}

/// A partial or complete snapshot of the store.
pub type StorageMap = BTreeMap<String, Value>;

/// One key changed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// Durable key/value storage.
///
/// No transactions: concurrent writers race and the last write per key wins.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Read the given keys. Keys that were never written are omitted.
    async fn get(&self, keys: &[&str]) -> Result<StorageMap, HostApiError>;

    /// Read every stored key.
    async fn get_all(&self) -> Result<StorageMap, HostApiError>;

    /// Write the given keys, leaving all others untouched.
    async fn set(&self, items: StorageMap) -> Result<(), HostApiError>;

    /// Subscribe to changes made through this store handle.
    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}

/// Build a [`StorageMap`] from `(key, value)` pairs.
pub fn storage_map<I, V>(items: I) -> Result<StorageMap, HostApiError>
where
    I: IntoIterator<Item = (&'static str, V)>,
    V: Serialize,
{
    items
        .into_iter()
        .map(|(k, v)| Ok((k.to_string(), serde_json::to_value(v)?)))
        .collect()
}

/// Decode `key` from a snapshot. Missing and `null` both read as `None`.
pub fn decode<T: DeserializeOwned>(map: &StorageMap, key: &str) -> Result<Option<T>, HostApiError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
    }
}

/// Defaults for the focus keys, seeded on first run.
pub fn focus_defaults() -> StorageMap {
    let mut map = StorageMap::new();
    map.insert(
        keys::BLACKLIST.into(),
        json!(["facebook.com", "twitter.com", "youtube.com", "instagram.com", "reddit.com"]),
    );
    map.insert(keys::WHITELIST.into(), json!(["google.com", "stackoverflow.com"]));
    map.insert(keys::FOCUS_STATE.into(), json!(false));
    map.insert(keys::START_TIME.into(), Value::Null);
    map.insert(keys::END_TIME.into(), Value::Null);
    map.insert(keys::BLOCK_MODE.into(), json!("timed"));
    map
}

/// Every key with its default value, used by a full settings reset.
pub fn all_defaults() -> StorageMap {
    let mut map = focus_defaults();
    map.extend(Preferences::default().to_storage_map());
    map
}

/// Write defaults for focus keys that are absent. Never overwrites.
///
/// Returns the keys that were seeded.
pub async fn seed_defaults(store: &dyn SettingsStore) -> Result<Vec<String>, HostApiError> {
    let defaults = focus_defaults();
    let wanted: Vec<&str> = defaults.keys().map(String::as_str).collect();
    let present = store.get(&wanted).await?;

    let missing: StorageMap = defaults
        .iter()
        .filter(|(k, _)| !present.contains_key(*k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let seeded: Vec<String> = missing.keys().cloned().collect();
    if !missing.is_empty() {
        log::info!("seeding defaults for {} settings keys", missing.len());
        store.set(missing).await?;
    }
    Ok(seeded)
}

/// Returns `~/.config/stayfocused[-dev]/`.
///
/// `STAYFOCUSED_DATA_DIR` overrides the location entirely; otherwise
/// `STAYFOCUSED_ENV=dev` selects the development directory.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("STAYFOCUSED_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("STAYFOCUSED_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("stayfocused-dev")
            } else {
                base_dir.join("stayfocused")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
