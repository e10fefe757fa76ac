//! User preferences edited from the options surface.
//!
//! Preferences are plain configuration stored as independent keys next to
//! the focus session. Missing keys read back as their defaults.

use serde::{Deserialize, Serialize};

use super::{decode, keys, SettingsStore, StorageMap};
use crate::error::{CoreError, HostApiError, ValidationError};
use crate::focus::{BlockMode, ClockTime};

/// Recurring blocking window (days use 0 = Sunday .. 6 = Saturday).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub enabled: bool,
    pub days: Vec<u8>,
    pub start: ClockTime,
    pub end: ClockTime,
}

impl Default for ScheduleWindow {
    fn default() -> Self {
        Self {
            enabled: false,
            days: vec![1, 2, 3, 4, 5],
            start: ClockTime::new(9, 0).unwrap_or_default(),
            end: ClockTime::new(17, 0).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub default_block_mode: BlockMode,
    pub default_duration_min: u32,
    pub notify_end: bool,
    pub notify_attempt: bool,
    pub sound_enabled: bool,
    pub schedule: ScheduleWindow,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            default_block_mode: BlockMode::Timed,
            default_duration_min: 60,
            notify_end: true,
            notify_attempt: true,
            sound_enabled: false,
            schedule: ScheduleWindow::default(),
        }
    }
}

const PREFERENCE_KEYS: [&str; 9] = [
    keys::BLOCK_MODE,
    keys::DEFAULT_DURATION,
    keys::NOTIFY_END,
    keys::NOTIFY_ATTEMPT,
    keys::SOUND_ENABLED,
    keys::SCHEDULE_ENABLED,
    keys::SCHEDULE_DAYS,
    keys::SCHEDULE_START,
    keys::SCHEDULE_END,
];

impl Preferences {
    /// Read preferences, falling back to defaults per missing key.
    pub async fn load(store: &dyn SettingsStore) -> Result<Self, HostApiError> {
        let map = store.get(&PREFERENCE_KEYS).await?;
        Self::from_storage_map(&map)
    }

    pub fn from_storage_map(map: &StorageMap) -> Result<Self, HostApiError> {
        let d = Self::default();
        Ok(Self {
            default_block_mode: decode(map, keys::BLOCK_MODE)?.unwrap_or(d.default_block_mode),
            default_duration_min: decode(map, keys::DEFAULT_DURATION)?
                .unwrap_or(d.default_duration_min),
            notify_end: decode(map, keys::NOTIFY_END)?.unwrap_or(d.notify_end),
            notify_attempt: decode(map, keys::NOTIFY_ATTEMPT)?.unwrap_or(d.notify_attempt),
            sound_enabled: decode(map, keys::SOUND_ENABLED)?.unwrap_or(d.sound_enabled),
            schedule: ScheduleWindow {
                enabled: decode(map, keys::SCHEDULE_ENABLED)?.unwrap_or(d.schedule.enabled),
                days: decode(map, keys::SCHEDULE_DAYS)?.unwrap_or(d.schedule.days),
                start: decode(map, keys::SCHEDULE_START)?.unwrap_or(d.schedule.start),
                end: decode(map, keys::SCHEDULE_END)?.unwrap_or(d.schedule.end),
            },
        })
    }

    pub fn to_storage_map(&self) -> StorageMap {
        let mut map = StorageMap::new();
        let mut put = |key: &str, value: serde_json::Value| {
            map.insert(key.to_string(), value);
        };
        put(keys::BLOCK_MODE, serde_json::json!(self.default_block_mode));
        put(keys::DEFAULT_DURATION, self.default_duration_min.into());
        put(keys::NOTIFY_END, self.notify_end.into());
        put(keys::NOTIFY_ATTEMPT, self.notify_attempt.into());
        put(keys::SOUND_ENABLED, self.sound_enabled.into());
        put(keys::SCHEDULE_ENABLED, self.schedule.enabled.into());
        put(keys::SCHEDULE_DAYS, serde_json::json!(self.schedule.days));
        put(keys::SCHEDULE_START, serde_json::json!(self.schedule.start));
        put(keys::SCHEDULE_END, serde_json::json!(self.schedule.end));
        map
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.default_duration_min == 0 {
            return Err(ValidationError::InvalidValue {
                field: keys::DEFAULT_DURATION.into(),
                message: "must be at least 1 minute".into(),
            });
        }
        if let Some(day) = self.schedule.days.iter().find(|d| **d > 6) {
            return Err(ValidationError::InvalidValue {
                field: keys::SCHEDULE_DAYS.into(),
                message: format!("day {day} is outside 0 (Sunday) ..= 6 (Saturday)"),
            });
        }
        Ok(())
    }

    /// Validate and persist.
    ///
    /// `blockMode` is shared with the session record, so the default mode is
    /// only written while no focus session is active.
    pub async fn save(&self, store: &dyn SettingsStore) -> Result<(), CoreError> {
        self.validate()?;
        let mut map = self.to_storage_map();

        let state = store.get(&[keys::FOCUS_STATE]).await?;
        if decode::<bool>(&state, keys::FOCUS_STATE)?.unwrap_or(false) {
            map.remove(keys::BLOCK_MODE);
        }
        store.set(map).await?;
        Ok(())
    }
}

/// Every stored key as pretty-printed JSON.
pub async fn export_settings(store: &dyn SettingsStore) -> Result<String, CoreError> {
    let all = store.get_all().await?;
    Ok(serde_json::to_string_pretty(&all)?)
}
