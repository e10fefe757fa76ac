//! Focus session model.
//!
//! The persisted session is a handful of flat keys (`focusState`,
//! `startTime`, `endTime`, `blockMode`). In memory it is the tagged
//! [`SessionState`]; [`SessionRecord`] converts between the two.
//!
//! ## Lifecycle
//!
//! ```text
//! Inactive --start--> Active --stop / expiry--> Inactive
//! ```

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{HostApiError, ValidationError};
use crate::storage::{decode, keys, SettingsStore, StorageMap};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockMode {
    /// Fixed duration from the start.
    #[default]
    #[serde(rename = "timed")]
    Timed,
    /// Until the next occurrence of a wall-clock time.
    #[serde(rename = "untilTime")]
    UntilClockTime,
    /// Until stopped explicitly.
    #[serde(rename = "indefinite")]
    Indefinite,
}

impl fmt::Display for BlockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockMode::Timed => write!(f, "timed"),
            BlockMode::UntilClockTime => write!(f, "untilTime"),
            BlockMode::Indefinite => write!(f, "indefinite"),
        }
    }
}

/// Local wall-clock time of day with minute precision, written `HH:MM`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }

    fn to_naive(self) -> chrono::NaiveTime {
        chrono::NaiveTime::from_hms_opt(self.hour.into(), self.minute.into(), 0)
            .unwrap_or(chrono::NaiveTime::MIN)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ClockTime {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidClockTime(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(invalid());
        }
        let hour = h.parse::<u8>().map_err(|_| invalid())?;
        let minute = m.parse::<u8>().map_err(|_| invalid())?;
        Self::new(hour, minute).ok_or_else(invalid)
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// When the session's logical start is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StartSpec {
    #[default]
    Now,
    /// Next occurrence of this clock time (tomorrow if already passed today).
    At(ClockTime),
}

/// Mode plus its end specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "blockMode")]
pub enum SessionPlan {
    #[serde(rename = "timed")]
    Timed { hours: u32, minutes: u32 },
    #[serde(rename = "untilTime")]
    UntilClockTime { until: ClockTime },
    #[serde(rename = "indefinite")]
    Indefinite,
}

impl SessionPlan {
    pub fn mode(&self) -> BlockMode {
        match self {
            SessionPlan::Timed { .. } => BlockMode::Timed,
            SessionPlan::UntilClockTime { .. } => BlockMode::UntilClockTime,
            SessionPlan::Indefinite => BlockMode::Indefinite,
        }
    }
}

/// A request to start a focus session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub start: StartSpec,
    #[serde(flatten)]
    pub plan: SessionPlan,
}

impl StartRequest {
    pub fn now(plan: SessionPlan) -> Self {
        Self {
            start: StartSpec::Now,
            plan,
        }
    }
}

/// Stored times are RFC 3339, which has no room for later years.
const MAX_END_YEAR: i32 = 9999;

/// Resolve a local wall-clock datetime, stepping past DST gaps.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}

/// First occurrence of `time` at or after `after` (same day if not yet
/// passed, otherwise the next day).
fn next_occurrence<Tz: TimeZone>(after: &DateTime<Tz>, time: ClockTime, strictly: bool) -> DateTime<Tz> {
    let tz = after.timezone();
    let today = resolve_local(&tz, after.date_naive().and_time(time.to_naive()));
    let passed = if strictly { today <= *after } else { today < *after };
    if passed {
        let tomorrow = after.date_naive().succ_opt().unwrap_or(after.date_naive());
        resolve_local(&tz, tomorrow.and_time(time.to_naive()))
    } else {
        today
    }
}

/// Concrete start and end of a session requested at `now` (local time).
///
/// # Errors
/// `ZeroDuration` for a timed plan of 0h 0m, `InvalidValue` for a duration
/// whose end does not fit a four-digit year.
pub fn compute_window<Tz: TimeZone>(
    request: &StartRequest,
    now: &DateTime<Tz>,
) -> Result<(DateTime<Utc>, Option<DateTime<Utc>>), ValidationError> {
    let start = match request.start {
        StartSpec::Now => now.clone(),
        StartSpec::At(time) => next_occurrence(now, time, false),
    };

    let end = match request.plan {
        SessionPlan::Timed { hours, minutes } => {
            if hours == 0 && minutes == 0 {
                return Err(ValidationError::ZeroDuration);
            }
            let duration = Duration::hours(hours.into()) + Duration::minutes(minutes.into());
            let end = start
                .with_timezone(&Utc)
                .checked_add_signed(duration)
                .filter(|end| end.year() <= MAX_END_YEAR)
                .ok_or_else(|| ValidationError::InvalidValue {
                    field: "duration".into(),
                    message: format!("{hours}h {minutes}m is too long"),
                })?;
            Some(end)
        }
        SessionPlan::UntilClockTime { until } => {
            Some(next_occurrence(&start, until, true).with_timezone(&Utc))
        }
        SessionPlan::Indefinite => None,
    };

    Ok((start.with_timezone(&Utc), end))
}

/// In-memory view of the focus session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Inactive,
    Active {
        mode: BlockMode,
        start_time: Option<DateTime<Utc>>,
        /// `None` exactly for indefinite sessions.
        end_time: Option<DateTime<Utc>>,
    },
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active { .. })
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        match self {
            SessionState::Active { end_time, .. } => *end_time,
            SessionState::Inactive => None,
        }
    }

    /// Active with an end time at or before `now`.
    pub fn has_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.end_time().is_some_and(|end| end <= now)
    }
}

/// The flat persisted session fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    pub focus_state: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub block_mode: BlockMode,
}

impl SessionRecord {
    pub async fn read(store: &dyn SettingsStore) -> Result<Self, HostApiError> {
        let map = store.get(&keys::SESSION).await?;
        Self::from_storage_map(&map)
    }

    pub fn from_storage_map(map: &StorageMap) -> Result<Self, HostApiError> {
        Ok(Self {
            focus_state: decode(map, keys::FOCUS_STATE)?.unwrap_or(false),
            start_time: decode(map, keys::START_TIME)?,
            end_time: decode(map, keys::END_TIME)?,
            block_mode: decode(map, keys::BLOCK_MODE)?.unwrap_or_default(),
        })
    }

    pub fn state(&self) -> SessionState {
        if !self.focus_state {
            return SessionState::Inactive;
        }
        let end_time = match self.block_mode {
            BlockMode::Indefinite => None,
            _ => self.end_time,
        };
        SessionState::Active {
            mode: self.block_mode,
            start_time: self.start_time,
            end_time,
        }
    }

    /// Fields written when a session becomes active.
    pub fn activation(
        mode: BlockMode,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<StorageMap, HostApiError> {
        let mut map = StorageMap::new();
        map.insert(keys::FOCUS_STATE.into(), serde_json::Value::Bool(true));
        map.insert(keys::START_TIME.into(), serde_json::to_value(start_time)?);
        map.insert(keys::END_TIME.into(), serde_json::to_value(end_time)?);
        map.insert(keys::BLOCK_MODE.into(), serde_json::to_value(mode)?);
        Ok(map)
    }

    /// Fields written when a session ends.
    pub fn deactivation() -> StorageMap {
        let mut map = StorageMap::new();
        map.insert(keys::FOCUS_STATE.into(), serde_json::Value::Bool(false));
        map
    }
}

/// Status snapshot returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub active: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub mode: BlockMode,
}

impl From<&SessionRecord> for SessionStatus {
    fn from(record: &SessionRecord) -> Self {
        match record.state() {
            SessionState::Active {
                mode,
                start_time,
                end_time,
            } => SessionStatus {
                active: true,
                start_time,
                end_time,
                mode,
            },
            SessionState::Inactive => SessionStatus {
                active: false,
                start_time: None,
                end_time: None,
                mode: record.block_mode,
            },
        }
    }
}
