//! Focus session state machine.
//!
//! [`FocusManager`] owns no state of its own: every operation reads the
//! settings store fresh, commits its transition there first, and only then
//! touches the rule engine, the expiry alarm and open UI contexts. A manager
//! rebuilt after a restart therefore behaves exactly like the one it
//! replaces once [`FocusManager::restore`] has run.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::rules::derive_rules;
use super::session::{
    compute_window, BlockMode, SessionRecord, SessionState, SessionStatus, StartRequest,
};
use super::sites::{ListKind, SiteList};
use crate::clock::{truncate_ms, Clock};
use crate::error::{CoreError, HostApiError, ValidationError};
use crate::events::Event;
use crate::host::{Alarm, AlarmHost, Broadcaster, RuleEnforcer};
use crate::notifier::ChangeNotifier;
use crate::scheduler::{ExpiryScheduler, END_FOCUS_ALARM};
use crate::storage::{
    all_defaults, decode, keys, seed_defaults, BlockingConfig, Preferences, SettingsStore,
    StorageChange, StorageMap,
};

/// What an expiry alarm fire did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// The session ended.
    Expired,
    /// The fire did not match the persisted session and was ignored.
    Stale,
}

/// Both site lists as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteLists {
    pub blacklist: SiteList,
    pub whitelist: SiteList,
}

impl SiteLists {
    pub fn get(&self, kind: ListKind) -> &SiteList {
        match kind {
            ListKind::Blacklist => &self.blacklist,
            ListKind::Whitelist => &self.whitelist,
        }
    }
}

/// What the block page shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingInfo {
    pub end_time: Option<DateTime<Utc>>,
    pub block_mode: BlockMode,
}

/// Keys `import_settings` accepts besides the preference keys.
const IMPORTABLE_KEYS: [&str; 3] = [keys::BLACKLIST, keys::WHITELIST, keys::TOGGLES];

pub struct FocusManager {
    store: Arc<dyn SettingsStore>,
    enforcer: Arc<dyn RuleEnforcer>,
    scheduler: ExpiryScheduler,
    notifier: ChangeNotifier,
    clock: Arc<dyn Clock>,
    config: BlockingConfig,
}

impl FocusManager {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        enforcer: Arc<dyn RuleEnforcer>,
        alarms: Arc<dyn AlarmHost>,
        broadcaster: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            enforcer,
            scheduler: ExpiryScheduler::new(alarms, clock.clone()),
            notifier: ChangeNotifier::new(broadcaster),
            clock,
            config: BlockingConfig::default(),
        }
    }

    pub fn with_config(mut self, config: BlockingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<dyn SettingsStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &ExpiryScheduler {
        &self.scheduler
    }

    /// First-run seeding followed by [`restore`](Self::restore).
    pub async fn initialize(&self) -> Result<SessionStatus, CoreError> {
        let seeded = seed_defaults(self.store.as_ref()).await?;
        if !seeded.is_empty() {
            log::debug!("seeded keys: {}", seeded.join(", "));
        }
        self.restore().await
    }

    async fn record(&self) -> Result<SessionRecord, HostApiError> {
        SessionRecord::read(self.store.as_ref()).await
    }

    pub async fn get_status(&self) -> Result<SessionStatus, CoreError> {
        Ok(SessionStatus::from(&self.record().await?))
    }

    pub async fn get_site_lists(&self) -> Result<SiteLists, CoreError> {
        Ok(self.read_lists().await?)
    }

    async fn read_lists(&self) -> Result<SiteLists, HostApiError> {
        let map = self.store.get(&[keys::BLACKLIST, keys::WHITELIST]).await?;
        Ok(SiteLists {
            blacklist: SiteList::from_stored(decode(&map, keys::BLACKLIST)?.unwrap_or_default()),
            whitelist: SiteList::from_stored(decode(&map, keys::WHITELIST)?.unwrap_or_default()),
        })
    }

    /// Start a session.
    ///
    /// Blocking takes effect immediately, also for a delayed start: the start
    /// time only anchors the session window.
    ///
    /// # Errors
    /// `AlreadyActive`, `ZeroDuration`, an oversized duration or
    /// `EmptyBlockList` as validation errors; host failures as they occur,
    /// after the session was committed. The expiry alarm is armed even when
    /// installing rules failed.
    pub async fn start_session(&self, request: StartRequest) -> Result<SessionStatus, CoreError> {
        if self.record().await?.state().is_active() {
            return Err(ValidationError::AlreadyActive.into());
        }

        let now = self.clock.now().with_timezone(&Local);
        let (start, end) = compute_window(&request, &now)?;
        let (start, end) = (truncate_ms(start), end.map(truncate_ms));

        if self.read_lists().await?.blacklist.is_empty() {
            return Err(ValidationError::EmptyBlockList.into());
        }

        let mode = request.plan.mode();
        self.store
            .set(SessionRecord::activation(mode, start, end)?)
            .await?;
        log::info!(
            "focus session started: mode={mode} start={start} end={}",
            end.map_or_else(|| "none".to_string(), |e| e.to_string())
        );

        let pushed = self.push_rules(true).await;
        if let Some(end) = end {
            self.scheduler.arm(end).await?;
        }
        pushed?;

        self.notifier
            .notify(&Event::FocusModeStarted {
                mode,
                start_time: start,
                end_time: end,
            })
            .await;
        self.get_status().await
    }

    /// Stop the session. Stopping an inactive session only clears leftover
    /// rules and alarms.
    pub async fn stop_session(&self) -> Result<SessionStatus, CoreError> {
        let was_active = self.record().await?.state().is_active();
        self.deactivate().await?;

        if was_active {
            log::info!("focus session stopped");
            self.notifier
                .notify(&Event::FocusModeStopped {
                    at: self.clock.now(),
                })
                .await;
        }
        self.get_status().await
    }

    async fn deactivate(&self) -> Result<(), CoreError> {
        self.store.set(SessionRecord::deactivation()).await?;
        self.scheduler.disarm().await?;
        self.push_rules(false).await?;
        Ok(())
    }

    /// Reconcile rules and the expiry alarm with the persisted session.
    ///
    /// Run once per process start. A session whose end passed while nothing
    /// was running is stopped without a broadcast.
    pub async fn restore(&self) -> Result<SessionStatus, CoreError> {
        let state = self.record().await?.state();
        let elapsed = state.has_elapsed(self.clock.now());

        match state {
            SessionState::Inactive => {
                self.scheduler.disarm().await?;
                self.push_rules(false).await?;
            }
            SessionState::Active { end_time, .. } if elapsed => {
                log::info!(
                    "focus session ended at {} while not running, stopping",
                    end_time.map_or_else(String::new, |e| e.to_string())
                );
                self.deactivate().await?;
            }
            SessionState::Active { end_time, mode, .. } => {
                let installed = self.push_rules(true).await?;
                if let Some(end) = end_time {
                    self.scheduler.arm(end).await?;
                }
                log::info!("restored {mode} focus session with {installed} rules");
            }
        }
        self.get_status().await
    }

    /// Handle a fired host alarm.
    pub async fn on_alarm(&self, alarm: &Alarm) -> Result<FireOutcome, CoreError> {
        if alarm.name != END_FOCUS_ALARM {
            log::debug!("ignoring unrelated alarm '{}'", alarm.name);
            return Ok(FireOutcome::Stale);
        }
        self.expiry_fire(alarm.scheduled_time).await
    }

    /// End the session if `target` is still its persisted end time.
    pub async fn expiry_fire(&self, target: DateTime<Utc>) -> Result<FireOutcome, CoreError> {
        let state = self.record().await?.state();
        let end = match state.end_time() {
            Some(end) if end.timestamp_millis() == target.timestamp_millis() => end,
            _ => {
                log::debug!("stale expiry fire for {target}, ignoring");
                return Ok(FireOutcome::Stale);
            }
        };

        self.deactivate().await?;
        log::info!("focus session expired at {end}");
        self.notifier
            .notify(&Event::FocusModeEnded { end_time: end })
            .await;
        Ok(FireOutcome::Expired)
    }

    /// Replace either or both site lists.
    ///
    /// Every entry is validated before anything is written.
    pub async fn update_site_lists(
        &self,
        blacklist: Option<Vec<String>>,
        whitelist: Option<Vec<String>>,
    ) -> Result<SiteLists, CoreError> {
        let blacklist = blacklist.map(SiteList::parse).transpose()?;
        let whitelist = whitelist.map(SiteList::parse).transpose()?;

        let mut map = StorageMap::new();
        if let Some(list) = blacklist {
            map.insert(keys::BLACKLIST.into(), serde_json::to_value(list)?);
        }
        if let Some(list) = whitelist {
            map.insert(keys::WHITELIST.into(), serde_json::to_value(list)?);
        }
        if !map.is_empty() {
            self.store.set(map).await?;
            self.refresh_if_active().await?;
        }
        self.get_site_lists().await
    }

    /// Append one domain to a list. Returns the normalized domain.
    pub async fn add_site(&self, kind: ListKind, domain: &str) -> Result<String, CoreError> {
        let lists = self.read_lists().await?;
        let mut list = lists.get(kind).clone();
        let added = list.add(domain, kind)?.to_string();
        self.write_list(kind, list).await?;
        log::debug!("added {added} to the {kind} list");
        Ok(added)
    }

    /// Remove one domain from a list. Returns whether it was present.
    pub async fn remove_site(&self, kind: ListKind, domain: &str) -> Result<bool, CoreError> {
        let lists = self.read_lists().await?;
        let mut list = lists.get(kind).clone();
        if !list.remove(domain) {
            return Ok(false);
        }
        self.write_list(kind, list).await?;
        Ok(true)
    }

    async fn write_list(&self, kind: ListKind, list: SiteList) -> Result<(), CoreError> {
        let mut map = StorageMap::new();
        map.insert(kind.storage_key().into(), serde_json::to_value(list)?);
        self.store.set(map).await?;
        self.refresh_if_active().await
    }

    async fn refresh_if_active(&self) -> Result<(), CoreError> {
        if self.record().await?.state().is_active() {
            self.push_rules(true).await?;
        }
        Ok(())
    }

    /// React to a write made by another writer of the store.
    ///
    /// Returns whether rules or the alarm were re-applied.
    pub async fn on_storage_changed(&self, change: &StorageChange) -> Result<bool, CoreError> {
        let state = self.record().await?.state();
        match change.key.as_str() {
            keys::FOCUS_STATE => {
                self.push_rules(state.is_active()).await?;
                if !state.is_active() {
                    self.scheduler.disarm().await?;
                }
                Ok(true)
            }
            keys::BLACKLIST | keys::WHITELIST if state.is_active() => {
                self.push_rules(true).await?;
                Ok(true)
            }
            keys::END_TIME => match state.end_time() {
                Some(end) => Ok(self.scheduler.arm(end).await?),
                None => Ok(false),
            },
            _ => Ok(false),
        }
    }

    pub async fn blocking_info(&self) -> Result<BlockingInfo, CoreError> {
        let status = self.get_status().await?;
        Ok(BlockingInfo {
            end_time: status.end_time,
            block_mode: status.mode,
        })
    }

    pub async fn toggles(&self) -> Result<BTreeMap<String, bool>, CoreError> {
        let map = self.store.get(&[keys::TOGGLES]).await?;
        Ok(decode(&map, keys::TOGGLES)?.unwrap_or_default())
    }

    /// Persist a suite toggle and tell every open context about it.
    pub async fn set_toggle(&self, key: &str, value: bool) -> Result<(), CoreError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: keys::TOGGLES.into(),
                message: "toggle key must not be empty".into(),
            }
            .into());
        }

        let mut toggles = self.toggles().await?;
        toggles.insert(key.to_string(), value);
        let mut map = StorageMap::new();
        map.insert(keys::TOGGLES.into(), serde_json::to_value(&toggles)?);
        self.store.set(map).await?;

        log::debug!("toggle {key} = {value}");
        self.notifier
            .notify(&Event::ToggleUpdate {
                key: key.to_string(),
                value,
            })
            .await;
        Ok(())
    }

    /// Import settings previously produced by `export_settings`.
    ///
    /// Session keys in the input are ignored. Unknown keys, malformed site
    /// lists and invalid preferences reject the whole import. Returns the
    /// keys written.
    pub async fn import_settings(&self, json: &str) -> Result<Vec<String>, CoreError> {
        let input: StorageMap = match serde_json::from_str::<Value>(json)? {
            Value::Object(obj) => obj.into_iter().collect(),
            _ => {
                return Err(ValidationError::InvalidValue {
                    field: "settings".into(),
                    message: "expected a JSON object".into(),
                }
                .into())
            }
        };

        let preference_keys = Preferences::default().to_storage_map();
        let active = self.record().await?.state().is_active();
        let mut map = StorageMap::new();

        for (key, value) in input {
            let k = key.as_str();
            if k != keys::BLOCK_MODE && keys::SESSION.contains(&k) {
                log::debug!("import: skipping session key {key}");
                continue;
            }
            if k == keys::BLOCK_MODE && active {
                log::debug!("import: keeping blockMode of the running session");
                continue;
            }
            if !preference_keys.contains_key(k) && !IMPORTABLE_KEYS.contains(&k) {
                return Err(ValidationError::InvalidValue {
                    field: key,
                    message: "unknown settings key".into(),
                }
                .into());
            }
            map.insert(key, value);
        }

        for key in [keys::BLACKLIST, keys::WHITELIST] {
            if let Some(value) = map.get_mut(key) {
                let entries: Vec<String> =
                    serde_json::from_value(value.clone()).map_err(|e| invalid(key, e))?;
                *value = serde_json::to_value(SiteList::parse(entries)?)?;
            }
        }
        if let Some(value) = map.get(keys::TOGGLES) {
            serde_json::from_value::<BTreeMap<String, bool>>(value.clone())
                .map_err(|e| invalid(keys::TOGGLES, e))?;
        }

        let mut merged = Preferences::load(self.store.as_ref()).await?.to_storage_map();
        merged.extend(
            map.iter()
                .filter(|(k, _)| preference_keys.contains_key(*k))
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        Preferences::from_storage_map(&merged)
            .map_err(|e| invalid("preferences", e))?
            .validate()?;

        let written: Vec<String> = map.keys().cloned().collect();
        if !map.is_empty() {
            self.store.set(map).await?;
            if active {
                self.push_rules(true).await?;
            }
        }
        log::info!("imported {} settings keys", written.len());
        Ok(written)
    }

    /// Stop any session and restore every key to its default.
    pub async fn reset_settings(&self) -> Result<(), CoreError> {
        self.stop_session().await?;
        let mut defaults = all_defaults();
        defaults.insert(keys::TOGGLES.into(), Value::Object(Default::default()));
        self.store.set(defaults).await?;
        log::info!("settings reset to defaults");
        Ok(())
    }

    /// Derive the rule set for `active` and install it in place of whatever
    /// is installed now. Returns the number of rules installed.
    async fn push_rules(&self, active: bool) -> Result<usize, HostApiError> {
        let lists = if active {
            self.read_lists().await?
        } else {
            SiteLists::default()
        };
        let rules = derive_rules(
            &lists.blacklist,
            &lists.whitelist,
            active,
            &self.config.redirect_path,
            self.config.max_rules,
        );
        let count = rules.len();

        let installed: Vec<u32> = self
            .enforcer
            .dynamic_rules()
            .await?
            .iter()
            .map(|r| r.id)
            .collect();

        if let Err(e) = self.enforcer.update_dynamic_rules(installed, rules).await {
            log::error!("failed to update block rules: {e}");
            return Err(e);
        }
        log::debug!("installed {count} block rules");
        Ok(count)
    }
}

fn invalid(field: &str, err: impl std::fmt::Display) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message: err.to_string(),
    }
}
