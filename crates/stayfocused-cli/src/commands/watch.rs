//! Long-running background loop.
//!
//! Plays the part of the extension's background worker: restore once, then
//! deliver due alarms and follow store writes, both from this process (change
//! channel) and from other `stayfocused` invocations (polled snapshot).

use clap::Args;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use stayfocused_core::storage::{keys, StorageMap};
use stayfocused_core::{Clock, FireOutcome, SettingsStore, StorageChange, SystemClock};

use super::{CliResult, Host};

/// Keys whose changes affect installed rules or the expiry alarm.
const WATCHED_KEYS: [&str; 4] = [keys::FOCUS_STATE, keys::END_TIME, keys::BLACKLIST, keys::WHITELIST];

#[derive(Args)]
pub struct WatchArgs {
    /// Run a single poll and exit
    #[arg(long)]
    once: bool,
}

/// Changes between two snapshots of the watched keys.
fn diff(old: &StorageMap, new: &StorageMap) -> Vec<StorageChange> {
    WATCHED_KEYS
        .iter()
        .filter(|key| old.get(**key) != new.get(**key))
        .map(|key| StorageChange {
            key: key.to_string(),
            old_value: old.get(*key).cloned(),
            new_value: new.get(*key).cloned(),
        })
        .collect()
}

async fn poll(host: &Host, snapshot: &mut StorageMap) -> CliResult {
    for alarm in host.alarms.take_due(SystemClock.now())? {
        match host.manager.on_alarm(&alarm).await? {
            FireOutcome::Expired => println!("focus session ended"),
            FireOutcome::Stale => log::debug!("dropped stale alarm {}", alarm.name),
        }
    }

    let current = host.db.get(&WATCHED_KEYS).await?;
    for change in diff(snapshot, &current) {
        log::debug!("external change to {}", change.key);
        host.manager.on_storage_changed(&change).await?;
    }
    *snapshot = current;
    Ok(())
}

pub async fn run(args: WatchArgs) -> CliResult {
    let host = Host::open().await?;
    let status = host.manager.get_status().await?;
    println!(
        "watching: session {}",
        if status.active { "active" } else { "inactive" }
    );

    let mut events = host.broadcaster.register("watch");
    let mut changes = host.db.subscribe();
    let mut snapshot = host.db.get(&WATCHED_KEYS).await?;
    let interval = Duration::from_secs(host.config.alarms.poll_interval_secs.max(1));
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = poll(&host, &mut snapshot).await {
                    log::error!("poll failed: {e}");
                }
                if args.once {
                    break;
                }
            }
            change = changes.recv() => match change {
                Ok(change) => {
                    if let Some(new_value) = &change.new_value {
                        snapshot.insert(change.key.clone(), new_value.clone());
                    }
                    if let Err(e) = host.manager.on_storage_changed(&change).await {
                        log::error!("failed to apply change to {}: {e}", change.key);
                    }
                }
                Err(RecvError::Lagged(n)) => log::warn!("missed {n} store changes"),
                Err(RecvError::Closed) => break,
            },
            Some(event) = events.recv() => {
                log::info!("event: {}", serde_json::to_string(&event)?);
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupted, exiting");
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn diff_reports_only_watched_changes() {
        let mut old = StorageMap::new();
        old.insert(keys::FOCUS_STATE.into(), json!(false));
        old.insert(keys::BLACKLIST.into(), json!(["a.com"]));

        let mut new = old.clone();
        new.insert(keys::FOCUS_STATE.into(), json!(true));
        new.insert(keys::END_TIME.into(), json!("2026-01-01T10:00:00Z"));
        new.insert(keys::SOUND_ENABLED.into(), json!(true));

        let changes = diff(&old, &new);
        let changed: Vec<&str> = changes.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(changed, vec![keys::FOCUS_STATE, keys::END_TIME]);
        assert_eq!(changes[1].old_value, None);
    }
}
