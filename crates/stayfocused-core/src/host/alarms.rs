use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{Alarm, AlarmHost};
use crate::error::HostApiError;
use crate::storage::Database;

/// Alarms persisted in the `alarms` table.
///
/// Nothing fires on its own: a host loop polls [`AlarmTable::take_due`].
/// Because the schedule lives in the database, a pending alarm survives the
/// process being torn down and is delivered by the next poll after respawn.
pub struct AlarmTable {
    db: Arc<Database>,
}

impl AlarmTable {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Remove and return every alarm scheduled at or before `now`.
    pub fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<Alarm>, HostApiError> {
        let now_ms = now.timestamp_millis();
        let due = self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let due = {
                let mut stmt = tx.prepare(
                    "SELECT name, scheduled_time_ms FROM alarms
                     WHERE scheduled_time_ms <= ?1 ORDER BY scheduled_time_ms",
                )?;
                let rows = stmt.query_map(params![now_ms], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            tx.execute("DELETE FROM alarms WHERE scheduled_time_ms <= ?1", params![now_ms])?;
            tx.commit()?;
            Ok(due)
        })?;

        due.into_iter().map(|(name, ms)| to_alarm(name, ms)).collect()
    }

    /// All pending alarms.
    pub fn all(&self) -> Result<Vec<Alarm>, HostApiError> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT name, scheduled_time_ms FROM alarms ORDER BY scheduled_time_ms")?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;
        rows.into_iter().map(|(name, ms)| to_alarm(name, ms)).collect()
    }
}

fn to_alarm(name: String, ms: i64) -> Result<Alarm, HostApiError> {
    let scheduled_time = DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| HostApiError::Alarm(format!("alarm '{name}' has invalid time {ms}")))?;
    Ok(Alarm {
        name,
        scheduled_time,
    })
}

#[async_trait]
impl AlarmHost for AlarmTable {
    async fn create(&self, name: &str, when: DateTime<Utc>) -> Result<(), HostApiError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO alarms (name, scheduled_time_ms) VALUES (?1, ?2)",
                params![name, when.timestamp_millis()],
            )
        })?;
        Ok(())
    }

    async fn clear(&self, name: &str) -> Result<bool, HostApiError> {
        let removed = self
            .db
            .with_conn(|conn| conn.execute("DELETE FROM alarms WHERE name = ?1", params![name]))?;
        Ok(removed > 0)
    }

    async fn get(&self, name: &str) -> Result<Option<Alarm>, HostApiError> {
        let row = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT scheduled_time_ms FROM alarms WHERE name = ?1",
                params![name],
                |row| row.get::<_, i64>(0),
            )
            .optional()
        })?;
        row.map(|ms| to_alarm(name.to_string(), ms)).transpose()
    }
}

struct PendingTimer {
    alarm: Alarm,
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct TimerSlots {
    pending: HashMap<String, PendingTimer>,
    generation: u64,
}

/// In-process alarms backed by `tokio::time` one-shot timers.
///
/// Fired alarms are delivered on the channel returned by [`TokioAlarms::new`].
/// Timers do not outlive the runtime; hosts that need alarms to survive a
/// restart use [`AlarmTable`].
pub struct TokioAlarms {
    slots: Arc<Mutex<TimerSlots>>,
    fired: mpsc::UnboundedSender<Alarm>,
}

impl TokioAlarms {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Alarm>) {
        let (fired, rx) = mpsc::unbounded_channel();
        let alarms = Self {
            slots: Arc::new(Mutex::new(TimerSlots::default())),
            fired,
        };
        (alarms, rx)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, TimerSlots>, HostApiError> {
        self.slots
            .lock()
            .map_err(|_| HostApiError::Alarm("timer state mutex poisoned".into()))
    }
}

#[async_trait]
impl AlarmHost for TokioAlarms {
    async fn create(&self, name: &str, when: DateTime<Utc>) -> Result<(), HostApiError> {
        let mut slots = self.lock()?;
        if let Some(previous) = slots.pending.remove(name) {
            previous.handle.abort();
        }
        slots.generation += 1;
        let generation = slots.generation;

        let alarm = Alarm {
            name: name.to_string(),
            scheduled_time: when,
        };
        let delay = (when - Utc::now()).to_std().unwrap_or_default();
        let task_slots = Arc::clone(&self.slots);
        let fired = self.fired.clone();
        let task_alarm = alarm.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_pending = match task_slots.lock() {
                Ok(mut slots) => {
                    let ours = slots
                        .pending
                        .get(&task_alarm.name)
                        .is_some_and(|p| p.generation == generation);
                    if ours {
                        slots.pending.remove(&task_alarm.name);
                    }
                    ours
                }
                Err(_) => false,
            };
            if still_pending {
                // Receiver gone means the host is shutting down.
                let _ = fired.send(task_alarm);
            }
        });

        slots.pending.insert(
            name.to_string(),
            PendingTimer {
                alarm,
                generation,
                handle,
            },
        );
        Ok(())
    }

    async fn clear(&self, name: &str) -> Result<bool, HostApiError> {
        let mut slots = self.lock()?;
        match slots.pending.remove(name) {
            Some(pending) => {
                pending.handle.abort();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, name: &str) -> Result<Option<Alarm>, HostApiError> {
        let slots = self.lock()?;
        Ok(slots.pending.get(name).map(|p| p.alarm.clone()))
    }
}
