//! Expiry scheduler.
//!
//! Owns the single named alarm that ends a focus session. Granularity is
//! whatever the host alarm primitive offers; a fire that arrives late is
//! still honored, and a fire that no longer matches the persisted session is
//! dropped by the state machine.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::HostApiError;
use crate::host::{Alarm, AlarmHost};

/// Name of the session expiry alarm.
pub const END_FOCUS_ALARM: &str = "endFocusMode";

pub struct ExpiryScheduler {
    alarms: Arc<dyn AlarmHost>,
    clock: Arc<dyn Clock>,
}

impl ExpiryScheduler {
    pub fn new(alarms: Arc<dyn AlarmHost>, clock: Arc<dyn Clock>) -> Self {
        Self { alarms, clock }
    }

    /// Arm the expiry alarm for `at`, replacing any pending one.
    ///
    /// A time at or before now arms nothing. Returns whether an alarm is
    /// now pending.
    pub async fn arm(&self, at: DateTime<Utc>) -> Result<bool, HostApiError> {
        self.alarms.clear(END_FOCUS_ALARM).await?;
        let now = self.clock.now();
        if at <= now {
            log::debug!("not arming expiry for {at}: not after {now}");
            return Ok(false);
        }
        self.alarms.create(END_FOCUS_ALARM, at).await?;
        log::debug!("expiry armed for {at}");
        Ok(true)
    }

    /// Cancel the pending expiry alarm, if any.
    pub async fn disarm(&self) -> Result<bool, HostApiError> {
        self.alarms.clear(END_FOCUS_ALARM).await
    }

    pub async fn pending(&self) -> Result<Option<Alarm>, HostApiError> {
        self.alarms.get(END_FOCUS_ALARM).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::host::TokioAlarms;
    use chrono::Duration;

    fn scheduler() -> (ExpiryScheduler, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let (alarms, _fired) = TokioAlarms::new();
        (ExpiryScheduler::new(Arc::new(alarms), clock.clone()), clock)
    }

    #[tokio::test]
    async fn arm_replaces_previous_alarm() {
        let (scheduler, clock) = scheduler();
        let first = clock.now() + Duration::hours(1);
        let second = clock.now() + Duration::hours(2);

        assert!(scheduler.arm(first).await.unwrap());
        assert!(scheduler.arm(second).await.unwrap());
        let pending = scheduler.pending().await.unwrap().unwrap();
        assert_eq!(pending.name, END_FOCUS_ALARM);
        assert_eq!(pending.scheduled_time, second);
    }

    #[tokio::test]
    async fn past_time_arms_nothing() {
        let (scheduler, clock) = scheduler();
        scheduler.arm(clock.now() + Duration::hours(1)).await.unwrap();

        assert!(!scheduler.arm(clock.now()).await.unwrap());
        assert!(scheduler.pending().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn disarm_clears() {
        let (scheduler, clock) = scheduler();
        scheduler.arm(clock.now() + Duration::minutes(5)).await.unwrap();
        assert!(scheduler.disarm().await.unwrap());
        assert!(!scheduler.disarm().await.unwrap());
    }
}
