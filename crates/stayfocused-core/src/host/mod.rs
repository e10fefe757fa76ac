//! Host platform seams.
//!
//! The focus engine never talks to a concrete browser. It consumes four host
//! capabilities through these traits: a declarative rule engine, a named
//! absolute-time alarm primitive, a broadcast channel to open UI contexts,
//! and (in [`storage`](crate::storage)) durable key/value storage. Every call
//! is async and returns a [`HostApiError`] on failure.

mod alarms;
mod broadcast;
mod rule_table;

pub use alarms::{AlarmTable, TokioAlarms};
pub use broadcast::ChannelBroadcaster;
pub use rule_table::{MemoryRuleEnforcer, RuleTable};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HostApiError;
use crate::events::Event;
use crate::focus::BlockRule;

/// Declarative request-blocking mechanism.
#[async_trait]
pub trait RuleEnforcer: Send + Sync {
    /// Remove `remove_rule_ids`, then add `add_rules`, as one update.
    ///
    /// Rejected as a whole if the result would exceed the engine's ceiling
    /// or an added id collides with one that stays installed.
    async fn update_dynamic_rules(
        &self,
        remove_rule_ids: Vec<u32>,
        add_rules: Vec<BlockRule>,
    ) -> Result<(), HostApiError>;

    /// Currently installed rules, ordered by id.
    async fn dynamic_rules(&self) -> Result<Vec<BlockRule>, HostApiError>;
}

/// A named one-shot alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub name: String,
    pub scheduled_time: DateTime<Utc>,
}

/// One-shot absolute-time alarm primitive.
///
/// Creating an alarm with an existing name replaces it.
#[async_trait]
pub trait AlarmHost: Send + Sync {
    async fn create(&self, name: &str, when: DateTime<Utc>) -> Result<(), HostApiError>;

    /// Returns whether an alarm was cleared.
    async fn clear(&self, name: &str) -> Result<bool, HostApiError>;

    async fn get(&self, name: &str) -> Result<Option<Alarm>, HostApiError>;
}

/// Identifier of one open UI context (popup, options page, tab).
pub type RecipientId = String;

/// Fire-and-forget messaging to currently open UI contexts.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn recipients(&self) -> Vec<RecipientId>;

    async fn send(&self, recipient: &RecipientId, event: &Event) -> Result<(), HostApiError>;
}
