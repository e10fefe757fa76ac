//! # StayFocused Core Library
//!
//! This library provides the focus-mode site blocker: it keeps two site
//! lists, turns them into declarative redirect rules while a focus session
//! is running, and ends sessions on a wall-clock alarm that survives process
//! restarts. The `stayfocused` CLI and any embedding host drive the same
//! [`FocusManager`].
//!
//! ## Architecture
//!
//! - **Settings store**: SQLite key/value storage of site lists, session
//!   fields and preferences, with change notifications
//! - **Rule deriver**: Pure `(blacklist, whitelist, active) -> rules`
//! - **Session state machine**: Inactive/Active lifecycle with restart recovery
//! - **Expiry scheduler**: The single named alarm that ends a session
//! - **Change notifier**: Best-effort fan-out of [`Event`]s to open UI contexts
//!
//! ## Key Components
//!
//! - [`FocusManager`]: Session state machine and request dispatcher
//! - [`Database`]: Settings persistence
//! - [`Config`]: Engine configuration management
//! - [`RuleEnforcer`], [`AlarmHost`], [`Broadcaster`]: Host platform seams

pub mod clock;
pub mod error;
pub mod events;
pub mod focus;
pub mod host;
pub mod messages;
pub mod notifier;
pub mod scheduler;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, DatabaseError, HostApiError, ValidationError};
pub use events::Event;
pub use focus::{
    derive_rules, BlockMode, BlockRule, BlockingInfo, ClockTime, FireOutcome, FocusManager,
    ListKind, SessionPlan, SessionStatus, SiteList, SiteLists, StartRequest, StartSpec,
};
pub use host::{
    Alarm, AlarmHost, AlarmTable, Broadcaster, ChannelBroadcaster, MemoryRuleEnforcer,
    RuleEnforcer, RuleTable, TokioAlarms,
};
pub use messages::{Request, Response};
pub use notifier::ChangeNotifier;
pub use scheduler::{ExpiryScheduler, END_FOCUS_ALARM};
pub use storage::{Config, Database, Preferences, SettingsStore, StorageChange};
