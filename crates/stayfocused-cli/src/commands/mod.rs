pub mod config;
pub mod focus;
pub mod message;
pub mod prefs;
pub mod rules;
pub mod sites;
pub mod toggle;
pub mod watch;

use serde::Serialize;
use std::sync::Arc;

use stayfocused_core::{
    AlarmTable, ChannelBroadcaster, Config, CoreError, Database, FocusManager, RuleTable,
    SystemClock,
};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Everything one CLI invocation runs against.
///
/// Rules and alarms live in the same database as the settings, so every
/// invocation is a "process start" and begins with restore.
pub struct Host {
    pub manager: FocusManager,
    pub db: Arc<Database>,
    pub rules: Arc<RuleTable>,
    pub alarms: Arc<AlarmTable>,
    pub broadcaster: Arc<ChannelBroadcaster>,
    pub config: Config,
}

impl Host {
    pub async fn open() -> Result<Self, CoreError> {
        let config = Config::load()?;
        let db = Arc::new(Database::open()?);
        let rules = Arc::new(RuleTable::with_limit(db.clone(), config.blocking.max_rules));
        let alarms = Arc::new(AlarmTable::new(db.clone()));
        let broadcaster = Arc::new(ChannelBroadcaster::new());

        let manager = FocusManager::new(
            db.clone(),
            rules.clone(),
            alarms.clone(),
            broadcaster.clone(),
            Arc::new(SystemClock),
        )
        .with_config(config.blocking.clone());
        manager.initialize().await?;

        Ok(Self {
            manager,
            db,
            rules,
            alarms,
            broadcaster,
            config,
        })
    }
}

pub fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
