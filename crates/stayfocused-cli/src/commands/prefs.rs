use clap::Subcommand;
use serde_json::Value;
use std::path::PathBuf;

use stayfocused_core::storage::export_settings;
use stayfocused_core::Preferences;

use super::{print_json, CliResult, Host};

#[derive(Subcommand)]
pub enum PrefsAction {
    /// Print preferences as JSON
    Show,
    /// Set one preference by storage key (e.g. defaultDuration 45)
    Set {
        key: String,
        /// JSON value; bare words are taken as strings
        value: String,
    },
    /// Write every stored setting as JSON
    Export {
        /// Output file (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Import settings from an exported JSON file
    Import {
        file: PathBuf,
    },
    /// Stop any session and restore all settings to defaults
    Reset,
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub async fn run(action: PrefsAction) -> CliResult {
    let host = Host::open().await?;
    let store = host.manager.store().as_ref();

    match action {
        PrefsAction::Show => {
            print_json(&Preferences::load(store).await?)?;
        }
        PrefsAction::Set { key, value } => {
            let mut map = Preferences::load(store).await?.to_storage_map();
            if !map.contains_key(&key) {
                eprintln!("unknown preference: {key}");
                std::process::exit(1);
            }
            map.insert(key.clone(), parse_value(&value));
            let prefs = Preferences::from_storage_map(&map)?;
            prefs.save(store).await?;
            println!("ok");
        }
        PrefsAction::Export { output } => {
            let json = export_settings(store).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("exported to {}", path.display());
                }
                None => println!("{json}"),
            }
        }
        PrefsAction::Import { file } => {
            let json = std::fs::read_to_string(&file)?;
            let written = host.manager.import_settings(&json).await?;
            println!("imported {} settings", written.len());
        }
        PrefsAction::Reset => {
            host.manager.reset_settings().await?;
            println!("settings reset to defaults");
        }
    }
    Ok(())
}
