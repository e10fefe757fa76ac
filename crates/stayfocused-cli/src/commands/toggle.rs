use clap::Subcommand;

use super::{print_json, CliResult, Host};

#[derive(Subcommand)]
pub enum ToggleAction {
    /// Print every toggle as JSON
    List,
    /// Set a toggle (e.g. adBlocker true)
    Set {
        key: String,
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },
}

pub async fn run(action: ToggleAction) -> CliResult {
    let host = Host::open().await?;

    match action {
        ToggleAction::List => print_json(&host.manager.toggles().await?)?,
        ToggleAction::Set { key, value } => {
            host.manager.set_toggle(&key, value).await?;
            println!("{key} = {value}");
        }
    }
    Ok(())
}
