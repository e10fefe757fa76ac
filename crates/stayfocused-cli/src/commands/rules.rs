use clap::Subcommand;
use stayfocused_core::{derive_rules, RuleEnforcer};

use super::{print_json, CliResult, Host};

#[derive(Subcommand)]
pub enum RulesAction {
    /// Print the installed block rules as JSON
    List,
    /// Print the rules a session would install with the current lists
    Preview,
}

pub async fn run(action: RulesAction) -> CliResult {
    let host = Host::open().await?;

    match action {
        RulesAction::List => {
            print_json(&host.rules.dynamic_rules().await?)?;
        }
        RulesAction::Preview => {
            let lists = host.manager.get_site_lists().await?;
            let rules = derive_rules(
                &lists.blacklist,
                &lists.whitelist,
                true,
                &host.config.blocking.redirect_path,
                host.config.blocking.max_rules,
            );
            print_json(&rules)?;
        }
    }
    Ok(())
}
