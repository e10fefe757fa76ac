use clap::{Subcommand, ValueEnum};
use stayfocused_core::{ListKind, SiteList};

use super::{print_json, CliResult, Host};

#[derive(Clone, Copy, ValueEnum)]
pub enum ListArg {
    #[value(alias = "blocked")]
    Blacklist,
    #[value(alias = "allowed")]
    Whitelist,
}

impl From<ListArg> for ListKind {
    fn from(arg: ListArg) -> Self {
        match arg {
            ListArg::Blacklist => ListKind::Blacklist,
            ListArg::Whitelist => ListKind::Whitelist,
        }
    }
}

#[derive(Subcommand)]
pub enum SitesAction {
    /// Print both lists as JSON
    List,
    /// Add a domain to a list
    Add {
        list: ListArg,
        domain: String,
    },
    /// Remove a domain from a list
    Remove {
        list: ListArg,
        domain: String,
    },
    /// Replace a list entirely
    Set {
        list: ListArg,
        /// Domains; read one per line from stdin when omitted
        domains: Vec<String>,
    },
}

pub async fn run(action: SitesAction) -> CliResult {
    let host = Host::open().await?;

    match action {
        SitesAction::List => {
            print_json(&host.manager.get_site_lists().await?)?;
        }
        SitesAction::Add { list, domain } => {
            let kind = ListKind::from(list);
            let added = host.manager.add_site(kind, &domain).await?;
            println!("added {added} to the {kind} sites list");
        }
        SitesAction::Remove { list, domain } => {
            let kind = ListKind::from(list);
            if host.manager.remove_site(kind, &domain).await? {
                println!("removed {domain} from the {kind} sites list");
            } else {
                eprintln!("{domain} is not in the {kind} sites list");
                std::process::exit(1);
            }
        }
        SitesAction::Set { list, domains } => {
            let entries = if domains.is_empty() {
                let text = std::io::read_to_string(std::io::stdin())?;
                SiteList::parse_lines(&text)?.into_vec()
            } else {
                domains
            };
            let lists = match list {
                ListArg::Blacklist => host.manager.update_site_lists(Some(entries), None).await?,
                ListArg::Whitelist => host.manager.update_site_lists(None, Some(entries)).await?,
            };
            print_json(&lists)?;
        }
    }
    Ok(())
}
