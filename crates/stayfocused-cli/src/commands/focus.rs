use clap::Subcommand;
use stayfocused_core::{ClockTime, Preferences, SessionPlan, StartRequest, StartSpec};

use super::{print_json, CliResult, Host};

#[derive(Subcommand)]
pub enum FocusAction {
    /// Start a focus session
    Start {
        /// Logical start as HH:MM (tomorrow if already passed); blocking begins now
        #[arg(long)]
        at: Option<ClockTime>,
        #[command(subcommand)]
        plan: PlanArg,
    },
    /// Stop the running session
    Stop,
    /// Print session status as JSON
    Status,
    /// Print what the block page shows
    Info,
}

#[derive(Subcommand)]
pub enum PlanArg {
    /// Block for a fixed duration (defaults to the preferred duration)
    Timed {
        #[arg(long)]
        hours: Option<u32>,
        #[arg(long)]
        minutes: Option<u32>,
    },
    /// Block until a wall-clock time
    Until {
        /// End time as HH:MM
        time: ClockTime,
    },
    /// Block until stopped
    Indefinite,
}

async fn plan(host: &Host, arg: PlanArg) -> Result<SessionPlan, Box<dyn std::error::Error>> {
    Ok(match arg {
        PlanArg::Timed {
            hours: None,
            minutes: None,
        } => {
            let prefs = Preferences::load(host.manager.store().as_ref()).await?;
            SessionPlan::Timed {
                hours: prefs.default_duration_min / 60,
                minutes: prefs.default_duration_min % 60,
            }
        }
        PlanArg::Timed { hours, minutes } => SessionPlan::Timed {
            hours: hours.unwrap_or(0),
            minutes: minutes.unwrap_or(0),
        },
        PlanArg::Until { time } => SessionPlan::UntilClockTime { until: time },
        PlanArg::Indefinite => SessionPlan::Indefinite,
    })
}

pub async fn run(action: FocusAction) -> CliResult {
    let host = Host::open().await?;

    match action {
        FocusAction::Start { at, plan: arg } => {
            let request = StartRequest {
                start: at.map_or(StartSpec::Now, StartSpec::At),
                plan: plan(&host, arg).await?,
            };
            let status = host.manager.start_session(request).await?;
            print_json(&status)?;
        }
        FocusAction::Stop => {
            let status = host.manager.stop_session().await?;
            print_json(&status)?;
        }
        FocusAction::Status => {
            print_json(&host.manager.get_status().await?)?;
        }
        FocusAction::Info => {
            print_json(&host.manager.blocking_info().await?)?;
        }
    }
    Ok(())
}
