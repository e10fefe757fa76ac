use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "stayfocused", version, about = "StayFocused site blocker CLI")]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Focus session control
    Focus {
        #[command(subcommand)]
        action: commands::focus::FocusAction,
    },
    /// Block-list and allow-list management
    Sites {
        #[command(subcommand)]
        action: commands::sites::SitesAction,
    },
    /// User preferences, import/export and reset
    Prefs {
        #[command(subcommand)]
        action: commands::prefs::PrefsAction,
    },
    /// Suite toggles
    Toggle {
        #[command(subcommand)]
        action: commands::toggle::ToggleAction,
    },
    /// Engine configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Inspect installed block rules
    Rules {
        #[command(subcommand)]
        action: commands::rules::RulesAction,
    },
    /// Handle one JSON request and print the JSON response
    Message {
        /// Request object, e.g. '{"type":"FOCUS_GET_STATUS"}'
        json: String,
    },
    /// Run the background loop: restore, fire due alarms, follow store changes
    Watch(commands::watch::WatchArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match cli.command {
        Commands::Focus { action } => commands::focus::run(action).await,
        Commands::Sites { action } => commands::sites::run(action).await,
        Commands::Prefs { action } => commands::prefs::run(action).await,
        Commands::Toggle { action } => commands::toggle::run(action).await,
        Commands::Config { action } => commands::config::run(action),
        Commands::Rules { action } => commands::rules::run(action).await,
        Commands::Message { json } => commands::message::run(&json).await,
        Commands::Watch(args) => commands::watch::run(args).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
