mod analyzer;
mod commands;
mod config;
mod server;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::analyzer::{CommandAnalyzer, ResponseFileAnalyzer};
use crate::commands::{
    cmd_analyze, cmd_goal_clear, cmd_goal_set, cmd_goal_show, cmd_history, cmd_today, cmd_week,
};
use crate::config::Config;
use snapcal_core::analysis::FoodAnalyzer;
use snapcal_core::db::Database;
use snapcal_core::models::DEFAULT_GOAL_KCAL;
use snapcal_core::session::SessionController;

#[derive(Parser)]
#[command(
    name = "snapcal",
    version,
    about = "Log meals from a photo and track calories against a daily goal"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a meal photo, review the items and add them to today's total
    Analyze {
        /// JPEG or PNG image of the meal
        image: PathBuf,
        /// Use a saved analysis response (JSON) instead of running the analyzer
        #[arg(long)]
        response: Option<PathBuf>,
        /// Save the detected items without the interactive review
        #[arg(short, long)]
        yes: bool,
        /// Output as JSON (implies --yes)
        #[arg(long)]
        json: bool,
    },
    /// Show calories eaten against the daily goal
    Today {
        /// Date to show (YYYY-MM-DD, today or yesterday; default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the last 7 days
    Week {
        /// Last day of the window (YYYY-MM-DD, default: today)
        #[arg(long)]
        end: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List every logged day, oldest first
    History {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the daily calorie goal
    Goal {
        #[command(subcommand)]
        command: GoalCommands,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum GoalCommands {
    /// Set the daily calorie goal
    Set {
        /// Calories per day (e.g. 2000 or 2000kcal)
        kcal: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the daily calorie goal
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove the daily calorie goal
    Clear {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("snapcal=warn,snapcal_core=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let mut session = SessionController::new(Database::open(&config.db_path)?);

    if session.needs_goal_setup() && !matches!(cli.command, Commands::Goal { .. }) {
        eprintln!(
            "No daily goal set yet (using {DEFAULT_GOAL_KCAL:.0} kcal). Set one with: snapcal goal set <kcal>"
        );
    }

    match cli.command {
        Commands::Analyze {
            image,
            response,
            yes,
            json,
        } => {
            let analyzer: Box<dyn FoodAnalyzer> = match (response, &config.analyzer_command) {
                (Some(path), _) => Box::new(ResponseFileAnalyzer::new(path)),
                (None, Some(command)) => Box::new(CommandAnalyzer::new(command)?),
                (None, None) => bail!(
                    "No analyzer configured; set SNAPCAL_ANALYZER or pass --response <file>"
                ),
            };
            cmd_analyze(&mut session, analyzer.as_ref(), &image, yes, json)
        }
        Commands::Today { date, json } => cmd_today(&session, date, json),
        Commands::Week { end, json } => cmd_week(&session, end, json),
        Commands::History { json } => cmd_history(&session, json),
        Commands::Goal { command } => match command {
            GoalCommands::Set { kcal, json } => cmd_goal_set(&mut session, &kcal, json),
            GoalCommands::Show { json } => cmd_goal_show(&session, json),
            GoalCommands::Clear { json } => cmd_goal_clear(&mut session, json),
        },
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                Some(config.load_or_create_api_key()?)
            };
            let analyzer = match &config.analyzer_command {
                Some(command) => {
                    Some(Arc::new(CommandAnalyzer::new(command)?) as Arc<dyn FoodAnalyzer>)
                }
                None => None,
            };
            server::start_server(session, analyzer, port, &bind, api_key).await
        }
    }
}
