//! Sicc Crypto Bot
//!
//! Sends a market digest for a list of crypto assets to a group SMS
//! conversation and maintains its membership.

mod commands;
mod config;

use clap::{Args as ClapArgs, Parser, Subcommand};
use commands::{BotContext, CommandError, DispatchOptions};
use config::AppConfig;
use sicc_alerts::FetchPolicy;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Sicc Crypto Bot CLI
#[derive(Parser, Debug)]
#[command(name = "sicc-crypto-bot")]
#[command(about = "Group SMS market alerts for crypto assets", long_about = None)]
struct Args {
    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Environment file to load before reading configuration
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Ensure the conversation and roster, then send the alert (default)
    Send(DispatchArgs),
    /// Send the alert to the existing conversation only
    Test(DispatchArgs),
    /// Add phone numbers or configured names (default: the configured roster)
    Add {
        #[arg(value_delimiter = ',')]
        numbers: Vec<String>,
    },
    /// Remove phone numbers or configured names (default: the configured roster)
    Remove {
        #[arg(value_delimiter = ',')]
        numbers: Vec<String>,
    },
    /// Add a chat participant by identity (e.g., a bot account)
    AddIdentity { identity: String },
    /// List current participants
    Participants,
    /// List recent messages
    Messages {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Delete the configured conversation, or the one with the given SID
    DeleteConversation {
        #[arg(long)]
        sid: Option<String>,
    },
}

#[derive(ClapArgs, Debug, Default, PartialEq, Eq)]
struct DispatchArgs {
    /// Render and log the message without sending it; membership is left unchanged
    #[arg(long)]
    dry_run: bool,

    /// Skip tickers that fail instead of aborting the run
    #[arg(long)]
    collect_all: bool,
}

impl From<&DispatchArgs> for DispatchOptions {
    fn from(args: &DispatchArgs) -> Self {
        Self {
            dry_run: args.dry_run,
            policy: if args.collect_all {
                FetchPolicy::CollectAll
            } else {
                FetchPolicy::AbortOnFirstFailure
            },
        }
    }
}

fn parse_level(level: &str) -> Level {
    match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn init_logging(level: &str) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(level))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

fn load_env_file(path: Option<&PathBuf>) {
    match path {
        Some(path) => {
            if let Err(e) = dotenvy::from_path(path) {
                warn!(path = %path.display(), error = %e, "Could not load env file");
            }
        }
        None => {
            // A missing .env is fine; the process environment may be complete
            let _ = dotenvy::dotenv();
        }
    }
}

async fn run(ctx: &BotContext, command: Command) -> Result<(), CommandError> {
    match command {
        Command::Send(args) => {
            ctx.send(DispatchOptions::from(&args)).await?;
        }
        Command::Test(args) => {
            ctx.test(DispatchOptions::from(&args)).await?;
        }
        Command::Add { numbers } => {
            ctx.add(&numbers).await?;
        }
        Command::Remove { numbers } => {
            ctx.remove(&numbers).await?;
        }
        Command::AddIdentity { identity } => {
            ctx.add_identity(&identity).await?;
        }
        Command::Participants => {
            ctx.participants().await?;
        }
        Command::Messages { limit } => {
            ctx.messages(limit).await?;
        }
        Command::DeleteConversation { sid } => {
            ctx.delete_conversation(sid.as_deref()).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(&args.log_level);
    load_env_file(args.env_file.as_ref());

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        tickers = config.tickers.len(),
        participants = config.roster.len(),
        conversation = %config.conversation_name,
        "Starting Sicc Crypto Bot"
    );

    let ctx = match BotContext::from_config(config) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let command = args
        .command
        .unwrap_or_else(|| Command::Send(DispatchArgs::default()));

    match run(&ctx, command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
