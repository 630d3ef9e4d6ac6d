use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod auth;
pub mod chat;
pub mod events;
pub mod free_slots;

use crate::core::AppConfig;

#[derive(Subcommand)]
enum Command {
    /// Chat with the calendar assistant (the default)
    Chat {},
    /// Authorize calendar access and store the token
    Auth {
        /// Keep a separate token file for this profile
        #[arg(long)]
        profile: Option<String>,
    },
    /// Print upcoming events
    Events {
        #[arg(long, default_value = "10")]
        max_results: u32,
    },
    /// Print free slots between now and the end of today
    FreeSlots {
        /// Minimum slot length in minutes
        #[arg(long, default_value = "60")]
        duration: i64,
        /// IANA timezone, defaults to CAL_DEFAULT_TIMEZONE
        #[arg(long)]
        timezone: Option<String>,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

/// Log to stderr so output doesn't mix with the chat transcript.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();
    init_tracing();

    let config = AppConfig::default();

    match args.command {
        Some(Command::Chat {}) | None => {
            chat::run(&config).await?;
        }
        Some(Command::Auth { profile }) => {
            auth::run(&config, profile).await?;
        }
        Some(Command::Events { max_results }) => {
            events::run(&config, max_results).await?;
        }
        Some(Command::FreeSlots { duration, timezone }) => {
            free_slots::run(&config, duration, timezone).await?;
        }
    }

    Ok(())
}
