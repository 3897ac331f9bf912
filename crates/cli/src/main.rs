//! Powergate CLI — the main entry point.
//!
//! Commands:
//! - `serve` — Start the HTTP gateway server
//! - `user`  — Manage user accounts in the ledger database

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "powergate",
    about = "Powergate — metered context-budgeted LLM gateway",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file (default: ~/.powergate/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage user accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user account
    Add {
        username: String,

        /// Starting balance (default: signup_bonus from config)
        #[arg(short, long)]
        balance: Option<i64>,

        /// Grant admin (unmetered) access
        #[arg(long)]
        admin: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(cli.config, port).await?,
        Commands::User {
            command:
                UserCommands::Add {
                    username,
                    balance,
                    admin,
                },
        } => commands::user::add(cli.config, &username, balance, admin).await?,
    }

    Ok(())
}
