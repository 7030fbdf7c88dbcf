//! Khata CLI - SMS and CSV transaction ingestion
//!
//! Usage:
//!   khata init                      Initialize database
//!   khata user add --email X        Create a user, print their api key
//!   khata import --file CSV --api-key KEY   Import an Axio export
//!   khata serve --port 3000         Start web server
//!   khata status                    Show database statistics

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::User { action } => match action {
            UserAction::Add { email, key } => {
                commands::cmd_user_add(&cli.db, email.as_deref(), key.as_deref(), cli.no_encrypt)
            }
        },
        Commands::Category { action } => match action {
            CategoryAction::Add { slug, name, api_key } => commands::cmd_category_add(
                &cli.db,
                &slug,
                &name,
                api_key.as_deref(),
                cli.no_encrypt,
            ),
        },
        Commands::Import { file, api_key } => {
            commands::cmd_import(&cli.db, &file, &api_key, cli.no_encrypt).await
        }
        Commands::Serve { port, host } => {
            commands::cmd_serve(&cli.db, &host, port, cli.no_encrypt).await
        }
        Commands::Status => commands::cmd_status(&cli.db, cli.no_encrypt),
    }
}
