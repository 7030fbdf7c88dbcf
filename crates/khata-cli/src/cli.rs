//! CLI argument definitions using clap
//!
//! This module contains the clap structs and enums for parsing CLI
//! arguments. The actual command implementations are in the `commands`
//! module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Khata - SMS and CSV transaction ingestion
#[derive(Parser)]
#[command(name = "khata")]
#[command(about = "Ingest bank/UPI SMS alerts and Axio exports into one ledger", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "khata.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set KHATA_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and seed system categories
    Init,

    /// Manage users and their api keys
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Manage the category vocabulary
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },

    /// Import an Axio CSV export
    Import {
        /// CSV file to import
        #[arg(short, long)]
        file: PathBuf,

        /// Api key of the user to import for
        #[arg(short, long)]
        api_key: String,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Show database statistics
    Status,
}

#[derive(Subcommand)]
pub enum UserAction {
    /// Create a user and print their api key
    Add {
        /// Email to associate with the user
        #[arg(short, long)]
        email: Option<String>,

        /// Use this api key instead of minting one
        #[arg(short, long)]
        key: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum CategoryAction {
    /// Create a category (system-wide, or user-scoped with --api-key)
    Add {
        /// Category slug, the key the oracle and importer match against
        #[arg(short, long)]
        slug: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Scope the category to the user behind this api key
        #[arg(short, long)]
        api_key: Option<String>,
    },
}
