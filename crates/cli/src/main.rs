//! Bazaar CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Apply pending migrations
//! bazaar-cli migrate
//!
//! # Load sample data, wiping existing rows first
//! bazaar-cli seed --file crates/cli/seed/sample.yaml --reset
//!
//! # Archive and soft-delete users older than 65
//! bazaar-cli archive-users --older-than 65
//! ```
//!
//! # Environment Variables
//!
//! - `BAZAAR_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "bazaar-cli")]
#[command(author, version, about = "Bazaar CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Load users, products, posts and tasks from a YAML file
    Seed {
        /// Path to the seed file
        #[arg(short, long)]
        file: PathBuf,

        /// Truncate every table before seeding
        #[arg(long)]
        reset: bool,
    },
    /// Copy users older than an age into `users_archive` and soft-delete them
    ArchiveUsers {
        /// Users strictly older than this are archived
        #[arg(long, value_parser = clap::value_parser!(i32).range(0..=120))]
        older_than: i32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Command failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed { file, reset } => {
            let summary = commands::seed::run(&file, reset).await?;
            tracing::info!(
                users = summary.users,
                products = summary.products,
                posts = summary.posts,
                tasks = summary.tasks,
                "Seeding complete"
            );
        }
        Commands::ArchiveUsers { older_than } => {
            commands::archive::run(older_than).await?;
        }
    }
    Ok(())
}
