//! # jobdeck-sync
//!
//! Command-line client for the JobDeck sync engine.
//!
//! ## Commands
//!
//! - `init`: Initialize the device identity and server connection
//! - `status`: Show local and server sync status
//! - `sync`: Run one full sync cycle (push + pull + resolve)
//! - `push`: Push queued local changes
//! - `pull`: Pull server changes and apply them locally
//! - `queue`: Inspect or edit the offline queue
//! - `export`: Download a full account backup
//! - `import`: Restore account data from a backup file
//!
//! ## Example
//!
//! ```bash
//! # Initialize device
//! jobdeck-sync init --name "Work Laptop" --server https://sync.jobdeck.app --token $TOKEN
//!
//! # Queue a change while offline
//! jobdeck-sync queue add --entity-type job --entity-id job_1 \
//!     --operation create --data '{"company": "Acme"}'
//!
//! # Run a full sync
//! jobdeck-sync sync
//!
//! # Inspect the result
//! jobdeck-sync status
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;
mod store;

use commands::{export, import, init, pull, push, queue, status, sync};

/// Command-line client for the JobDeck sync engine.
#[derive(Parser, Debug)]
#[command(name = "jobdeck-sync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for device identity, sync state, and local data
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the device identity and server connection
    Init {
        /// Device name
        #[arg(long, short)]
        name: String,

        /// Sync server base URL
        #[arg(long, default_value = "https://sync.jobdeck.app")]
        server: String,

        /// Access token for the account session
        #[arg(long)]
        token: Option<String>,
    },

    /// Show local and server sync status
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one full sync cycle (push + pull + resolve)
    Sync,

    /// Push queued local changes to the server
    Push,

    /// Pull server changes and apply them locally
    Pull,

    /// Inspect or edit the offline queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },

    /// Download a full account backup
    Export {
        /// Write the backup to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Restore account data from a backup file
    Import {
        /// The backup file to restore
        file: PathBuf,

        /// Replace existing server data instead of merging
        #[arg(long)]
        overwrite: bool,
    },
}

#[derive(Subcommand, Debug)]
enum QueueCommands {
    /// List queued changes
    List,

    /// Show queue statistics
    Stats,

    /// Queue a change by hand
    Add {
        /// Entity type: job, resume, coverLetter, or settings
        #[arg(long)]
        entity_type: String,

        /// The entity's own id
        #[arg(long)]
        entity_id: String,

        /// Operation: create, update, or delete
        #[arg(long)]
        operation: String,

        /// The entity body as JSON (required for create and update)
        #[arg(long)]
        data: Option<String>,
    },

    /// Drop all queued changes
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists and is private
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;
    config::set_dir_permissions_0700(&data_dir).await?;

    match cli.command {
        Commands::Init {
            name,
            server,
            token,
        } => {
            init::run(&data_dir, &name, &server, token.as_deref()).await?;
        }
        Commands::Status { json } => {
            status::run(&data_dir, json).await?;
        }
        Commands::Sync => {
            sync::run(&data_dir).await?;
        }
        Commands::Push => {
            push::run(&data_dir).await?;
        }
        Commands::Pull => {
            pull::run(&data_dir).await?;
        }
        Commands::Queue { command } => match command {
            QueueCommands::List => queue::list(&data_dir).await?,
            QueueCommands::Stats => queue::stats(&data_dir).await?,
            QueueCommands::Add {
                entity_type,
                entity_id,
                operation,
                data,
            } => {
                queue::add(
                    &data_dir,
                    &entity_type,
                    &entity_id,
                    &operation,
                    data.as_deref(),
                )
                .await?;
            }
            QueueCommands::Clear => queue::clear(&data_dir).await?,
        },
        Commands::Export { output } => {
            export::run(&data_dir, output.as_deref()).await?;
        }
        Commands::Import { file, overwrite } => {
            import::run(&data_dir, &file, overwrite).await?;
        }
    }

    Ok(())
}

/// Route engine logs to stderr. `RUST_LOG` overrides the default level.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Get the default data directory for jobdeck-sync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("app", "jobdeck", "jobdeck-sync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
