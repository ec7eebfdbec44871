//! jobtrack CLI
//!
//! Command-line interface for jobtrack - local-first job search tracking.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use jobtrack_core::{Config, EntityType, Tracker};

mod commands;
mod editor;
mod output;

use commands::query::ListArgs;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "jobtrack")]
#[command(about = "jobtrack - Local-first job search tracking")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Work against the local store only; writes are queued
    #[arg(long, global = true)]
    offline: bool,

    /// Log debug output to stderr (or the configured log file)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to an alternative config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List rows of a collection
    #[command(alias = "ls")]
    List {
        /// Collection (job_applications, interviews, contacts, companies)
        entity: String,
        #[command(flatten)]
        args: ListArgs,
    },
    /// Show one row
    Show {
        /// Collection
        entity: String,
        /// Row id
        id: String,
    },
    /// Create or update a row from a JSON object ("-" reads stdin)
    Save {
        /// Collection
        entity: String,
        /// Row as a JSON object
        json: String,
    },
    /// Edit a row as JSON in $EDITOR
    Edit {
        /// Collection
        entity: String,
        /// Row id
        id: String,
    },
    /// Delete a row
    #[command(alias = "rm")]
    Delete {
        /// Collection
        entity: String,
        /// Row id
        id: String,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Show status (network, pending operations, storage)
    Status,
    /// Refresh from the remote and push queued writes
    Sync,
    /// List operations waiting to be synced
    Queue,
    /// Delete all local data and start over
    Reset {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, remote_url, api_key, user_id,
        /// request_timeout_secs, queue_failed_writes, log_file)
        key: String,
        /// Configuration value ("none" clears optional values)
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands don't need the store
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), cli.config.as_ref(), &output);
    }

    let config =
        Config::load_with_cli_override(cli.config.as_ref()).context("Failed to load configuration")?;
    init_logging(&config, cli.verbose);

    let tracker = match Tracker::open(config.clone()) {
        Ok(tracker) => tracker,
        Err(e) if Tracker::needs_reset(&e) => {
            // A store that cannot be opened can still be recreated
            if let Commands::Reset { yes } = cli.command {
                return commands::sync::reset_unopened(&config, yes, &output);
            }
            return Err(e.context("Run 'jobtrack reset' to recreate the local store"));
        }
        Err(e) => return Err(e),
    };
    connect(&tracker, cli.offline).await;

    // Push writes queued by earlier offline runs
    if !matches!(
        &cli.command,
        Commands::Sync | Commands::Queue | Commands::Reset { .. }
    ) {
        commands::sync::sync_quiet(&tracker, &output).await;
    }

    match cli.command {
        Commands::List { entity, args } => {
            commands::query::list(&tracker, parse_entity(&entity)?, args, &output).await
        }
        Commands::Show { entity, id } => {
            commands::query::show(&tracker, parse_entity(&entity)?, id, &output).await
        }
        Commands::Save { entity, json } => {
            commands::record::save(&tracker, parse_entity(&entity)?, json, &output).await
        }
        Commands::Edit { entity, id } => {
            commands::record::edit(&tracker, parse_entity(&entity)?, id, &output).await
        }
        Commands::Delete { entity, id, yes } => {
            commands::record::delete(&tracker, parse_entity(&entity)?, id, yes, &output).await
        }
        Commands::Status => commands::status::show(&tracker, &output),
        Commands::Sync => commands::sync::sync(&tracker, &output).await,
        Commands::Queue => commands::sync::queue(&tracker, &output),
        Commands::Reset { yes } => commands::sync::reset(&tracker, yes, &output),
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Accepts table names ("job_applications") and singular forms ("company")
fn parse_entity(name: &str) -> Result<EntityType> {
    let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
    let singular = match normalized.as_str() {
        "job_application" | "application" | "applications" => "job_applications",
        "interview" => "interviews",
        "contact" => "contacts",
        "company" => "companies",
        other => other,
    };
    singular.parse()
}

/// Settle the starting connectivity
///
/// With a remote configured the tracker starts online; an unreachable
/// remote or `--offline` drops it to offline so writes are queued.
async fn connect(tracker: &Tracker, offline: bool) {
    if !tracker.is_online() {
        return;
    }
    if offline {
        tracker.set_online(false).await;
        return;
    }
    if let Err(e) = tracker.check_remote().await {
        warn!("Working offline: {:#}", e);
        tracker.set_online(false).await;
    }
}

/// Initialize logging
///
/// JOBTRACK_LOG sets the level (default "warn", "debug" with --verbose).
/// Logs go to the configured log file, or stderr.
fn init_logging(config: &Config, verbose: bool) {
    let log_level = std::env::var("JOBTRACK_LOG")
        .unwrap_or_else(|_| if verbose { "debug" } else { "warn" }.to_string());
    let env_filter = EnvFilter::new(format!(
        "jobtrack_core={},jobtrack_cli={}",
        log_level, log_level
    ));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    match &config.log_file {
        Some(path) => {
            let file = match OpenOptions::new().create(true).append(true).open(path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not open log file {:?}: {}", path, e);
                    return;
                }
            };
            let _ = builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}
