//! tasksync CLI
//!
//! Command-line interface for a local-first task list with live queries
//! and a stored sync switch.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tasksync_core::{Config, EmbeddedStore, StorageError, StoreError, TaskApp};

mod commands;
mod output;
mod sse;

use output::{Output, OutputFormat};

/// Environment variable holding the log filter
const LOG_ENV: &str = "TASKSYNC_LOG";

#[derive(Parser)]
#[command(name = "tasksync")]
#[command(about = "tasksync - Local-first task list with live sync control")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file to use instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a task
    Add {
        /// Task title
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },
    /// List tasks
    #[command(alias = "ls")]
    List,
    /// List tasks whose title starts with a prefix
    Find {
        /// Title prefix
        prefix: String,
    },
    /// Rename a task
    Rename {
        /// Task ID (full ID or prefix)
        id: String,
        /// New title
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },
    /// Mark a task done or not done
    #[command(alias = "done")]
    Toggle {
        /// Task ID (full ID or prefix)
        id: String,
    },
    /// Delete a task
    #[command(alias = "rm")]
    Delete {
        /// Task ID (full ID or prefix)
        id: String,
    },
    /// Interactive shell with live task and sync state updates
    Shell {
        /// Print updates as server-sent events
        #[arg(long)]
        sse: bool,
    },
    /// Show or change the sync state
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum SyncCommands {
    /// Show the sync state
    Status,
    /// Flip the sync state
    Toggle,
    /// Enable sync
    On,
    /// Disable sync
    Off,
    /// Print the sync state whenever it changes
    Watch {
        /// Print updates as server-sent events
        #[arg(long)]
        sse: bool,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, app_name, device_name, websocket_url, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if let Some(hint) = recovery_hint(&e) {
                eprintln!("Hint: {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands don't need the store
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), cli.config.as_ref(), &output);
    }

    let config = Config::load_with_cli_override(cli.config.as_ref())
        .context("Failed to load configuration")?;
    init_logging(&config);

    let store = EmbeddedStore::open_with_config(&config).context("Failed to open task store")?;
    let app = TaskApp::start(Arc::new(store), &config)
        .await
        .context("Failed to start sync control")?;

    let result = run_command(cli.command, &app, &config, &output).await;
    let stopped = app.shutdown().await.context("Failed to stop sync control");

    result.and(stopped)
}

/// Recovery hint for a storage failure anywhere in the error chain
fn recovery_hint(err: &anyhow::Error) -> Option<&'static str> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<tasksync_core::Error>() {
            e.recovery_suggestion()
        } else if let Some(e) = cause.downcast_ref::<StoreError>() {
            e.recovery_suggestion()
        } else {
            cause
                .downcast_ref::<StorageError>()
                .and_then(StorageError::recovery_suggestion)
        }
    })
}

async fn run_command(
    command: Commands,
    app: &TaskApp,
    config: &Config,
    output: &Output,
) -> Result<()> {
    match command {
        Commands::Add { title } => commands::task::add(app, title.join(" "), output).await,
        Commands::List => commands::task::list(app, output).await,
        Commands::Find { prefix } => commands::task::find(app, prefix, output).await,
        Commands::Rename { id, title } => {
            commands::task::rename(app, id, title.join(" "), output).await
        }
        Commands::Toggle { id } => commands::task::toggle(app, id, output).await,
        Commands::Delete { id } => commands::task::delete(app, id, output).await,
        Commands::Shell { sse } => commands::shell::run(app, sse, output).await,
        Commands::Sync { command } => handle_sync_command(command, app, config, output).await,
        Commands::Config { .. } => unreachable!(), // Handled in main
    }
}

async fn handle_sync_command(
    command: Option<SyncCommands>,
    app: &TaskApp,
    config: &Config,
    output: &Output,
) -> Result<()> {
    match command {
        Some(SyncCommands::Status) | None => commands::sync::status(app, config, output),
        Some(SyncCommands::Toggle) => commands::sync::toggle(app, output).await,
        Some(SyncCommands::On) => commands::sync::set(app, true, output).await,
        Some(SyncCommands::Off) => commands::sync::set(app, false, output).await,
        Some(SyncCommands::Watch { sse }) => commands::sync::watch(app, sse, output).await,
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

/// Initialize logging to the configured log file, or stderr
///
/// The filter comes from `TASKSYNC_LOG` and defaults to warnings only, so
/// command output stays clean.
fn init_logging(config: &Config) {
    let filter = || {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
            EnvFilter::new("tasksync_core=warn,tasksync_cli=warn")
        })
    };

    if let Some(path) = &config.log_file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter())
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init();
                return;
            }
            Err(e) => eprintln!("Warning: Could not open log file {:?}: {}", path, e),
        }
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    fn permission_denied() -> StorageError {
        StorageError::PermissionDenied {
            path: PathBuf::from("/data/store.automerge"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        }
    }

    #[test]
    fn test_recovery_hint_for_store_errors() {
        let err = anyhow::Error::new(StoreError::from(permission_denied()))
            .context("Failed to open task store");
        assert!(recovery_hint(&err).is_some());

        let err = anyhow::Error::new(tasksync_core::Error::from(StoreError::from(
            permission_denied(),
        )))
        .context("Failed to add task");
        assert!(recovery_hint(&err).is_some());
    }

    #[test]
    fn test_no_recovery_hint_for_other_errors() {
        let err = anyhow::anyhow!("something else").context("Failed to add task");
        assert!(recovery_hint(&err).is_none());

        let err = anyhow::Error::new(StoreError::Query("bad".to_string()));
        assert!(recovery_hint(&err).is_none());
    }

    #[test]
    fn test_add_joins_words() {
        let cli = Cli::try_parse_from(["tasksync", "add", "Buy", "oat", "milk"]).unwrap();
        match cli.command {
            Commands::Add { title } => assert_eq!(title.join(" "), "Buy oat milk"),
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_aliases() {
        let cli = Cli::try_parse_from(["tasksync", "ls"]).unwrap();
        assert!(matches!(cli.command, Commands::List));

        let cli = Cli::try_parse_from(["tasksync", "rm", "ab12"]).unwrap();
        assert!(matches!(cli.command, Commands::Delete { id } if id == "ab12"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tasksync", "sync", "status", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Sync {
                command: Some(SyncCommands::Status)
            }
        ));
    }

    #[test]
    fn test_sync_defaults_to_status() {
        let cli = Cli::try_parse_from(["tasksync", "sync"]).unwrap();
        assert!(matches!(cli.command, Commands::Sync { command: None }));
    }

    #[test]
    fn test_watch_sse_flag() {
        let cli = Cli::try_parse_from(["tasksync", "sync", "watch", "--sse"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Sync {
                command: Some(SyncCommands::Watch { sse: true })
            }
        ));
    }
}
