//! Watch-and-rebuild daemon for multi-package workspaces
//!
//! Watches every workspace package for source changes, re-runs a per-package
//! update command when one changes, and keeps a long-running command (such
//! as a development server) alive across updates.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod exec;
mod inventory;
mod types;
mod watcher;

use types::{DEFAULT_CHANGE_COMMAND, DEFAULT_DELAY_MS, DEFAULT_EXTENSION, DEFAULT_IGNORE};

/// Development-loop daemon for multi-package workspaces
#[derive(Parser)]
#[command(name = "monowatch")]
#[command(version = "0.1.0")]
#[command(about = "Watch workspace packages, rebuild on change, restart your dev command")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Root directory of the workspace
    #[arg(short, long, default_value = ".", global = true)]
    root: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command every time a file changes in one of the workspace
    /// packages, then (re)start the long-running command
    Watch {
        /// The long-running command to keep alive, e.g. "yarn start"
        command: String,

        /// The command run when a file has been updated; %PACKAGE% is
        /// replaced with the name of the package that changed
        #[arg(short = 'c', long = "change", default_value = DEFAULT_CHANGE_COMMAND)]
        change: String,

        /// Which file extension to watch for changes
        #[arg(short = 'e', long, visible_alias = "ext", default_value = DEFAULT_EXTENSION)]
        extension: String,

        /// Glob patterns for files and directories excluded from watching
        #[arg(short = 'i', long, default_values_t = DEFAULT_IGNORE.map(String::from))]
        ignore: Vec<String>,

        /// The delay between polling for changes, in milliseconds. This can
        /// prevent double triggering from IDE file watchers and the like
        #[arg(short = 'd', long, default_value_t = DEFAULT_DELAY_MS)]
        delay: u64,
    },

    /// Upgrade the dependency manifests of every workspace package
    Upgrade,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // --verbose wins; otherwise MONOWATCH_LOG selects the level.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("MONOWATCH_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("monowatch v0.1.0");

    match cli.command {
        Commands::Watch {
            command,
            change,
            extension,
            ignore,
            delay,
        } => {
            commands::watch::run(&cli.root, command, change, extension, ignore, delay).await?;
        }
        Commands::Upgrade => {
            commands::upgrade::run(&cli.root).await?;
        }
    }

    Ok(())
}
