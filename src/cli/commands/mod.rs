//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod harvest;
mod init;
mod show;
mod status;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use taxaharvest::config::{load_settings_with_options, BackendKind, LoadOptions};

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Resumable harvesting of plant taxon records")]
#[command(version)]
pub struct Cli {
    /// Data directory (overrides config file)
    #[arg(long, short = 't', global = true)]
    target: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Where to read target names from (overrides config file).
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Directory whose subdirectory names are the targets
    #[arg(long, conflicts_with = "targets_file")]
    pub targets_dir: Option<PathBuf>,

    /// File with one target per line
    #[arg(long)]
    pub targets_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Forward pass over every pending target
    Run {
        #[command(flatten)]
        targets: TargetArgs,
        /// Recovery passes to run afterwards (stops early once nothing improves)
        #[arg(long, default_value = "0")]
        recover_passes: usize,
        /// Targets per batch (overrides config)
        #[arg(short, long)]
        batch_size: Option<usize>,
        /// Fetch backend (overrides config)
        #[arg(long, value_enum)]
        backend: Option<BackendKind>,
        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Retry failed targets and targets without a stored record
    Recover {
        #[command(flatten)]
        targets: TargetArgs,
        /// Give targets that failed an earlier recovery another chance
        #[arg(long)]
        retry_failed: bool,
        /// Fetch backend (overrides config)
        #[arg(long, value_enum)]
        backend: Option<BackendKind>,
        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Show crawl and store status
    Status {
        #[command(flatten)]
        targets: TargetArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print one stored record
    Show {
        /// Target key
        key: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        use_cwd: cli.cwd,
        data_dir: cli.target,
    };
    let (settings, mut config) = load_settings_with_options(options).await?;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Run {
            targets,
            recover_passes,
            batch_size,
            backend,
            no_progress,
        } => {
            if let Some(size) = batch_size {
                config.harvest.batch_size = size;
            }
            if let Some(backend) = backend {
                config.source.backend = backend;
            }
            config.validate()?;
            harvest::cmd_run(&settings, &config, &targets, recover_passes, !no_progress).await
        }
        Commands::Recover {
            targets,
            retry_failed,
            backend,
            no_progress,
        } => {
            if let Some(backend) = backend {
                config.source.backend = backend;
            }
            harvest::cmd_recover(&settings, &config, &targets, retry_failed, !no_progress).await
        }
        Commands::Status { targets, json } => {
            status::cmd_status(&settings, &config, &targets, json).await
        }
        Commands::Show { key, json } => show::cmd_show(&settings, &key, json).await,
    }
}
