//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod check;
mod config_cmd;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};

use run::RunArgs;

#[derive(Parser)]
#[command(name = "reddit-ocr")]
#[command(about = "Download subreddit images and extract their text with OCR")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

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

#[derive(Subcommand)]
enum Commands {
    /// Fetch posts, download their images and write the recognized text
    Run(RunArgs),

    /// Check that the OCR engine and language data are installed
    Check,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let preset = match cli.command {
        Commands::Run(ref args) => args.preset,
        _ => None,
    };
    let options = LoadOptions {
        config_path: cli.config,
        preset,
    };
    let (settings, config) = load_settings_with_options(options).await?;

    match cli.command {
        Commands::Run(args) => run::cmd_run(settings, args).await,
        Commands::Check => check::cmd_check(&settings).await,
        Commands::Config { command } => match command {
            ConfigCommands::Show => config_cmd::cmd_config_show(&settings, &config),
        },
    }
}
