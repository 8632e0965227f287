//! CmisSync CLI - diagnostics for a synchronized tree
//!
//! Provides commands for:
//! - Printing the solver dispatch matrix
//! - Viewing and validating configuration
//! - Inspecting the metadata database (mapped objects, change log token)

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cmisync_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    completions::CompletionsCommand, config::ConfigCommand, inspect::InspectCommand,
    matrix::MatrixCommand, token::TokenCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "cmisync", version, about = "CmisSync synchronization diagnostics")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the solver dispatch matrix
    Matrix(MatrixCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Show the mapped object stored for a local path
    Inspect(InspectCommand),
    /// Show the persisted change log token
    Token(TokenCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

/// Log level from verbosity flags, falling back to the configured level
fn log_level(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);

    let level = log_level(cli.verbose, &config.logging.level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Commands::Matrix(cmd) => cmd.execute(format).await,
        Commands::Config(cmd) => cmd.execute(&config_path, format).await,
        Commands::Inspect(cmd) => cmd.execute(&config, format).await,
        Commands::Token(cmd) => cmd.execute(&config, format).await,
        Commands::Completions(cmd) => cmd.execute(format).await,
    }
}
