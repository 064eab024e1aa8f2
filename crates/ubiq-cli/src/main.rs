//! UbiqBridge CLI - Command-line interface for UbiqBridge
//!
//! Provides commands for:
//! - Listing containers, optionally following changes
//! - Uploading and downloading with live progress
//! - Deleting and moving items
//! - Inspecting configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use ubiq_core::config::Config;

mod commands;
mod output;

use commands::{
    config::ConfigCommand,
    delete::{DeleteCommand, MoveCommand},
    gather::GatherCommand,
    transfer::{DownloadCommand, DownloadInPlaceCommand, UploadCommand},
    CliContext,
};
use output::{get_formatter, OutputFormat};

#[derive(Debug, Parser)]
#[command(name = "ubiq", version, about = "Cloud container bridge")]
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
    /// List the items of a container
    Gather(GatherCommand),
    /// Copy a local file into a container
    Upload(UploadCommand),
    /// Fetch a cloud item and copy it to a local path
    Download(DownloadCommand),
    /// Materialize a cloud item where it is
    DownloadInPlace(DownloadInPlaceCommand),
    /// Delete items from a container
    Delete(DeleteCommand),
    /// Move an item within a container
    Move(MoveCommand),
    /// View and check configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);

    // Setup tracing; logs go to stderr so stdout stays parseable
    let filter = match cli.verbose {
        0 => config.logging.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    for error in config.validate() {
        warn!(config_path = %config_path.display(), %error, "Configuration problem");
    }

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = CliContext {
        config,
        config_path,
        format,
    };

    let result = match &cli.command {
        Commands::Gather(cmd) => cmd.execute(&ctx).await,
        Commands::Upload(cmd) => cmd.execute(&ctx).await,
        Commands::Download(cmd) => cmd.execute(&ctx).await,
        Commands::DownloadInPlace(cmd) => cmd.execute(&ctx).await,
        Commands::Delete(cmd) => cmd.execute(&ctx).await,
        Commands::Move(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
    };

    if let Err(e) = &result {
        get_formatter(ctx.json()).error(&format!("{e:#}"));
        std::process::exit(1);
    }
    Ok(())
}
