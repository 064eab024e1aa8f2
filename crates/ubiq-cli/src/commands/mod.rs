//! Subcommands and the plumbing they share
//!
//! Every command builds a [`CloudBridge`] over the local directory adapters
//! from the loaded configuration. Streaming commands register a uniquely
//! named channel, print its events, and cancel it on Ctrl-C.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};
use ubiq_bridge::{BridgeError, ChannelEvent, CloudBridge};
use ubiq_core::config::Config;
use ubiq_local::{DirectoryContainerResolver, LocalCloudStore, LocalMetadataIndex};

use crate::output::{OutputFormat, OutputFormatter};

pub mod config;
pub mod delete;
pub mod gather;
pub mod transfer;

/// What every command receives from `main`
pub struct CliContext {
    pub config: Config,
    pub config_path: PathBuf,
    pub format: OutputFormat,
}

impl CliContext {
    pub fn json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }
}

/// Expands a leading `~/` against the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

/// Anchors a relative local path at the current directory
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Cannot determine current directory")?;
    Ok(cwd.join(path))
}

/// Wires the local adapters into a bridge
pub fn build_bridge(config: &Config) -> CloudBridge {
    let base = expand_home(&config.containers.root);
    debug!(base = %base.display(), signed_in = config.containers.signed_in, "Building bridge");
    CloudBridge::new(
        Arc::new(DirectoryContainerResolver::new(base, config.containers.signed_in)),
        Arc::new(LocalCloudStore::new()),
        Arc::new(LocalMetadataIndex::new(config.query.notification_buffer)),
    )
    .with_scopes(config.search_scopes())
}

/// Converts a bridge failure into a CLI error carrying its wire code
pub fn bridge_error(err: BridgeError) -> anyhow::Error {
    anyhow!("[{}] {}", err.code(), err)
}

/// Registers a fresh channel and attaches this process as its listener
pub fn open_channel(bridge: &CloudBridge) -> Result<(String, UnboundedReceiver<ChannelEvent>)> {
    let name = format!("cli-{}", uuid::Uuid::new_v4());
    bridge.create_event_channel(&name).map_err(bridge_error)?;
    let rx = bridge
        .registry()
        .lookup(&name)
        .ok_or_else(|| anyhow!("channel {name} vanished after creation"))?
        .listen()?;
    Ok((name, rx))
}

/// How a followed stream ended
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEnd {
    /// `EndOfStream` was received
    Completed,
    /// The channel closed after an error event
    Failed(String),
    /// The user pressed Ctrl-C
    Cancelled,
}

/// Prints channel events until the stream closes or the user interrupts
pub async fn follow(
    bridge: &CloudBridge,
    channel: &str,
    mut rx: UnboundedReceiver<ChannelEvent>,
    formatter: &dyn OutputFormatter,
) -> StreamEnd {
    let mut completed = false;
    let mut last_error = None;
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    formatter.event(&event);
                    match event {
                        ChannelEvent::EndOfStream => completed = true,
                        ChannelEvent::Error { message, .. } => last_error = Some(message),
                        _ => {}
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!(channel, "Interrupted, cancelling channel");
                bridge.cancel(channel);
                return StreamEnd::Cancelled;
            }
        }
    }

    match (completed, last_error) {
        (true, _) => StreamEnd::Completed,
        (false, Some(message)) => StreamEnd::Failed(message),
        (false, None) => StreamEnd::Failed("stream closed before completion".to_string()),
    }
}

/// Turns a stream outcome into the command result
pub fn finish(end: StreamEnd, formatter: &dyn OutputFormatter) -> Result<()> {
    match end {
        StreamEnd::Completed => Ok(()),
        StreamEnd::Cancelled => {
            formatter.warn("Cancelled");
            Ok(())
        }
        StreamEnd::Failed(message) => bail!(message),
    }
}
