//! Transfer commands - Upload and download with progress
//!
//! Provides `ubiq upload`, `ubiq download` and `ubiq download-in-place`.
//! Each one starts the transfer and then follows its event channel until
//! the transfer ends or the user presses Ctrl-C.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::{absolute, bridge_error, build_bridge, finish, follow, open_channel, CliContext};
use crate::output::get_formatter;

/// Copy a local file into a container
#[derive(Debug, Args)]
pub struct UploadCommand {
    /// Container identifier
    pub container: String,

    /// Local file to upload
    pub local: PathBuf,

    /// Destination name relative to the container root
    pub cloud_name: String,

    /// Return after the copy without following upload progress
    #[arg(long)]
    pub no_progress: bool,
}

impl UploadCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = get_formatter(ctx.json());
        let bridge = build_bridge(&ctx.config);
        let local = absolute(&self.local)?;

        if self.no_progress {
            bridge
                .upload(&self.container, &local, &self.cloud_name, None)
                .await
                .map_err(bridge_error)?;
            formatter.success(&format!("Uploaded {}", self.cloud_name));
            return Ok(());
        }

        let (channel, rx) = open_channel(&bridge)?;
        bridge
            .upload(&self.container, &local, &self.cloud_name, Some(&channel))
            .await
            .map_err(bridge_error)?;
        info!(container = %self.container, name = %self.cloud_name, "Upload started");

        finish(follow(&bridge, &channel, rx, formatter.as_ref()).await, formatter.as_ref())
    }
}

/// Fetch a cloud item and copy it to a local path
#[derive(Debug, Args)]
pub struct DownloadCommand {
    /// Container identifier
    pub container: String,

    /// Item name relative to the container root
    pub cloud_name: String,

    /// Local destination, replaced if it exists
    pub local: PathBuf,
}

impl DownloadCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = get_formatter(ctx.json());
        let bridge = build_bridge(&ctx.config);
        let local = absolute(&self.local)?;

        let (channel, rx) = open_channel(&bridge)?;
        bridge
            .download(&self.container, &self.cloud_name, &local, Some(&channel))
            .await
            .map_err(bridge_error)?;
        info!(container = %self.container, name = %self.cloud_name, "Download started");

        finish(follow(&bridge, &channel, rx, formatter.as_ref()).await, formatter.as_ref())
    }
}

/// Materialize a cloud item where it is
#[derive(Debug, Args)]
pub struct DownloadInPlaceCommand {
    /// Container identifier
    pub container: String,

    /// Item name relative to the container root
    pub cloud_name: String,
}

impl DownloadInPlaceCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = get_formatter(ctx.json());
        let bridge = build_bridge(&ctx.config);

        let (channel, rx) = open_channel(&bridge)?;
        bridge
            .download_in_place(&self.container, &self.cloud_name, Some(&channel))
            .await
            .map_err(bridge_error)?;

        finish(follow(&bridge, &channel, rx, formatter.as_ref()).await, formatter.as_ref())
    }
}
