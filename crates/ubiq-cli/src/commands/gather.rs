//! Gather command - List a container, optionally following changes
//!
//! Provides the `ubiq gather` CLI command which:
//! 1. Prints every visible item of the container
//! 2. With `--watch`, keeps the query live and prints each refreshed listing
//!    until interrupted

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::{bridge_error, build_bridge, finish, follow, open_channel, CliContext};
use crate::output::get_formatter;

/// List the items of a container
#[derive(Debug, Args)]
pub struct GatherCommand {
    /// Container identifier
    pub container: String,

    /// Keep watching and print every change
    #[arg(long)]
    pub watch: bool,
}

impl GatherCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = get_formatter(ctx.json());
        let bridge = build_bridge(&ctx.config);

        if !self.watch {
            let records = bridge
                .gather(&self.container, None)
                .await
                .map_err(bridge_error)?;
            info!(container = %self.container, files = records.len(), "Gathered");
            formatter.records(&records);
            formatter.success(&format!("{} item(s)", records.len()));
            return Ok(());
        }

        let (channel, rx) = open_channel(&bridge)?;
        let records = bridge
            .gather(&self.container, Some(&channel))
            .await
            .map_err(bridge_error)?;
        formatter.records(&records);
        formatter.info("Watching for changes, press Ctrl-C to stop");

        finish(follow(&bridge, &channel, rx, formatter.as_ref()).await, formatter.as_ref())
    }
}
