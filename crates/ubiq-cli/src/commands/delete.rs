//! Delete and move commands - Coordinated single-shot mutations

use anyhow::Result;
use clap::Args;

use super::{bridge_error, build_bridge, CliContext};
use crate::output::get_formatter;

/// Delete items from a container
#[derive(Debug, Args)]
pub struct DeleteCommand {
    /// Container identifier
    pub container: String,

    /// Item names relative to the container root, deleted in order
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<String>,
}

impl DeleteCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = get_formatter(ctx.json());
        let bridge = build_bridge(&ctx.config);

        bridge
            .delete(&self.container, &self.paths)
            .await
            .map_err(bridge_error)?;

        if ctx.json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "deleted": self.paths,
            }));
        } else {
            formatter.success(&format!("Deleted {} item(s)", self.paths.len()));
        }
        Ok(())
    }
}

/// Move an item within a container
#[derive(Debug, Args)]
pub struct MoveCommand {
    /// Container identifier
    pub container: String,

    /// Current name relative to the container root
    pub from: String,

    /// New name relative to the container root
    pub to: String,
}

impl MoveCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = get_formatter(ctx.json());
        let bridge = build_bridge(&ctx.config);

        bridge
            .move_item(&self.container, &self.from, &self.to)
            .await
            .map_err(bridge_error)?;
        formatter.success(&format!("Moved {} to {}", self.from, self.to));
        Ok(())
    }
}
