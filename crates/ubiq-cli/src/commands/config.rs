//! Config command - View and check UbiqBridge configuration
//!
//! Provides the `ubiq config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Validates the configuration file and reports errors

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;
use ubiq_core::config::Config;

use super::CliContext;
use crate::output::get_formatter;

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx),
            ConfigCommand::Validate => self.execute_validate(ctx),
        }
    }

    fn execute_show(&self, ctx: &CliContext) -> Result<()> {
        let formatter = get_formatter(ctx.json());
        info!(config_path = %ctx.config_path.display(), "Showing configuration");

        if ctx.json() {
            let json = serde_json::to_value(&ctx.config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
            formatter.info("");
            let yaml = serde_yaml::to_string(&ctx.config)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }
        Ok(())
    }

    fn execute_validate(&self, ctx: &CliContext) -> Result<()> {
        let formatter = get_formatter(ctx.json());

        // Load explicitly: a missing or unparsable file is itself a finding.
        let config = match Config::load(&ctx.config_path) {
            Ok(config) => config,
            Err(e) => {
                let message = format!(
                    "Cannot load {}: {e:#}",
                    ctx.config_path.display()
                );
                if ctx.json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": ctx.config_path.display().to_string(),
                        "errors": [message],
                    }));
                } else {
                    formatter.error(&message);
                }
                return Ok(());
            }
        };

        let errors = config.validate();
        if ctx.json() {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": ctx.config_path.display().to_string(),
                "errors": messages,
            }));
        } else if errors.is_empty() {
            formatter.success(&format!("{} is valid", ctx.config_path.display()));
        } else {
            formatter.error(&format!("{} error(s) found", errors.len()));
            for error in &errors {
                formatter.info(&error.to_string());
            }
        }
        Ok(())
    }
}
