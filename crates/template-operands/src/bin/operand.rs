/*
 * 5D Labs Agent Platform - Template Operands
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! One-shot reconcile or cleanup of the template operands.
//!
//! Each invocation performs a single pass and exits; re-running it is how
//! failures are retried.

// CLI binaries legitimately need println! for user output
#![allow(clippy::disallowed_macros)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use template_operands::{
    CommonTemplates, KubeStore, MemoryStore, OperandConfig, ResourceStore, StatusReport,
    TemplateValidator,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "template-operands")]
#[command(about = "Reconcile the common-templates and template-validator operands")]
#[command(version)]
struct Cli {
    /// Operand configuration file
    #[arg(short, long, env = "OPERAND_CONFIG", default_value = "/config/config.yaml")]
    config: PathBuf,

    /// Which operand to act on
    #[arg(short, long, value_enum, default_value_t = OperandSelection::All)]
    operand: OperandSelection,

    /// Run against an empty in-memory store instead of the cluster
    #[arg(long)]
    dry_run: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Create or update every owned object
    Reconcile,
    /// Delete every owned object
    Cleanup,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OperandSelection {
    CommonTemplates,
    TemplateValidator,
    All,
}

impl OperandSelection {
    fn common_templates(self) -> bool {
        matches!(self, Self::CommonTemplates | Self::All)
    }

    fn template_validator(self) -> bool {
        matches!(self, Self::TemplateValidator | Self::All)
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

fn load_config(path: &Path) -> Result<OperandConfig> {
    let config = match OperandConfig::from_file(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Failed to load configuration, using defaults: {}", e);
            OperandConfig::default()
        }
    }
    .with_env_overrides();

    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

fn print_report(operand: &str, report: &StatusReport) {
    for status in &report.statuses {
        println!("[{operand}] {status}");
    }
    if let Some(err) = &report.error {
        println!("[{operand}] aborted: {err}");
    }
}

async fn run<S: ResourceStore>(
    store: &S,
    config: &OperandConfig,
    command: Command,
    selection: OperandSelection,
) -> Result<()> {
    let common = CommonTemplates::new(config.clone());
    let validator = TemplateValidator::new(config.template_validator.clone());

    match command {
        Command::Reconcile => {
            let mut reports = Vec::new();
            if selection.common_templates() {
                // Bundle faults land here and end the process
                let report = common
                    .reconcile(store)
                    .await
                    .context("common-templates reconcile could not be planned")?;
                print_report(common.name(), &report);
                info!(
                    templates = common.bundled_template_names().len(),
                    "Common templates pass finished"
                );
                reports.push((common.name(), report));
            }
            if selection.template_validator() {
                let report = validator.reconcile(store).await?;
                print_report(validator.name(), &report);
                reports.push((validator.name(), report));
            }
            for (operand, report) in reports {
                report
                    .into_result()
                    .with_context(|| format!("{operand} reconcile failed"))?;
            }
        }
        Command::Cleanup => {
            if selection.template_validator() {
                validator
                    .cleanup(store)
                    .await
                    .context("template-validator cleanup failed")?;
            }
            if selection.common_templates() {
                common
                    .cleanup(store)
                    .await
                    .context("common-templates cleanup failed")?;
            }
            println!("Cleanup complete");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    info!(
        "Starting template operands v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = load_config(&cli.config)?;
    info!(
        version = %config.version,
        templates_namespace = %config.templates_namespace,
        "Configuration loaded"
    );

    let outcome = if cli.dry_run {
        let store = MemoryStore::new();
        run(&store, &config, cli.command, cli.operand).await
    } else {
        let client = kube::Client::try_default()
            .await
            .context("Failed to create Kubernetes client")?;
        run(&KubeStore::new(client), &config, cli.command, cli.operand).await
    };

    if let Err(e) = &outcome {
        error!("{:#}", e);
    }
    outcome
}
