// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use site_provisioning_core::domain::config::ProvisioningConfigManifest;

pub const MINIMAL_TEMPLATE: &str = include_str!("../../templates/config-minimal.yaml");
pub const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/config-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./provisioning-config.yaml")]
        output: PathBuf,

        /// Include every setting with comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(&output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = ProvisioningConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. PROVISIONING_CONFIG_PATH: {}",
            std::env::var("PROVISIONING_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./provisioning-config.yaml");
        println!("  4. ~/.provisioning/config.yaml");
        println!("  5. /etc/provisioning/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Tenant:".bold());
    println!("  ID: {}", spec.tenant.id);
    println!("  URL: {}", spec.tenant.url);
    println!("  Admin URL: {}", spec.tenant.admin_url);
    println!("  Provisioning site: {}", spec.tenant.provisioning_site_url);
    println!(
        "  Tracking list: {} ({})",
        spec.tracking.list_title, spec.tracking.status_field
    );
    println!();

    println!("{}", "Storage:".bold());
    println!("  Backend: {:?}", spec.storage.backend);
    println!(
        "  Blob root: {}",
        spec.storage
            .blob_root
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(in memory)".to_string())
    );
    println!("  Job files container: {}", spec.storage.job_files_container);
    println!("  Templates container: {}", spec.storage.template_files_container);
    println!();

    println!("{}", "Hosting:".bold());
    println!("  Base URL: {}", spec.hosting.base_url);
    println!(
        "  API key: {}",
        if spec.hosting.api_key.is_some() { "(set)" } else { "(not set)" }
    );
    println!("  Timeout: {}", humantime::format_duration(spec.hosting.timeout));
    println!();

    println!("{}", "Pipeline:".bold());
    println!("  Max delivery count: {}", spec.pipeline.max_delivery_count);
    println!("  Monitor deadline: {}", humantime::format_duration(spec.monitor.deadline));
    println!("  Poll interval: {}", humantime::format_duration(spec.monitor.poll_interval));
    println!("  Template cache TTL: {}", humantime::format_duration(spec.templates.cache_ttl));
    println!("  Template apply retries: {}", spec.templates.max_apply_retries);
    println!();

    println!("{}", "API:".bold());
    println!("  Listen: {}:{}", spec.api.bind_address, spec.api.port);
    match spec.observability.metrics_port {
        Some(port) => println!("  Metrics: {}", port),
        None => println!("  Metrics: {}", "(disabled)".dimmed()),
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = ProvisioningConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: &Path, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        EXAMPLES_TEMPLATE
    } else {
        MINIMAL_TEMPLATE
    };

    std::fs::write(output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
