// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! # Site Provisioning CLI
//!
//! The `provisioner` binary hosts the provisioning pipeline.
//!
//! ## Commands
//!
//! - `provisioner serve` - Run the pipeline, the monitor scheduler and the HTTP API
//! - `provisioner config show|validate|generate` - Configuration management

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use site_provisioning::commands::{self, ConfigCommand};
use site_provisioning::daemon;
use site_provisioning::logging::{init_logging, LogFormat};
use site_provisioning_core::domain::config::ProvisioningConfigManifest;

/// Site provisioning host
#[derive(Parser)]
#[command(name = "provisioner")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "PROVISIONING_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true, env = "PROVISIONING_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the provisioning pipeline and HTTP API
    #[command(name = "serve")]
    Serve {
        /// HTTP API port (overrides spec.api.port)
        #[arg(long, env = "PROVISIONING_PORT")]
        port: Option<u16>,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port }) => {
            let mut config = ProvisioningConfigManifest::load_or_default(cli.config)?;
            if let Some(port) = port {
                config.spec.api.port = port;
            }
            let level = cli
                .log_level
                .unwrap_or_else(|| config.spec.observability.log_level.clone());
            init_logging(&level, LogFormat::parse(&config.spec.observability.log_format))?;

            info!("Starting site provisioning host");
            daemon::run_server(config).await
        }
        Some(Commands::Config { command }) => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), LogFormat::Text)?;
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}
