// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use menu_admin::config::load_env_file;
use menu_admin::{AppConfig, Server};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "menu-admin")]
#[command(version = VERSION)]
#[command(about = "Admin backend for the restaurant menu site.")]
struct Cli {
    /// Environment file loaded before reading configuration
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind (overrides BIND_ADDRESS)
    #[arg(long)]
    bind: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing env file is normal; a malformed one stops startup.
    let env_loaded = load_env_file(&cli.env_file)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if env_loaded {
        tracing::info!("Loaded environment from {}", cli.env_file.display());
    }

    let mut config = AppConfig::from_env()?;
    if let Some(port) = cli.port {
        config = config.with_port(port);
    }
    if let Some(bind) = cli.bind {
        config = config.with_bind_address(bind);
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    runtime.block_on(Server::new(config).start())
}
