//! hadron command-line client.
//!
//! Usage:
//!   # Local filesystem (default)
//!   hadron ls /tmp
//!   hadron put ./report.csv /tmp/report.csv --replication 2
//!
//!   # Configured default filesystem
//!   hadron --host default --config site.toml stat /data
//!
//! Set `RUST_LOG=hadron_fs=debug` to trace backend calls.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use hadron_fs::{Configuration, ConnectParams, FileSystem, LocalConnector};

use crate::commands::Command;

/// Client for hadron filesystems.
#[derive(Parser, Debug)]
#[command(name = "hadron")]
#[command(about = "POSIX-style access to distributed filesystems")]
struct Args {
    /// Namenode host; empty for the local filesystem, "default" for fs.defaultFS
    #[arg(long, default_value = "", global = true)]
    host: String,

    /// Namenode port
    #[arg(long, default_value_t = 0, global = true)]
    port: u16,

    /// Act as this user
    #[arg(long, global = true)]
    user: Option<String>,

    /// TOML file of configuration properties
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    fn connect_params(&self) -> ConnectParams {
        let params = ConnectParams::new(self.host.clone(), self.port);
        match &self.user {
            Some(user) => params.with_user(user.clone()),
            None => params,
        }
    }

    fn configuration(&self) -> Result<Configuration> {
        match &self.config {
            Some(path) => Configuration::load(path)
                .with_context(|| format!("loading configuration from {}", path.display())),
            None => Ok(Configuration::new()),
        }
    }
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let conf = args.configuration()?;
    let fs = FileSystem::connect(args.connect_params(), conf, &LocalConnector::new())
        .context("connecting to filesystem")?;

    let result = commands::run(&fs, args.command, &mut std::io::stdout().lock());
    if let Err(e) = fs.close() {
        tracing::warn!(error = %e, "failed to close filesystem");
    }
    result
}
