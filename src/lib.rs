pub mod cli;
pub mod config;
pub mod error;
pub mod inventory;
pub mod provisioner;
pub mod vsphere;

pub use error::ProvisionError;

use std::io::Write;

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::Shell;
use tracing::info;
use tracing_subscriber::{FmtSubscriber, filter::LevelFilter};

use crate::config::{Endpoint, VmRequest};
use crate::inventory::InventoryClient;
use crate::provisioner::ProvisionReport;

pub fn init_logging(log_level: cli::LogLevel) -> Result<()> {
    let filter = match log_level {
        cli::LogLevel::Trace => LevelFilter::TRACE,
        cli::LogLevel::Debug => LevelFilter::DEBUG,
        cli::LogLevel::Info => LevelFilter::INFO,
        cli::LogLevel::Warn => LevelFilter::WARN,
        cli::LogLevel::Error => LevelFilter::ERROR,
    };

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_max_level(filter)
            .with_writer(std::io::stderr)
            .finish(),
    )
    .context("failed to set global default tracing subscriber")
}

/// Writes a completion script for `shell` to `out`.
pub fn write_completions(shell: Shell, out: &mut dyn Write) {
    let mut cmd = cli::Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, out);
}

/// Builds the request from the optional profile file and the flags.
pub fn build_request(opts: &cli::Cli) -> Result<VmRequest, ProvisionError> {
    let base = match opts.profile.as_deref() {
        Some(path) => config::load_profile(path)?,
        None => config::Profile::default(),
    };
    Ok(opts.to_profile().merge(base).into_request())
}

/// Provisions the VM described by `opts` through `client`.
pub fn run_provision<C: InventoryClient>(opts: &cli::Cli, client: C) -> Result<ProvisionReport> {
    let request = build_request(opts).context("failed to build VM request")?;
    let endpoint = Endpoint::parse(opts.url.as_deref().unwrap_or_default(), opts.insecure)?;
    info!("provisioning virtual machine {} on {}", request.name, endpoint);

    let report = provisioner::run(client, &endpoint, &request)?;
    for skipped in &report.skipped {
        tracing::warn!("skipped: {}", skipped);
    }
    Ok(report)
}
