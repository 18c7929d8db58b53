use std::process;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use vcprovision::cli::Cli;
use vcprovision::vsphere::VsphereClient;

fn main() -> Result<()> {
    let args = Cli::parse();

    if let Some(shell) = args.completions {
        vcprovision::write_completions(shell, &mut std::io::stdout());
        return Ok(());
    }

    vcprovision::init_logging(args.log_level)?;

    match vcprovision::run_provision(&args, VsphereClient::new()) {
        Ok(report) => {
            info!(
                "virtual machine {} ready: {} upload(s), {} device(s) attached",
                report.vm,
                report.uploads.len(),
                report.attached.len()
            );
        }
        Err(e) => {
            error!("{:#}", e);
            process::exit(1);
        }
    }

    Ok(())
}
