//! filedex CLI: scan a directory tree into a content-addressed index.

use std::time::Instant;

use anyhow::{Result, bail};
use clap::Parser;

use filedex::cli::{Cli, Commands, build_scan_run};
use filedex::logging;

fn main() {
    let cli = Cli::parse();
    logging::setup_logging(cli.common.verbose);

    if let Err(e) = run(cli) {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let _cancel_requested = install_ctrlc_handler()?;

    let start_time = Instant::now();
    match cli.command {
        Commands::Scan(args) => {
            let scan_run = build_scan_run(args)?;
            let summary = filedex::coordinator::run(&scan_run)?;
            log::debug!("total time: {:?}", start_time.elapsed());
            log::debug!("{summary:?}");
        }
        Commands::Index(_) => bail!("the `index` sub-command is not implemented by this build"),
        Commands::Web(_) => bail!("the `web` sub-command is not implemented by this build"),
        Commands::ExecScript(_) => {
            bail!("the `exec-script` sub-command is not implemented by this build")
        }
    }

    Ok(())
}

/// Installs a Ctrl+C handler so a future cancellable scan loop has a flag to poll; a scan that's
/// already in flight when the signal arrives still runs to completion since the coordinator does
/// not yet check this flag mid-walk.
fn install_ctrlc_handler() -> Result<std::sync::Arc<std::sync::atomic::AtomicBool>> {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    let cancel_requested = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel_requested);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    })?;
    Ok(cancel_requested)
}
