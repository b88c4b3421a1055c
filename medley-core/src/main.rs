//! Medley engine - Main entry point
//!
//! Creates one engine instance from the process command line, runs the
//! main interface until it exits, then tears the instance down.
//!
//! The session bus is in-process, so `--one-instance` only coordinates
//! instances created inside this process. A second `medley` process always
//! starts its own primary.

use anyhow::{Context, Result};
use medley_core::{Collaborators, EngineInstance, ExitStatus, InitOutcome};
use std::ffi::OsString;
use tracing::{error, info};

fn run(argv: &[OsString]) -> Result<ExitStatus> {
    let mut instance = EngineInstance::create_default(Collaborators::new())
        .context("Failed to create engine instance")?;

    let outcome = match instance.init(argv) {
        Ok(outcome) => outcome,
        Err(e) => {
            let status = e.exit_status();
            error!("{}", e);
            instance.destroy();
            return Ok(status);
        }
    };

    if outcome == InitOutcome::Success {
        info!("Starting main interface");
        if let Err(e) = instance.add_interface(None, true, true, &[]) {
            error!("Main interface failed: {}", e);
        }
        instance.cleanup();
    }

    instance.destroy();
    Ok(outcome.exit_status())
}

fn main() {
    let argv: Vec<OsString> = std::env::args_os().collect();

    let status = match run(&argv) {
        Ok(status) => status,
        Err(e) => {
            eprintln!("medley: {:#}", e);
            ExitStatus::GenericFailure
        }
    };

    std::process::exit(status.code());
}
