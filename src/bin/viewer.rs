/*
 * Flock Viewer
 *
 * Windowed front end. Takes the same flags as the headless binary; as a
 * primary it simulates and serves replicas, as a replica it mirrors a
 * remote primary.
 */

use std::process::ExitCode;

use clap::Parser;

use mirrored_flock::cli::{init_tracing, CliArgs};
use mirrored_flock::viewer;

fn main() -> ExitCode {
    init_tracing();
    let args = CliArgs::parse();

    let result = args.resolve().and_then(|config| viewer::run(&config));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "viewer failed to start");
            ExitCode::FAILURE
        }
    }
}
