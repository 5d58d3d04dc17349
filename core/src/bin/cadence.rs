//! Cadence CLI
//!
//! Runs and checks scripts from the command line. Script output goes to
//! stdout; diagnostics and logs go to stderr.

use cadence_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
