//! Rebound CLI
//!
//! Assembles and runs programs against the built-in native routines.

use rebound_core::cli;

fn main() {
    if let Err(e) = cli::run_cli() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
