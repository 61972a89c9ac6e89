//! `lmd` entry point.
//!
//! Parses arguments, installs the stderr log subscriber and runs the single document
//! command. Failures are printed with context and suggestions and exit with status 1.

use anyhow::Result;
use clap::Parser;
use legal_md::cli::Cli;
use legal_md::core::user_friendly_error;

fn main() -> Result<()> {
    let cli = Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    cli.init_logging();

    match cli.execute() {
        Ok(()) => Ok(()),
        Err(e) => {
            user_friendly_error(e).display();
            std::process::exit(1);
        }
    }
}
