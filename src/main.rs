//! Portroot CLI - relocatable runtime image builder
//!
//! Entry point for the portroot command-line application.

use anyhow::Result;
use clap::Parser;

use portroot::cli::output::{display_error, init_logging};
use portroot::cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    // Run the command and handle errors
    match cli.run() {
        Ok(()) => Ok(()),
        Err(e) => {
            display_error(&e);
            std::process::exit(1);
        }
    }
}
