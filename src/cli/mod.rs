//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! It contains no business logic - that belongs in the [`crate::core`] module.

pub mod commands;
pub mod output;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::config::defaults::CONFIG_FILE_NAME;
use commands::Commands;

/// Version string with the git revision the binary was built from
const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("VERGEN_GIT_SHA"), ")");

/// Portroot - relocatable runtime image builder
///
/// Copies a dynamically linked program stack into a directory tree that can be
/// moved anywhere and still run.
#[derive(Parser, Debug)]
#[command(name = "portroot")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration file
    #[arg(short, long, global = true, env = "PORTROOT_CONFIG", default_value = CONFIG_FILE_NAME)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Options shared by every command
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    /// Configuration file
    pub config: PathBuf,
    /// Emit JSON instead of human-readable output
    pub json: bool,
    /// Suppress progress output
    pub quiet: bool,
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let global = GlobalOptions {
            config: self.config,
            json: self.json,
            quiet: self.quiet,
        };

        if let Some(cmd) = self.command {
            cmd.run(&global)
        } else {
            // No subcommand provided, show help
            use clap::CommandFactory;
            let mut cmd = Self::command();
            cmd.print_help()?;
            Ok(())
        }
    }
}
