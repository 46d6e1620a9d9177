//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod cache;
pub mod classify;
pub mod resolve;

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::{Path, PathBuf};

use crate::cli::GlobalOptions;
use crate::config::defaults::DEFAULT_IMAGE_DIR;
use crate::config::settings::Settings;
use crate::core::classify::BuildProfile;
use crate::core::request::PackageSet;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Assemble a relocatable image
    Build {
        /// Build profile (debug keeps /usr/local and sbin)
        #[arg(short, long, default_value_t = BuildProfile::Release)]
        profile: BuildProfile,

        /// Keep an existing image and add only what is missing
        #[arg(long, conflicts_with = "fresh")]
        resume: bool,

        /// Move an existing image aside and start empty (default)
        #[arg(long)]
        fresh: bool,

        /// Replace destinations that already exist
        #[arg(long)]
        overwrite: bool,

        /// Image directory
        #[arg(short, long, default_value = DEFAULT_IMAGE_DIR)]
        dest: PathBuf,

        /// Package set to resolve
        #[arg(long, default_value_t = PackageSet::Runtime)]
        set: PackageSet,

        /// Read candidate paths from a file (one per line) instead of
        /// resolving packages
        #[arg(long, value_name = "FILE")]
        files_from: Option<PathBuf>,
    },

    /// Show how paths would be classified
    Classify {
        /// Absolute paths to classify
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Build profile
        #[arg(short, long, default_value_t = BuildProfile::Release)]
        profile: BuildProfile,
    },

    /// Resolve the package closure of a package set
    Resolve {
        /// Package set to resolve
        #[arg(long, default_value_t = PackageSet::Runtime)]
        set: PackageSet,

        /// Also list the files owned by the closure
        #[arg(long)]
        files: bool,
    },

    /// Manage the closure cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache information
    Info,

    /// Clear cache
    Clean,
}

impl Commands {
    /// Execute the command
    pub fn run(self, global: &GlobalOptions) -> Result<()> {
        match self {
            Self::Build {
                profile,
                resume,
                fresh: _,
                overwrite,
                dest,
                set,
                files_from,
            } => {
                let options = build::BuildOptions {
                    profile,
                    resume,
                    overwrite,
                    dest,
                    set,
                    files_from,
                };
                build::execute(global, options)
            }
            Self::Classify { paths, profile } => classify::execute(global, &paths, profile),
            Self::Resolve { set, files } => resolve::execute(global, set, files),
            Self::Cache { command } => match command {
                CacheCommands::Info => cache::execute_info(global),
                CacheCommands::Clean => cache::execute_clean(global),
            },
        }
    }
}

/// Load and validate the configuration file
pub(crate) fn load_settings(path: &Path) -> Result<Settings> {
    Settings::load(path).with_context(|| {
        format!(
            "Failed to load configuration from {} (use --config to point elsewhere)",
            path.display()
        )
    })
}
