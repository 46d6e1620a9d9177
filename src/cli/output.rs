//! Output formatting and progress indicators
//!
//! This module provides utilities for logging setup, progress bars and
//! formatted messages to the user.

use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use crate::core::report::{Outcome, RunReport};

/// Install the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level follows `-v`/`-q`.
pub fn init_logging(verbose: u8, quiet: bool) {
    let default_level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("portroot={default_level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Create a spinner for operations with unknown duration
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.blue} {msg}")
            .expect("Invalid spinner template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Create a progress bar for candidate files
pub fn create_build_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} files ({msg})")
            .expect("Invalid progress bar template")
            .progress_chars("█▓▒░"),
    );
    pb
}

/// Print an error chain to stderr
pub fn display_error(error: &anyhow::Error) {
    eprintln!("{} {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
}

/// Print the human-readable form of a run report
pub fn print_report(report: &RunReport) {
    let summary = report.summary();

    if let Some(aside) = &report.moved_aside {
        println!("{} Previous tree moved to {}", status::INFO, aside.display());
    }

    for record in report.problems() {
        match &record.outcome {
            Outcome::Warned(reason) => {
                println!("{} {}: {reason}", status::WARNING, record.path.display());
            }
            Outcome::Failed(reason) => {
                println!("{} {}: {reason}", status::ERROR, record.path.display());
            }
            Outcome::Included | Outcome::Excluded(_) => {}
        }
    }

    for rule in report.unused_exclusions() {
        println!(
            "{} Unused exclusion rule {} '{}'",
            status::WARNING,
            rule.id,
            rule.pattern
        );
    }

    if let Some(loader) = &report.loader {
        println!("{} Dynamic loader: {}", status::INFO, loader.display());
    }

    let prefix = if summary.failed > 0 {
        status::ERROR
    } else {
        status::SUCCESS
    };
    println!("{prefix} {summary}");
    println!("  Image: {} ({} writes)", report.root.display(), report.writes);
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}
