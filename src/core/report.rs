//! Run report
//!
//! Every candidate path ends in exactly one [`Outcome`]. Outcomes are
//! collected instead of printed so the caller decides how to present them
//! (human summary or JSON).

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::core::candidate::FileClass;
use crate::core::classify::{BuildProfile, Classification, ExcludeReason};
use crate::core::rules::{RuleId, RuleKind, UnusedRule};

/// What happened to one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "kebab-case")]
pub enum Outcome {
    /// Placed in the tree (or already present)
    Included,
    /// Rejected by classification
    Excluded(Option<ExcludeReason>),
    /// Degraded but the run continues
    Warned(String),
    /// Fatal for this file; the run stops
    Failed(String),
}

impl Outcome {
    /// Short label used in summaries
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Included => "included",
            Outcome::Excluded(_) => "excluded",
            Outcome::Warned(_) => "warned",
            Outcome::Failed(_) => "failed",
        }
    }
}

/// One candidate path and its fate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// Absolute source path
    pub path: PathBuf,
    /// Destination relative to the image root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<PathBuf>,
    /// Classification decision
    pub class: Classification,
    /// Explicit rule that decided, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<RuleId>,
    /// Detected format, when the file was inspected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<FileClass>,
    /// Search path written into the binary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runpath: Option<String>,
    /// Result
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Aggregated result of one build
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Profile the image was built for
    pub profile: BuildProfile,
    /// Image root
    pub root: PathBuf,
    /// Previous tree location, when it was moved aside
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moved_aside: Option<PathBuf>,
    /// Closure came from the cache
    pub closure_cached: bool,
    /// Manifest came from the cache
    pub manifest_cached: bool,
    /// Per-file records, in processing order
    pub files: Vec<FileRecord>,
    /// Paths removed by the exclusion sweep
    pub swept: Vec<PathBuf>,
    /// Broken symlinks removed after the sweep
    pub broken_symlinks: Vec<PathBuf>,
    /// Rules that never matched
    pub unused_rules: Vec<UnusedRule>,
    /// Dynamic loader propagated into the image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loader: Option<PathBuf>,
    /// Filesystem writes performed on the tree
    pub writes: u64,
}

/// Outcome counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub included: usize,
    pub excluded: usize,
    pub warned: usize,
    pub failed: usize,
    pub swept: usize,
    pub broken_symlinks: usize,
}

impl RunReport {
    /// Empty report for a build of `root`
    pub fn new(root: PathBuf, profile: BuildProfile) -> Self {
        Self {
            root,
            profile,
            ..Self::default()
        }
    }

    /// Append a record
    pub fn record(&mut self, record: FileRecord) {
        self.files.push(record);
    }

    /// Count outcomes
    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            swept: self.swept.len(),
            broken_symlinks: self.broken_symlinks.len(),
            ..Summary::default()
        };
        for record in &self.files {
            match record.outcome {
                Outcome::Included => summary.included += 1,
                Outcome::Excluded(_) => summary.excluded += 1,
                Outcome::Warned(_) => summary.warned += 1,
                Outcome::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }

    /// Records with a warning or failure
    pub fn problems(&self) -> impl Iterator<Item = &FileRecord> {
        self.files
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Warned(_) | Outcome::Failed(_)))
    }

    /// Unused exclusion rules; candidates for pruning
    pub fn unused_exclusions(&self) -> impl Iterator<Item = &UnusedRule> {
        self.unused_rules
            .iter()
            .filter(|r| matches!(r.id.kind, RuleKind::MustExclude(_)))
    }

    /// Pretty JSON rendering
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} included, {} excluded, {} warnings, {} failed; swept {} paths and {} broken symlinks",
            self.included, self.excluded, self.warned, self.failed, self.swept, self.broken_symlinks
        )
    }
}
