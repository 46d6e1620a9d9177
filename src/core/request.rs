//! Package requests and closure filtering
//!
//! Package identifiers come back from the query as `[epoch:]name-version-release.arch`.
//! The epoch prefix is stripped before any comparison.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::config::settings::PackagesConfig;

/// Named package set of the configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageSet {
    /// Build-host only packages
    Build,
    /// Packages shipped in the image
    #[default]
    Runtime,
}

impl FromStr for PackageSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "build" => Ok(PackageSet::Build),
            "runtime" | "terra" => Ok(PackageSet::Runtime),
            other => Err(format!("unknown package set '{other}' (expected build or runtime)")),
        }
    }
}

impl fmt::Display for PackageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageSet::Build => write!(f, "build"),
            PackageSet::Runtime => write!(f, "runtime"),
        }
    }
}

/// Strip a numeric `N:` epoch prefix
pub fn strip_epoch(id: &str) -> &str {
    static EPOCH: OnceLock<Regex> = OnceLock::new();
    let epoch = EPOCH.get_or_init(|| Regex::new(r"^\d+:").expect("static regex"));
    match epoch.find(id) {
        Some(m) => &id[m.end()..],
        None => id,
    }
}

/// A set of requested packages and the filters for what they pull in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    /// Requested identifiers, epoch-stripped, sorted and deduplicated
    pub packages: BTreeSet<String>,
    /// Drop transitive packages starting with one of these
    pub exclude_prefix: Vec<String>,
    /// Drop transitive packages ending with one of these
    pub exclude_suffix: Vec<String>,
}

impl PackageRequest {
    /// Request the given identifiers without filters
    pub fn new<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            packages: packages
                .into_iter()
                .map(|p| strip_epoch(p.as_ref().trim()).to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            exclude_prefix: Vec::new(),
            exclude_suffix: Vec::new(),
        }
    }

    /// Build the request for `set` from configuration
    pub fn from_config(config: &PackagesConfig, set: PackageSet) -> Self {
        let ids = match set {
            PackageSet::Build => &config.build,
            PackageSet::Runtime => &config.runtime,
        };
        Self::new(ids)
            .with_exclude_prefix(config.exclude_prefix.clone())
            .with_exclude_suffix(config.exclude_suffix.clone())
    }

    /// Set the prefix filter
    #[must_use]
    pub fn with_exclude_prefix(mut self, prefixes: Vec<String>) -> Self {
        self.exclude_prefix = prefixes;
        self
    }

    /// Set the suffix filter
    #[must_use]
    pub fn with_exclude_suffix(mut self, suffixes: Vec<String>) -> Self {
        self.exclude_suffix = suffixes;
        self
    }

    /// Whether nothing is requested
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Whether `id` is one of the requested packages (by name or full identifier)
    pub fn is_requested(&self, id: &str) -> bool {
        let id = strip_epoch(id);
        self.packages.iter().any(|name| {
            id == name
                || id
                    .strip_prefix(name.as_str())
                    .and_then(|rest| rest.strip_prefix('-'))
                    .is_some_and(|version| version.starts_with(|c: char| c.is_ascii_digit()))
        })
    }

    /// Whether a transitively pulled `id` is dropped by the filters
    pub fn is_filtered(&self, id: &str) -> bool {
        let id = strip_epoch(id);
        if self.is_requested(id) {
            return false;
        }
        self.exclude_prefix.iter().any(|p| id.starts_with(p.as_str()))
            || self.exclude_suffix.iter().any(|s| id.ends_with(s.as_str()))
    }

    /// Normalise and filter a raw query result into a closure set
    pub fn filter_closure<I, S>(&self, raw: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter()
            .map(|id| strip_epoch(id.as_ref().trim()).to_string())
            .filter(|id| !id.is_empty())
            .filter(|id| {
                let dropped = self.is_filtered(id);
                if dropped {
                    tracing::debug!("Dropping transitive package {id}");
                }
                !dropped
            })
            .collect()
    }
}
