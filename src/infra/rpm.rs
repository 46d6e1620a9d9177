//! RPM package metadata queries
//!
//! `rpm -q` names the requested packages themselves, `repoquery` expands
//! their recursive requirements, and `rpm -ql` lists installed files.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::settings::{PackagesConfig, ToolsConfig};
use crate::core::closure::PackageQuery;
use crate::error::ToolError;
use crate::infra::process;

/// Query format producing `epoch:name-version-release.arch`
const QUERY_FORMAT: &str = "%{epoch}:%{name}-%{version}-%{release}.%{arch}\\n";

/// Package query backed by `rpm` and `repoquery`
#[derive(Debug, Clone)]
pub struct RpmQuery {
    rpm: PathBuf,
    repoquery: PathBuf,
    arches: String,
}

impl RpmQuery {
    /// Locate the tools, honouring configured paths
    pub fn locate(tools: &ToolsConfig, packages: &PackagesConfig) -> Result<Self, ToolError> {
        Ok(Self {
            rpm: process::locate("rpm", tools.rpm.as_deref())?,
            repoquery: process::locate("repoquery", tools.repoquery.as_deref())?,
            arches: packages.arches.clone(),
        })
    }

    /// Use explicit tool paths
    pub fn new(rpm: &Path, repoquery: &Path, arches: &str) -> Self {
        Self {
            rpm: rpm.to_path_buf(),
            repoquery: repoquery.to_path_buf(),
            arches: arches.to_string(),
        }
    }
}

impl PackageQuery for RpmQuery {
    fn closure(&self, packages: &BTreeSet<String>) -> Result<Vec<String>, ToolError> {
        let mut args = vec!["-q".to_string(), "--qf".to_string(), QUERY_FORMAT.to_string()];
        args.extend(packages.iter().cloned());
        let mut ids = parse_identifiers(&process::run(&self.rpm, &args)?);

        let mut args = vec![
            "--installed".to_string(),
            "--requires".to_string(),
            "--resolve".to_string(),
            "--recursive".to_string(),
            format!("--arch={}", self.arches),
            "--queryformat".to_string(),
            QUERY_FORMAT.to_string(),
        ];
        args.extend(packages.iter().cloned());
        ids.extend(parse_identifiers(&process::run(&self.repoquery, &args)?));

        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    fn files(&self, package: &str) -> Result<Vec<PathBuf>, ToolError> {
        let output = process::run(&self.rpm, &["-ql", package])?;
        Ok(parse_file_list(&output))
    }
}

/// Identifiers, one per line; `(none)` epochs are dropped
pub fn parse_identifiers(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| l.strip_prefix("(none):").unwrap_or(l).to_string())
        .collect()
}

/// Absolute paths from `rpm -ql` output; `(contains no files)` yields nothing
pub fn parse_file_list(output: &str) -> Vec<PathBuf> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with('/'))
        .map(PathBuf::from)
        .collect()
}
