//! Resolve command implementation
//!
//! Implements `portroot resolve` to show the package closure (and optionally
//! the file manifest) of a configured package set.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::cli::output::create_spinner;
use crate::cli::GlobalOptions;
use crate::config::settings::Settings;
use crate::core::cache::ClosureCache;
use crate::core::closure::{ClosureResolver, PackageDatabase};
use crate::core::request::{PackageRequest, PackageSet};
use crate::infra::dirs::PortrootDirs;
use crate::infra::rpm::RpmQuery;

use super::load_settings;

/// JSON shape of `portroot resolve`
#[derive(Debug, Serialize)]
struct ResolveOutput<'a> {
    set: PackageSet,
    cached: bool,
    packages: &'a BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<&'a BTreeSet<PathBuf>>,
}

/// Build the request for `set`, refusing an empty one
pub(crate) fn request_for(settings: &Settings, set: PackageSet) -> Result<PackageRequest> {
    let request = PackageRequest::from_config(&settings.packages, set);
    if request.is_empty() {
        bail!("No packages configured in [packages] {set}");
    }
    Ok(request)
}

/// Resolver over the host package database
pub(crate) fn resolver(settings: &Settings) -> Result<ClosureResolver<RpmQuery>> {
    let query = RpmQuery::locate(&settings.tools, &settings.packages)
        .context("Package queries need rpm and repoquery")?;
    let database = PackageDatabase::snapshot(&settings.packages.database)?;
    let cache = ClosureCache::new(PortrootDirs::new().closure_cache_dir());
    Ok(ClosureResolver::new(query, database, cache))
}

/// Execute the resolve command
pub fn execute(global: &GlobalOptions, set: PackageSet, files: bool) -> Result<()> {
    let settings = load_settings(&global.config)?;
    let request = request_for(&settings, set)?;
    let resolver = resolver(&settings)?;

    let spinner = (!global.quiet && !global.json)
        .then(|| create_spinner(&format!("Resolving {set} packages...")));

    let closure = resolver
        .resolve_closure(&request)
        .with_context(|| format!("Failed to resolve the {set} closure"))?;
    let manifest = if files {
        Some(
            resolver
                .resolve_manifest(&closure)
                .context("Failed to list files of the closure")?,
        )
    } else {
        None
    };

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    if global.json {
        let output = ResolveOutput {
            set,
            cached: closure.cached,
            packages: &closure.packages,
            files: manifest.as_ref().map(|m| &m.files),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for package in &closure.packages {
        println!("{package}");
    }
    if let Some(manifest) = &manifest {
        for file in &manifest.files {
            println!("{}", file.display());
        }
    }

    if !global.quiet {
        let source = if closure.cached { "cache" } else { "query" };
        eprintln!(
            "{} packages in the {set} closure (from {source})",
            closure.packages.len()
        );
    }

    Ok(())
}
