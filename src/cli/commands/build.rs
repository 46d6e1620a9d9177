//! Build command implementation
//!
//! Implements `portroot build`: resolve the candidate files, classify,
//! relocate and place them, then sweep the finished tree.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::output::{create_build_bar, create_spinner, print_report};
use crate::cli::GlobalOptions;
use crate::core::classify::{BuildProfile, ClassificationPolicy};
use crate::core::pipeline::ImageBuilder;
use crate::core::relocate::{BinaryEditor, RelocationEngine};
use crate::core::report::RunReport;
use crate::core::request::PackageSet;
use crate::core::rules::ClassificationRuleSet;
use crate::error::PortrootError;
use crate::infra::elf::ElfSniffer;
use crate::infra::patchelf::Patchelf;
use crate::infra::tree::{TreeAssembler, TreeMode};

use super::load_settings;
use super::resolve::{request_for, resolver};

/// Build options
pub struct BuildOptions {
    /// Build profile
    pub profile: BuildProfile,
    /// Keep an existing image
    pub resume: bool,
    /// Replace existing destinations
    pub overwrite: bool,
    /// Image directory
    pub dest: PathBuf,
    /// Package set to resolve
    pub set: PackageSet,
    /// Explicit candidate list, bypassing package resolution
    pub files_from: Option<PathBuf>,
}

/// Execute the build command
pub fn execute(global: &GlobalOptions, options: BuildOptions) -> Result<()> {
    let settings = load_settings(&global.config)?;
    let rules = ClassificationRuleSet::from_config(&settings.rules)
        .context("Invalid classification rules")?;

    // Resolve before touching the tree, so a failed query leaves it alone
    let mut closure_cached = false;
    let mut manifest_cached = false;
    let paths: Vec<PathBuf> = if let Some(list) = &options.files_from {
        read_path_list(list)?
    } else {
        let request = request_for(&settings, options.set)?;
        let resolver = resolver(&settings)?;
        let spinner = (!global.quiet && !global.json)
            .then(|| create_spinner(&format!("Resolving {} packages...", options.set)));

        let closure = resolver
            .resolve_closure(&request)
            .with_context(|| format!("Failed to resolve the {} closure", options.set))?;
        let manifest = resolver
            .resolve_manifest(&closure)
            .context("Failed to list files of the closure")?;

        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
        closure_cached = closure.cached;
        manifest_cached = manifest.cached;
        manifest.files.into_iter().collect()
    };

    let editor = Patchelf::locate(&settings.tools).context("Relocation needs patchelf")?;
    let engine = RelocationEngine::new(editor, &settings.image)?;
    let policy = ClassificationPolicy::new(rules, options.profile, &settings.image.loader);
    let mode = if options.resume {
        TreeMode::Resume
    } else {
        TreeMode::Fresh
    };
    let tree = TreeAssembler::open(&options.dest, mode, options.overwrite)
        .with_context(|| format!("Failed to prepare {}", options.dest.display()))?;

    let mut builder = ImageBuilder::new(policy, engine, tree, Box::new(ElfSniffer));
    builder.report_mut().closure_cached = closure_cached;
    builder.report_mut().manifest_cached = manifest_cached;

    tracing::info!(
        "Assembling {} candidates into {} ({} profile)",
        paths.len(),
        options.dest.display(),
        options.profile
    );

    let result = assemble(&mut builder, &paths, global);
    emit(builder.report(), global)?;
    result.context("Image build aborted")
}

fn assemble<E>(
    builder: &mut ImageBuilder<E>,
    paths: &[PathBuf],
    global: &GlobalOptions,
) -> Result<(), PortrootError>
where
    E: BinaryEditor,
{
    let bar = (!global.quiet && !global.json).then(|| create_build_bar(paths.len() as u64));

    for path in paths {
        if let Some(bar) = &bar {
            bar.set_message(
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );
        }
        let added = builder.add_path(path);
        if let Some(bar) = &bar {
            bar.inc(1);
        }
        if let Err(e) = added {
            if let Some(bar) = &bar {
                bar.abandon();
            }
            return Err(e);
        }
    }

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    builder.finish()?;
    Ok(())
}

fn emit(report: &RunReport, global: &GlobalOptions) -> Result<()> {
    if global.json {
        println!("{}", report.to_json()?);
    } else if !global.quiet {
        print_report(report);
    }
    Ok(())
}

/// Absolute paths, one per line; blank lines and `#` comments are ignored
fn read_path_list(path: &Path) -> Result<Vec<PathBuf>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file list {}", path.display()))?;
    Ok(parse_path_list(&content))
}

fn parse_path_list(content: &str) -> Vec<PathBuf> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(PathBuf::from)
        .collect()
}
