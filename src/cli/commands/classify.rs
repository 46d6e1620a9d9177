//! Classify command implementation
//!
//! Implements `portroot classify` to show, without touching any image, how
//! the configured rules treat a set of paths.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::cli::GlobalOptions;
use crate::core::candidate::FileClass;
use crate::core::classify::{BuildProfile, ClassificationPolicy, Verdict};
use crate::core::pipeline::inspect_format;
use crate::core::rules::ClassificationRuleSet;
use crate::infra::elf::ElfSniffer;

use super::load_settings;

/// One classified path
#[derive(Debug, Serialize)]
struct Classified {
    path: PathBuf,
    #[serde(flatten)]
    verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dest: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<FileClass>,
}

/// Execute the classify command
pub fn execute(global: &GlobalOptions, paths: &[PathBuf], profile: BuildProfile) -> Result<()> {
    let settings = load_settings(&global.config)?;
    let rules = ClassificationRuleSet::from_config(&settings.rules)
        .context("Invalid classification rules")?;
    let policy = ClassificationPolicy::new(rules, profile, &settings.image.loader);

    let results: Vec<Classified> = paths
        .iter()
        .map(|path| classify_one(&policy, path))
        .collect();

    if global.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for result in &results {
        let class = serde_json::to_value(result.verdict.class)?;
        let class = class.as_str().unwrap_or_default();
        let mut line = format!("{class:<18} {}", result.path.display());
        if let Some(dest) = &result.dest {
            line.push_str(&format!(" -> {}", dest.display()));
        }
        if let Some(rule) = result.verdict.rule {
            line.push_str(&format!(" [{rule}]"));
        }
        if let Some(reason) = result.verdict.reason {
            line.push_str(&format!(" ({reason})"));
        }
        println!("{line}");
    }

    Ok(())
}

fn classify_one(policy: &ClassificationPolicy, path: &Path) -> Classified {
    let text = path.to_string_lossy();
    let verdict = policy.classify(&text);
    let dest = if verdict.class.is_included() {
        policy.image_path(&text)
    } else {
        None
    };

    let pattern = verdict
        .rule
        .and_then(|id| policy.rules().get(id))
        .map(|rule| rule.pattern().to_string());

    Classified {
        path: path.to_path_buf(),
        verdict,
        pattern,
        dest,
        format: inspect_format(path, &ElfSniffer),
    }
}
