//! Explicit classification rules
//!
//! Three ordered rule lists (`must-copy`, `must-patch`, `must-exclude`) are
//! compiled once from configuration and never change afterwards. Matching is
//! side-effect free; usage is tallied separately in [`RuleUsage`] so unused
//! rules can be reported and pruned.

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::config::settings::RulesConfig;
use crate::core::classify::BuildProfile;
use crate::error::ConfigError;

/// Variant of the exclusion list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExcludeScope {
    /// Applied to every profile
    Common,
    /// Applied to debug images only
    Debug,
    /// Applied to release images only
    Release,
}

/// Which list a rule belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    /// Copy verbatim
    MustCopy,
    /// Copy and relocate
    MustPatch,
    /// Sweep out after assembly
    MustExclude(ExcludeScope),
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::MustCopy => write!(f, "must-copy"),
            RuleKind::MustPatch => write!(f, "must-patch"),
            RuleKind::MustExclude(ExcludeScope::Common) => write!(f, "must-exclude.common"),
            RuleKind::MustExclude(ExcludeScope::Debug) => write!(f, "must-exclude.debug"),
            RuleKind::MustExclude(ExcludeScope::Release) => write!(f, "must-exclude.release"),
        }
    }
}

/// Position of a rule in its list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RuleId {
    /// Owning list
    pub kind: RuleKind,
    /// Zero-based index in the list
    pub index: usize,
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.index)
    }
}

/// A compiled pattern; matches only the whole path
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: String,
    regex: Regex,
}

impl Rule {
    /// Compile `pattern` anchored at both ends
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Pattern as written in the configuration
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether the rule matches `path`
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

/// All explicit rules of a run
#[derive(Debug, Clone, Default)]
pub struct ClassificationRuleSet {
    must_copy: Vec<Rule>,
    must_patch: Vec<Rule>,
    exclude_common: Vec<Rule>,
    exclude_debug: Vec<Rule>,
    exclude_release: Vec<Rule>,
}

impl ClassificationRuleSet {
    /// Compile every list, failing on the first invalid pattern
    pub fn from_config(config: &RulesConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            must_copy: compile_list(RuleKind::MustCopy, &config.must_copy)?,
            must_patch: compile_list(RuleKind::MustPatch, &config.must_patch)?,
            exclude_common: compile_list(
                RuleKind::MustExclude(ExcludeScope::Common),
                &config.must_exclude.common,
            )?,
            exclude_debug: compile_list(
                RuleKind::MustExclude(ExcludeScope::Debug),
                &config.must_exclude.debug,
            )?,
            exclude_release: compile_list(
                RuleKind::MustExclude(ExcludeScope::Release),
                &config.must_exclude.release,
            )?,
        })
    }

    fn list(&self, kind: RuleKind) -> &[Rule] {
        match kind {
            RuleKind::MustCopy => &self.must_copy,
            RuleKind::MustPatch => &self.must_patch,
            RuleKind::MustExclude(ExcludeScope::Common) => &self.exclude_common,
            RuleKind::MustExclude(ExcludeScope::Debug) => &self.exclude_debug,
            RuleKind::MustExclude(ExcludeScope::Release) => &self.exclude_release,
        }
    }

    /// First rule of `kind` matching `path`
    pub fn first_match(&self, kind: RuleKind, path: &str) -> Option<RuleId> {
        self.list(kind)
            .iter()
            .position(|rule| rule.matches(path))
            .map(|index| RuleId { kind, index })
    }

    /// First exclusion rule matching `path` in `common` or the profile's own list
    pub fn exclusion_match(&self, path: &str, profile: BuildProfile) -> Option<RuleId> {
        self.first_match(RuleKind::MustExclude(ExcludeScope::Common), path)
            .or_else(|| self.first_match(RuleKind::MustExclude(profile.exclude_scope()), path))
    }

    /// Look up a rule by id
    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.list(id.kind).get(id.index)
    }

    /// Rule kinds that are evaluated for `profile`
    pub fn active_kinds(profile: BuildProfile) -> [RuleKind; 4] {
        [
            RuleKind::MustCopy,
            RuleKind::MustPatch,
            RuleKind::MustExclude(ExcludeScope::Common),
            RuleKind::MustExclude(profile.exclude_scope()),
        ]
    }

    /// Iterate the rules of `kind` with their ids
    pub fn rules(&self, kind: RuleKind) -> impl Iterator<Item = (RuleId, &Rule)> {
        self.list(kind)
            .iter()
            .enumerate()
            .map(move |(index, rule)| (RuleId { kind, index }, rule))
    }
}

fn compile_list(kind: RuleKind, patterns: &[String]) -> Result<Vec<Rule>, ConfigError> {
    patterns
        .iter()
        .enumerate()
        .map(|(index, pattern)| {
            Rule::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                list: kind.to_string(),
                index,
                pattern: pattern.clone(),
                error: e.to_string(),
            })
        })
        .collect()
}

/// A rule that never fired during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnusedRule {
    /// Rule position
    pub id: RuleId,
    /// Pattern text
    pub pattern: String,
}

/// Hit counters, one per rule that fired
#[derive(Debug, Clone, Default)]
pub struct RuleUsage {
    hits: HashMap<RuleId, u64>,
}

impl RuleUsage {
    /// Create an empty tally
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one hit of `id`
    pub fn record(&mut self, id: RuleId) {
        *self.hits.entry(id).or_insert(0) += 1;
    }

    /// Number of hits of `id`
    pub fn hits(&self, id: RuleId) -> u64 {
        self.hits.get(&id).copied().unwrap_or(0)
    }

    /// Rules evaluated under `profile` that never matched, in list order
    pub fn unused(&self, rules: &ClassificationRuleSet, profile: BuildProfile) -> Vec<UnusedRule> {
        ClassificationRuleSet::active_kinds(profile)
            .into_iter()
            .flat_map(|kind| rules.rules(kind))
            .filter(|(id, _)| self.hits(*id) == 0)
            .map(|(id, rule)| UnusedRule {
                id,
                pattern: rule.pattern().to_string(),
            })
            .collect()
    }
}
