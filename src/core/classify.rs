//! Classification policy
//!
//! Decides, per candidate path, whether it is copied verbatim, copied and
//! relocated, or left out of the image. Evaluation order (first match wins):
//!
//! 1. debug/test sentinel substrings exclude outright
//! 2. `must-copy` rules
//! 3. `must-patch` rules
//! 4. the host dynamic loader is excluded (the relocation engine places it)
//! 5. structural layout rules
//!
//! `must-exclude` rules are not consulted here; they run as a sweep over the
//! assembled tree (see [`crate::infra::tree`]).

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::defaults::DEBUG_SENTINELS;
use crate::core::rules::{ClassificationRuleSet, ExcludeScope, RuleId, RuleKind};

/// Image flavour; relaxes structural rules and selects exclusion variants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildProfile {
    /// Developer image: keeps `/usr/local` content and `sbin`
    Debug,
    /// Shipping image
    #[default]
    Release,
}

impl BuildProfile {
    /// Exclusion list applied on top of `common`
    pub fn exclude_scope(self) -> ExcludeScope {
        match self {
            BuildProfile::Debug => ExcludeScope::Debug,
            BuildProfile::Release => ExcludeScope::Release,
        }
    }

    /// Whether this is the debug profile
    pub fn is_debug(self) -> bool {
        self == BuildProfile::Debug
    }
}

impl FromStr for BuildProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(BuildProfile::Debug),
            "release" => Ok(BuildProfile::Release),
            other => Err(format!("unknown profile '{other}' (expected debug or release)")),
        }
    }
}

impl fmt::Display for BuildProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildProfile::Debug => write!(f, "debug"),
            BuildProfile::Release => write!(f, "release"),
        }
    }
}

/// Decision for one path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    /// Explicit rule: copy verbatim
    MustCopy,
    /// Explicit rule: copy and relocate
    MustPatch,
    /// Accepted by the layout rules
    StructuralInclude,
    /// Rejected
    StructuralExclude,
}

impl Classification {
    /// Whether the path enters the image
    pub fn is_included(self) -> bool {
        self != Classification::StructuralExclude
    }

    /// Whether an explicit rule decided
    pub fn is_explicit(self) -> bool {
        matches!(self, Classification::MustCopy | Classification::MustPatch)
    }
}

/// Why a path was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExcludeReason {
    /// Contains a debug/test sentinel
    DebugSentinel,
    /// Is the host dynamic loader
    DynamicLoader,
    /// Not an absolute path
    NotAbsolute,
    /// Outside `lib`, `lib64` and `bin/bash` (plus `sbin` in debug)
    OutsideLayout,
    /// Locale data or build-id links
    LocaleOrBuildId,
}

impl fmt::Display for ExcludeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExcludeReason::DebugSentinel => "debug/test payload",
            ExcludeReason::DynamicLoader => "dynamic loader is placed separately",
            ExcludeReason::NotAbsolute => "not an absolute path",
            ExcludeReason::OutsideLayout => "outside library layout",
            ExcludeReason::LocaleOrBuildId => "locale or build-id entry",
        };
        f.write_str(text)
    }
}

/// Result of classifying one path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    /// The decision
    pub class: Classification,
    /// Explicit rule that decided, if any
    pub rule: Option<RuleId>,
    /// Set when the path is excluded
    pub reason: Option<ExcludeReason>,
}

impl Verdict {
    fn explicit(class: Classification, rule: RuleId) -> Self {
        Self {
            class,
            rule: Some(rule),
            reason: None,
        }
    }

    fn include() -> Self {
        Self {
            class: Classification::StructuralInclude,
            rule: None,
            reason: None,
        }
    }

    fn exclude(reason: ExcludeReason) -> Self {
        Self {
            class: Classification::StructuralExclude,
            rule: None,
            reason: Some(reason),
        }
    }
}

/// Classification policy for one run; immutable once built
#[derive(Debug, Clone)]
pub struct ClassificationPolicy {
    rules: ClassificationRuleSet,
    profile: BuildProfile,
    loader_paths: Vec<String>,
}

impl ClassificationPolicy {
    /// Build a policy; `loader` is the canonical path of the host dynamic loader
    pub fn new(rules: ClassificationRuleSet, profile: BuildProfile, loader: &Path) -> Self {
        let loader = loader.to_string_lossy().into_owned();
        let alias = match loader.strip_prefix("/usr") {
            Some(rest) if rest.starts_with('/') => rest.to_string(),
            _ => format!("/usr{loader}"),
        };
        Self {
            rules,
            profile,
            loader_paths: vec![loader, alias],
        }
    }

    /// The explicit rules
    pub fn rules(&self) -> &ClassificationRuleSet {
        &self.rules
    }

    /// The build profile
    pub fn profile(&self) -> BuildProfile {
        self.profile
    }

    /// Classify `path`
    pub fn classify(&self, path: &str) -> Verdict {
        if DEBUG_SENTINELS.iter().any(|s| path.contains(s)) {
            return Verdict::exclude(ExcludeReason::DebugSentinel);
        }

        if let Some(rule) = self.rules.first_match(RuleKind::MustCopy, path) {
            return Verdict::explicit(Classification::MustCopy, rule);
        }

        if let Some(rule) = self.rules.first_match(RuleKind::MustPatch, path) {
            return Verdict::explicit(Classification::MustPatch, rule);
        }

        if self.loader_paths.iter().any(|l| l == path) {
            return Verdict::exclude(ExcludeReason::DynamicLoader);
        }

        match structural(path, self.profile) {
            Ok(()) => Verdict::include(),
            Err(reason) => Verdict::exclude(reason),
        }
    }

    /// Destination of `path` inside the image
    pub fn image_path(&self, path: &str) -> Option<PathBuf> {
        image_path(path, self.profile)
    }
}

/// Strip `/usr` (and `/local` in debug) and make the rest relative.
///
/// Returns `None` for relative paths and for paths that strip to nothing.
pub fn image_path(path: &str, profile: BuildProfile) -> Option<PathBuf> {
    if !path.starts_with('/') {
        return None;
    }

    let mut rest = strip_segment(path, "/usr");
    if profile.is_debug() {
        rest = strip_segment(rest, "/local");
    }

    let relative = rest.trim_start_matches('/');
    if relative.is_empty() {
        None
    } else {
        Some(PathBuf::from(relative))
    }
}

/// Strip `prefix` only when it is a whole leading segment
fn strip_segment<'a>(path: &'a str, prefix: &str) -> &'a str {
    match path.strip_prefix(prefix) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => path,
    }
}

fn structural(path: &str, profile: BuildProfile) -> Result<(), ExcludeReason> {
    if !path.starts_with('/') {
        return Err(ExcludeReason::NotAbsolute);
    }

    let relative = image_path(path, profile).ok_or(ExcludeReason::OutsideLayout)?;
    let relative = relative.to_string_lossy();
    let mut segments = relative.split('/');
    let first = segments.next().unwrap_or_default();

    let allowed = first == "lib"
        || first == "lib64"
        || relative == "bin/bash"
        || (profile.is_debug() && first == "sbin");
    if !allowed {
        return Err(ExcludeReason::OutsideLayout);
    }

    if segments.any(|s| s == "locale" || s == ".build-id") {
        return Err(ExcludeReason::LocaleOrBuildId);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::RulesConfig;
    use crate::test_utils::generators::absolute_path;
    use crate::config::defaults::MIN_PROPTEST_ITERATIONS;
    use proptest::prelude::*;

    fn policy(profile: BuildProfile, copy: &[&str], patch: &[&str]) -> ClassificationPolicy {
        let rules = ClassificationRuleSet::from_config(&RulesConfig {
            must_copy: copy.iter().map(ToString::to_string).collect(),
            must_patch: patch.iter().map(ToString::to_string).collect(),
            ..RulesConfig::default()
        })
        .unwrap();
        ClassificationPolicy::new(rules, profile, Path::new("/lib64/ld-linux-x86-64.so.2"))
    }

    #[test]
    fn test_structural_examples() {
        let p = policy(BuildProfile::Release, &[], &[]);
        assert_eq!(
            p.classify("/usr/lib64/libfoo.so.1").class,
            Classification::StructuralInclude
        );
        assert_eq!(
            p.classify("/usr/share/locale/en/foo.mo").class,
            Classification::StructuralExclude
        );
        let verdict = p.classify("/var/log/foo.log");
        assert_eq!(verdict.class, Classification::StructuralExclude);
        assert_eq!(verdict.reason, Some(ExcludeReason::OutsideLayout));
    }

    #[test]
    fn test_bash_is_the_only_binary() {
        let p = policy(BuildProfile::Release, &[], &[]);
        assert!(p.classify("/usr/bin/bash").class.is_included());
        assert!(p.classify("/bin/bash").class.is_included());
        assert!(!p.classify("/usr/bin/ls").class.is_included());
        assert!(!p.classify("/usr/bin/bashbug").class.is_included());
    }

    #[test]
    fn test_locale_and_build_id_rejected_under_lib() {
        let p = policy(BuildProfile::Release, &[], &[]);
        let verdict = p.classify("/usr/lib/locale/C.utf8/LC_CTYPE");
        assert_eq!(verdict.reason, Some(ExcludeReason::LocaleOrBuildId));
        let verdict = p.classify("/usr/lib/.build-id/ab/cdef");
        assert_eq!(verdict.reason, Some(ExcludeReason::LocaleOrBuildId));
    }

    #[test]
    fn test_debug_profile_relaxations() {
        let release = policy(BuildProfile::Release, &[], &[]);
        let debug = policy(BuildProfile::Debug, &[], &[]);

        assert!(!release.classify("/usr/sbin/ldconfig").class.is_included());
        assert!(debug.classify("/usr/sbin/ldconfig").class.is_included());

        assert!(!release.classify("/usr/local/lib64/libbar.so").class.is_included());
        assert!(debug.classify("/usr/local/lib64/libbar.so").class.is_included());
    }

    #[test]
    fn test_usr_prefix_must_be_whole_segment() {
        let p = policy(BuildProfile::Release, &[], &[]);
        assert!(!p.classify("/usrlib64/libfoo.so").class.is_included());
        assert_eq!(
            image_path("/usrlib64/x", BuildProfile::Release),
            Some(PathBuf::from("usrlib64/x"))
        );
    }

    #[test]
    fn test_loader_excluded_under_both_spellings() {
        let p = policy(BuildProfile::Release, &[], &[]);
        assert_eq!(
            p.classify("/lib64/ld-linux-x86-64.so.2").reason,
            Some(ExcludeReason::DynamicLoader)
        );
        assert_eq!(
            p.classify("/usr/lib64/ld-linux-x86-64.so.2").reason,
            Some(ExcludeReason::DynamicLoader)
        );
    }

    #[test]
    fn test_sentinel_beats_explicit_rules() {
        let p = policy(BuildProfile::Release, &[".*"], &[]);
        let verdict = p.classify("/usr/lib/debug/usr/bin/bash.debug");
        assert_eq!(verdict.reason, Some(ExcludeReason::DebugSentinel));
    }

    #[test]
    fn test_must_copy_beats_must_patch() {
        let p = policy(BuildProfile::Release, &["/opt/tool"], &["/opt/.*"]);
        assert_eq!(p.classify("/opt/tool").class, Classification::MustCopy);
        assert_eq!(p.classify("/opt/other").class, Classification::MustPatch);
    }

    #[test]
    fn test_explicit_rule_admits_structurally_excluded_path() {
        let p = policy(BuildProfile::Release, &["/etc/pki/.*"], &[]);
        let verdict = p.classify("/etc/pki/tls/cert.pem");
        assert_eq!(verdict.class, Classification::MustCopy);
        assert_eq!(verdict.rule.map(|r| r.index), Some(0));
    }

    #[test]
    fn test_image_path() {
        assert_eq!(
            image_path("/usr/lib64/libfoo.so.1", BuildProfile::Release),
            Some(PathBuf::from("lib64/libfoo.so.1"))
        );
        assert_eq!(
            image_path("/etc/hosts", BuildProfile::Release),
            Some(PathBuf::from("etc/hosts"))
        );
        assert_eq!(
            image_path("/usr/local/lib/x", BuildProfile::Debug),
            Some(PathBuf::from("lib/x"))
        );
        assert_eq!(image_path("/usr", BuildProfile::Release), None);
        assert_eq!(image_path("lib64/x", BuildProfile::Release), None);
    }

    #[test]
    fn test_profile_from_str() {
        assert_eq!("Debug".parse::<BuildProfile>(), Ok(BuildProfile::Debug));
        assert!("fast".parse::<BuildProfile>().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(MIN_PROPTEST_ITERATIONS))]

        #[test]
        fn prop_classify_is_deterministic(path in absolute_path()) {
            let p = policy(BuildProfile::Release, &["/etc/.*"], &["/opt/.*"]);
            prop_assert_eq!(p.classify(&path), p.classify(&path));
        }

        #[test]
        fn prop_explicit_rules_override_structure(path in absolute_path()) {
            prop_assume!(!DEBUG_SENTINELS.iter().any(|s| path.contains(s)));
            let copy_all = policy(BuildProfile::Release, &[".*"], &[]);
            prop_assert_eq!(copy_all.classify(&path).class, Classification::MustCopy);

            let patch_all = policy(BuildProfile::Release, &[], &[".*"]);
            prop_assert_eq!(patch_all.classify(&path).class, Classification::MustPatch);
        }
    }
}
