//! Typed configuration (`portroot.toml`)
//!
//! The schema is closed: unknown keys anywhere in the file are rejected at
//! load time, so a typo surfaces as a [`ConfigError`] instead of a rule that
//! silently never fires.
//!
//! ```toml
//! [rules]
//! must-copy = ['/etc/pki/tls/certs/ca-bundle\.crt']
//! must-patch = ['/usr/libexec/git-core/git-.*']
//!
//! [rules.must-exclude]
//! common = ['.*/lib64/libasan\.so.*']
//! release = ['.*/lib64/.*\.a']
//!
//! [packages]
//! runtime = ["coreutils", "python3"]
//! exclude-prefix = ["glibc-", "filesystem-"]
//! exclude-suffix = [".i686"]
//!
//! [image]
//! lib-root = "lib64"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::config::defaults;
use crate::error::ConfigError;

/// Root of the configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Settings {
    /// Explicit classification rules
    pub rules: RulesConfig,

    /// Package request
    #[serde(default)]
    pub packages: PackagesConfig,

    /// Image layout
    #[serde(default)]
    pub image: ImageConfig,

    /// External tool locations
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Ordered rule lists; patterns are matched against whole absolute paths
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct RulesConfig {
    /// Paths copied verbatim regardless of structural rules
    #[serde(default)]
    pub must_copy: Vec<String>,

    /// Paths copied and relocated regardless of structural rules
    #[serde(default)]
    pub must_patch: Vec<String>,

    /// Paths swept out of the tree after assembly
    #[serde(default)]
    pub must_exclude: ExcludeConfig,
}

/// Exclusion rules split by build profile
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExcludeConfig {
    /// Applied in every profile
    #[serde(default)]
    pub common: Vec<String>,

    /// Applied only to debug images
    #[serde(default)]
    pub debug: Vec<String>,

    /// Applied only to release images
    #[serde(default)]
    pub release: Vec<String>,
}

/// Package identifier sets and the filters applied to their closure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PackagesConfig {
    /// Packages needed only on the build host
    #[serde(default)]
    pub build: Vec<String>,

    /// Packages shipped in the image
    #[serde(default)]
    pub runtime: Vec<String>,

    /// Transitive packages starting with one of these are dropped
    #[serde(default)]
    pub exclude_prefix: Vec<String>,

    /// Transitive packages ending with one of these are dropped
    #[serde(default)]
    pub exclude_suffix: Vec<String>,

    /// Package database whose modification time keys the cache
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Architecture filter handed to the closure query
    #[serde(default = "default_arches")]
    pub arches: String,
}

fn default_database() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_PACKAGE_DATABASE)
}

fn default_arches() -> String {
    defaults::DEFAULT_ARCHES.to_string()
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            build: Vec::new(),
            runtime: Vec::new(),
            exclude_prefix: Vec::new(),
            exclude_suffix: Vec::new(),
            database: default_database(),
            arches: default_arches(),
        }
    }
}

/// Layout of the relocatable image
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ImageConfig {
    /// Library root, relative to the image top
    #[serde(default = "default_lib_root")]
    pub lib_root: PathBuf,

    /// Canonical path of the host dynamic loader
    #[serde(default = "default_loader")]
    pub loader: PathBuf,

    /// Where the dynamic loader is placed inside the image
    #[serde(default = "default_loader_dest")]
    pub loader_dest: PathBuf,

    /// Extra library file-name prefixes that are copied without relocation
    #[serde(default)]
    pub skip_relocation: Vec<String>,
}

fn default_lib_root() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_LIB_ROOT)
}

fn default_loader() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_LOADER)
}

fn default_loader_dest() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_LOADER_DEST)
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            lib_root: default_lib_root(),
            loader: default_loader(),
            loader_dest: default_loader_dest(),
            skip_relocation: Vec::new(),
        }
    }
}

/// Explicit tool paths; `None` means look the tool up in `PATH`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// Binary-format editor
    pub patchelf: Option<PathBuf>,

    /// Package manager query tool
    pub rpm: Option<PathBuf>,

    /// Dependency query tool
    pub repoquery: Option<PathBuf>,
}

impl Settings {
    /// Load and validate the configuration file at `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content, path)
    }

    /// Parse and validate configuration text; `origin` is used in error messages
    pub fn from_toml(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            error: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check structural assumptions the rest of the pipeline relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_inside_image("image.lib-root", &self.image.lib_root)?;
        require_inside_image("image.loader-dest", &self.image.loader_dest)?;

        if !self.image.loader.is_absolute() {
            return Err(ConfigError::InvalidValue {
                key: "image.loader".to_string(),
                message: format!("'{}' must be absolute", self.image.loader.display()),
            });
        }

        if self.packages.arches.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "packages.arches".to_string(),
                message: "must name at least one architecture".to_string(),
            });
        }

        Ok(())
    }
}

/// A non-empty relative path without `..` components
fn require_inside_image(key: &str, path: &Path) -> Result<(), ConfigError> {
    let valid = !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));

    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!(
                "'{}' must be a relative path inside the image",
                path.display()
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<Settings, ConfigError> {
        Settings::from_toml(content, Path::new("portroot.toml"))
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let settings = parse("[rules]\n").unwrap();
        assert!(settings.rules.must_copy.is_empty());
        assert_eq!(settings.image.lib_root, PathBuf::from("lib64"));
        assert_eq!(settings.packages.database, PathBuf::from("/var/lib/rpm"));
        assert_eq!(settings.packages.arches, "x86_64,noarch");
    }

    #[test]
    fn test_full_config() {
        let settings = parse(
            r#"
[rules]
must-copy = ['/etc/hosts']
must-patch = ['/usr/libexec/foo']

[rules.must-exclude]
common = ['.*\.a']
debug = []
release = ['.*/include/.*']

[packages]
build = ["gcc"]
runtime = ["coreutils"]
exclude-prefix = ["glibc-"]
exclude-suffix = [".i686"]

[image]
lib-root = "lib"
skip-relocation = ["libfoo"]

[tools]
patchelf = "/opt/bin/patchelf"
"#,
        )
        .unwrap();

        assert_eq!(settings.rules.must_copy, vec!["/etc/hosts"]);
        assert_eq!(settings.rules.must_exclude.release, vec![".*/include/.*"]);
        assert_eq!(settings.packages.exclude_prefix, vec!["glibc-"]);
        assert_eq!(settings.image.lib_root, PathBuf::from("lib"));
        assert_eq!(
            settings.tools.patchelf,
            Some(PathBuf::from("/opt/bin/patchelf"))
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = parse("[rules]\nmust-copyy = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("must-copyy"));
    }

    #[test]
    fn test_missing_rules_section_rejected() {
        let err = parse("[packages]\nruntime = [\"bash\"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_lib_root_must_stay_inside_image() {
        let err = parse("[rules]\n[image]\nlib-root = \"../lib\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "image.lib-root"));

        let err = parse("[rules]\n[image]\nlib-root = \"/lib64\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_relative_loader_rejected() {
        let err = parse("[rules]\n[image]\nloader = \"ld.so\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "image.loader"));
    }
}
