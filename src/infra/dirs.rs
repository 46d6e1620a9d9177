//! Platform-specific directory management
//!
//! The closure/manifest cache lives under the platform cache directory
//! (`$XDG_CACHE_HOME/portroot` or `~/.cache/portroot` on Linux).
//! `PORTROOT_CACHE_DIR` overrides it.

use std::env;
use std::path::{Path, PathBuf};

use crate::config::defaults::ENV_CACHE_DIR;

/// Application name used in directory paths
const APP_NAME: &str = "portroot";

/// Subdirectory holding closure and manifest entries
const CLOSURE_CACHE_SUBDIR: &str = "closures";

/// Directory provider for portroot
#[derive(Debug, Clone)]
pub struct PortrootDirs {
    cache_dir: PathBuf,
}

impl PortrootDirs {
    /// Resolve directories from the environment, then platform defaults
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache_dir: Self::resolve_cache_dir(),
        }
    }

    /// Use an explicit cache directory
    #[must_use]
    pub fn with_cache_dir(cache_dir: &Path) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    /// Cache directory
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Where closure and manifest cache entries are stored
    #[must_use]
    pub fn closure_cache_dir(&self) -> PathBuf {
        self.cache_dir.join(CLOSURE_CACHE_SUBDIR)
    }

    fn resolve_cache_dir() -> PathBuf {
        match env::var_os(ENV_CACHE_DIR) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => Self::platform_cache_dir(),
        }
    }

    fn platform_cache_dir() -> PathBuf {
        dirs::cache_dir().map_or_else(
            || {
                dirs::home_dir().map_or_else(
                    || PathBuf::from(".").join(".cache").join(APP_NAME),
                    |h| h.join(".cache").join(APP_NAME),
                )
            },
            |p| p.join(APP_NAME),
        )
    }
}

impl Default for PortrootDirs {
    fn default() -> Self {
        Self::new()
    }
}
