//! Closure and manifest cache
//!
//! Resolution results are stored under content-addressed file names keyed by
//! the package database modification time and the sorted identifiers that
//! were asked for, so unchanged inputs never re-run the slow external query.
//! Closures are stored space-delimited, manifests newline-delimited.

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::CacheError;

/// Cache information
#[derive(Debug)]
pub struct CacheInfo {
    /// Cache directory path
    pub path: PathBuf,
    /// Total size in bytes
    pub size_bytes: u64,
    /// Number of cached items
    pub item_count: usize,
    /// Whether cache exists
    pub exists: bool,
}

impl CacheInfo {
    /// Format size for display
    #[allow(clippy::cast_precision_loss)]
    pub fn format_size(&self) -> String {
        if self.size_bytes < 1024 {
            format!("{} bytes", self.size_bytes)
        } else if self.size_bytes < 1024 * 1024 {
            format!("{:.1} KB", self.size_bytes as f64 / 1024.0)
        } else {
            format!("{:.1} MB", self.size_bytes as f64 / (1024.0 * 1024.0))
        }
    }
}

/// Kind of cached resolution result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// Package closure
    Closure,
    /// File manifest of a closure
    Manifest,
}

impl CacheKind {
    fn prefix(self) -> &'static str {
        match self {
            CacheKind::Closure => "closure",
            CacheKind::Manifest => "manifest",
        }
    }

    fn separator(self) -> char {
        match self {
            CacheKind::Closure => ' ',
            CacheKind::Manifest => '\n',
        }
    }
}

/// Generate the cache key for a database timestamp and a set of identifiers.
///
/// `ids` is a sorted set, so the key does not depend on request order.
pub fn generate_cache_key(database_mtime: u128, ids: &BTreeSet<String>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(database_mtime.to_le_bytes());
    for id in ids {
        hasher.update(id.as_bytes());
        hasher.update([0u8]);
    }

    let result = hasher.finalize();
    hex::encode(&result[..16]) // Use first 16 bytes for shorter key
}

/// On-disk store of resolution results
#[derive(Debug, Clone)]
pub struct ClosureCache {
    dir: PathBuf,
}

impl ClosureCache {
    /// Cache rooted at `dir` (created lazily on first store)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the entry for `kind` and `key`
    pub fn entry_path(&self, kind: CacheKind, key: &str) -> PathBuf {
        self.dir.join(format!("{}-{key}.txt", kind.prefix()))
    }

    /// Read an entry; unreadable entries are logged and treated as misses
    pub fn load(&self, kind: CacheKind, key: &str) -> Option<Vec<String>> {
        let path = self.entry_path(kind, key);
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(&path) {
            Ok(content) => Some(
                content
                    .split(kind.separator())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            Err(e) => {
                tracing::warn!(
                    "Failed to read cache file {}: {} (will re-resolve)",
                    path.display(),
                    e
                );
                None
            }
        }
    }

    /// Write an entry atomically
    pub fn store<I, S>(&self, kind: CacheKind, key: &str, items: I) -> Result<PathBuf, CacheError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let path = self.entry_path(kind, key);
        let write_err = |e: std::io::Error| CacheError::Write {
            path: path.clone(),
            error: e.to_string(),
        };

        fs::create_dir_all(&self.dir).map_err(write_err)?;

        let mut content = String::new();
        for item in items {
            content.push_str(item.as_ref());
            content.push(kind.separator());
        }

        let mut staged = tempfile::NamedTempFile::new_in(&self.dir).map_err(write_err)?;
        staged.write_all(content.as_bytes()).map_err(write_err)?;
        staged.persist(&path).map_err(|e| write_err(e.error))?;

        Ok(path)
    }

    /// Size and entry count of the cache
    pub fn info(&self) -> CacheInfo {
        let exists = self.dir.exists();
        let (size_bytes, item_count) = if exists {
            walkdir::WalkDir::new(&self.dir)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .filter_map(|e| e.metadata().ok())
                .fold((0, 0), |(size, count), m| (size + m.len(), count + 1))
        } else {
            (0, 0)
        };

        CacheInfo {
            path: self.dir.clone(),
            size_bytes,
            item_count,
            exists,
        }
    }

    /// Remove every entry; returns the number of bytes freed
    pub fn clean(&self) -> Result<u64, CacheError> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let size_before = self.info().size_bytes;
        fs::remove_dir_all(&self.dir).map_err(|e| CacheError::Clean {
            path: self.dir.clone(),
            error: e.to_string(),
        })?;

        Ok(size_before)
    }
}
