//! Closure resolution
//!
//! Turns a [`PackageRequest`] into the set of packages it pulls in and then
//! into the set of files those packages own. The package-to-package expansion
//! is delegated to an external [`PackageQuery`]; this module owns retrying,
//! filtering and caching.
//!
//! The raw (unfiltered) query result is what gets cached, so changing the
//! exclude filters takes effect without invalidating the cache.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use crate::config::defaults;
use crate::core::cache::{generate_cache_key, CacheKind, ClosureCache};
use crate::core::request::PackageRequest;
use crate::error::{CacheError, PortrootError, ToolError};
use crate::infra::process::with_retries;

/// External package-metadata query
pub trait PackageQuery {
    /// Requested packages plus everything they recursively require
    fn closure(&self, packages: &BTreeSet<String>) -> Result<Vec<String>, ToolError>;

    /// Files owned by an installed package
    fn files(&self, package: &str) -> Result<Vec<PathBuf>, ToolError>;
}

/// Read-only snapshot of the package database, taken once per run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDatabase {
    path: PathBuf,
    modified: u128,
}

impl PackageDatabase {
    /// Record the modification time of the database at `path`
    pub fn snapshot(path: &Path) -> Result<Self, CacheError> {
        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| CacheError::Database {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;
        let modified = modified
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());

        Ok(Self::at(path, modified))
    }

    /// Snapshot with a known modification time
    pub fn at(path: &Path, modified: u128) -> Self {
        Self {
            path: path.to_path_buf(),
            modified,
        }
    }

    /// Database location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modification time in nanoseconds since the Unix epoch
    pub fn modified(&self) -> u128 {
        self.modified
    }
}

/// Resolved, deduplicated package set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyClosure {
    /// Epoch-stripped package identifiers
    pub packages: BTreeSet<String>,
    /// Whether the result came from the cache
    pub cached: bool,
}

/// Files owned by a closure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileManifest {
    /// Absolute file paths, sorted
    pub files: BTreeSet<PathBuf>,
    /// Whether the result came from the cache
    pub cached: bool,
}

/// Resolves closures and manifests through a query with a cache in front
#[derive(Debug)]
pub struct ClosureResolver<Q> {
    query: Q,
    database: PackageDatabase,
    cache: ClosureCache,
    attempts: u32,
    retry_delay: Duration,
}

impl<Q: PackageQuery> ClosureResolver<Q> {
    /// Create a resolver over `query`, keyed by `database`
    pub fn new(query: Q, database: PackageDatabase, cache: ClosureCache) -> Self {
        Self {
            query,
            database,
            cache,
            attempts: defaults::MAX_QUERY_ATTEMPTS,
            retry_delay: Duration::from_millis(defaults::QUERY_RETRY_DELAY_MS),
        }
    }

    /// Override the retry policy
    #[must_use]
    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }

    /// The underlying query
    pub fn query(&self) -> &Q {
        &self.query
    }

    /// Resolve the package closure of `request`
    pub fn resolve_closure(&self, request: &PackageRequest) -> Result<DependencyClosure, PortrootError> {
        if request.is_empty() {
            return Ok(DependencyClosure::default());
        }

        let key = generate_cache_key(self.database.modified(), &request.packages);

        if let Some(raw) = self.cache.load(CacheKind::Closure, &key) {
            tracing::info!("Using cached closure for {} packages ({key})", request.packages.len());
            return Ok(DependencyClosure {
                packages: request.filter_closure(raw),
                cached: true,
            });
        }

        tracing::info!("Resolving closure of {} packages", request.packages.len());
        let raw = with_retries(self.attempts, self.retry_delay, || {
            self.query.closure(&request.packages)
        })?;
        self.cache.store(CacheKind::Closure, &key, &raw)?;

        let packages = request.filter_closure(raw);
        tracing::info!("Closure has {} packages", packages.len());

        Ok(DependencyClosure {
            packages,
            cached: false,
        })
    }

    /// Resolve the files owned by `closure`
    pub fn resolve_manifest(&self, closure: &DependencyClosure) -> Result<FileManifest, PortrootError> {
        if closure.packages.is_empty() {
            return Ok(FileManifest::default());
        }

        let key = generate_cache_key(self.database.modified(), &closure.packages);

        if let Some(files) = self.cache.load(CacheKind::Manifest, &key) {
            tracing::info!("Using cached manifest ({key})");
            return Ok(FileManifest {
                files: files.into_iter().map(PathBuf::from).collect(),
                cached: true,
            });
        }

        let mut files = BTreeSet::new();
        for package in &closure.packages {
            let owned = with_retries(self.attempts, self.retry_delay, || self.query.files(package))?;
            tracing::debug!("{package} owns {} files", owned.len());
            files.extend(owned.into_iter().filter(|p| p.is_absolute()));
        }

        self.cache.store(
            CacheKind::Manifest,
            &key,
            files.iter().map(|p| p.to_string_lossy()),
        )?;
        tracing::info!("Manifest has {} files", files.len());

        Ok(FileManifest {
            files,
            cached: false,
        })
    }
}
