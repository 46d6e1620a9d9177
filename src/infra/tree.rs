//! Tree assembly
//!
//! Materializes files, directories and symlinks under the image root. With
//! overwrite disabled an existing destination is never touched, which makes
//! reruns cheap: a second run over the same manifest performs no writes.
//!
//! Regular files are written to a hidden sibling first and renamed into
//! place, so a killed run never leaves a truncated destination behind.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File, Permissions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use walkdir::WalkDir;

use crate::core::classify::BuildProfile;
use crate::core::rules::{ClassificationRuleSet, RuleUsage};
use crate::error::AssemblyError;

/// Suffix of in-flight copies
const PARTIAL_SUFFIX: &str = ".portroot-partial";

/// How to treat an image root that already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TreeMode {
    /// Move the existing tree aside and start empty
    #[default]
    Fresh,
    /// Keep the existing tree and only add what is missing
    Resume,
}

/// Result of placing one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// The destination was created or replaced
    Written,
    /// The destination exists and overwrite is off
    AlreadyPresent,
    /// The source does not exist on disk
    MissingSource,
    /// A symlink whose target leaves its own directory
    SkippedSymlink {
        /// Link target as stored in the source
        target: PathBuf,
    },
}

/// Destination tree of one run
#[derive(Debug)]
pub struct TreeAssembler {
    root: PathBuf,
    overwrite: bool,
    writes: u64,
    moved_aside: Option<PathBuf>,
}

impl TreeAssembler {
    /// Open `root` for assembly
    pub fn open(root: &Path, mode: TreeMode, overwrite: bool) -> Result<Self, AssemblyError> {
        let mut moved_aside = None;

        if fs::symlink_metadata(root).is_ok() {
            match mode {
                TreeMode::Fresh => {
                    let aside = aside_path(root).ok_or_else(|| AssemblyError::MoveAside {
                        path: root.to_path_buf(),
                        error: "path has no final component".to_string(),
                    })?;
                    fs::rename(root, &aside).map_err(|e| AssemblyError::MoveAside {
                        path: root.to_path_buf(),
                        error: e.to_string(),
                    })?;
                    tracing::info!("Moved previous tree to {}", aside.display());
                    moved_aside = Some(aside);
                }
                TreeMode::Resume => remove_partials(root)?,
            }
        }

        create_dir_all(root)?;

        Ok(Self {
            root: root.to_path_buf(),
            overwrite,
            writes: 0,
            moved_aside,
        })
    }

    /// Image root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of filesystem writes performed so far
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Where the previous tree went, if one was moved aside
    pub fn moved_aside(&self) -> Option<&Path> {
        self.moved_aside.as_deref()
    }

    /// Whether placing something at `rel` would write
    pub fn would_write(&self, rel: &Path) -> bool {
        self.overwrite || fs::symlink_metadata(self.root.join(rel)).is_err()
    }

    /// Place `source` at `rel`, without following symlinks
    pub fn add(&mut self, source: &Path, rel: &Path) -> Result<Placement, AssemblyError> {
        let metadata = match fs::symlink_metadata(source) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!("Source file {} does not exist, skipping", source.display());
                return Ok(Placement::MissingSource);
            }
            Err(e) => return Err(copy_error(source, &self.root.join(rel), &e)),
        };

        let dest = self.destination(rel)?;
        if !self.would_write(rel) {
            tracing::debug!("{} already present", rel.display());
            return Ok(Placement::AlreadyPresent);
        }

        let file_type = metadata.file_type();
        if file_type.is_symlink() {
            self.add_symlink(source, &dest)
        } else if file_type.is_dir() {
            // Plain containers; host directory modes are not carried over
            create_dir_all(&dest)?;
            self.writes += 1;
            Ok(Placement::Written)
        } else {
            self.write_file(source, &dest, &metadata)?;
            Ok(Placement::Written)
        }
    }

    /// Place the contents of `content` at `rel`, taking mode and
    /// modification time from `reference`
    pub fn add_file_from(
        &mut self,
        content: &Path,
        rel: &Path,
        reference: &Path,
    ) -> Result<Placement, AssemblyError> {
        let dest = self.destination(rel)?;
        if !self.would_write(rel) {
            tracing::debug!("{} already present", rel.display());
            return Ok(Placement::AlreadyPresent);
        }

        let metadata = match fs::metadata(reference) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!("Source file {} does not exist, skipping", reference.display());
                return Ok(Placement::MissingSource);
            }
            Err(e) => return Err(copy_error(reference, &dest, &e)),
        };

        self.write_file(content, &dest, &metadata)?;
        Ok(Placement::Written)
    }

    fn destination(&self, rel: &Path) -> Result<PathBuf, AssemblyError> {
        let inside = rel.components().next().is_some()
            && rel.components().all(|c| matches!(c, Component::Normal(_)));
        if inside {
            Ok(self.root.join(rel))
        } else {
            Err(AssemblyError::InvalidDestination {
                path: rel.to_path_buf(),
            })
        }
    }

    fn add_symlink(&mut self, source: &Path, dest: &Path) -> Result<Placement, AssemblyError> {
        let target = fs::read_link(source).map_err(|e| copy_error(source, dest, &e))?;

        let Some(target_text) = same_directory_target(source, &target) else {
            tracing::warn!(
                "Skipping symlink {} -> {}: target is outside its directory",
                source.display(),
                target.display()
            );
            return Ok(Placement::SkippedSymlink { target });
        };

        create_parent(dest)?;
        if self.overwrite {
            remove_existing(dest)?;
        }
        std::os::unix::fs::symlink(&target_text, dest).map_err(|e| AssemblyError::Symlink {
            path: dest.to_path_buf(),
            error: e.to_string(),
        })?;

        self.writes += 1;
        Ok(Placement::Written)
    }

    fn write_file(
        &mut self,
        content: &Path,
        dest: &Path,
        metadata: &fs::Metadata,
    ) -> Result<(), AssemblyError> {
        create_parent(dest)?;
        let partial = partial_path(dest);

        let staged = stage_copy(content, &partial, metadata);
        let placed = staged.and_then(|()| fs::rename(&partial, dest));
        if let Err(e) = placed {
            let _ = fs::remove_file(&partial);
            return Err(copy_error(content, dest, &e));
        }

        self.writes += 1;
        Ok(())
    }

    /// Delete every entry matching an exclusion rule active for `profile`.
    ///
    /// Entries in `protected` (and directories containing them) are kept.
    /// Returns the removed paths, relative to the root.
    pub fn sweep_excluded(
        &mut self,
        rules: &ClassificationRuleSet,
        profile: BuildProfile,
        protected: &HashSet<PathBuf>,
        usage: &mut RuleUsage,
    ) -> Result<Vec<PathBuf>, AssemblyError> {
        let mut removed = Vec::new();
        let mut walker = WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Failed to read tree entry: {e}");
                    continue;
                }
            };
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            if protected.contains(rel) {
                continue;
            }

            let abs = format!("/{}", rel.to_string_lossy());
            let Some(rule) = rules.exclusion_match(&abs, profile) else {
                continue;
            };

            let is_dir = entry.file_type().is_dir();
            if is_dir && protected.iter().any(|p| p.starts_with(rel)) {
                tracing::debug!("Keeping {abs}: contains explicitly included paths");
                continue;
            }

            usage.record(rule);
            tracing::debug!("Excluding {abs} ({rule})");

            let result = if is_dir {
                walker.skip_current_dir();
                fs::remove_dir_all(entry.path())
            } else {
                fs::remove_file(entry.path())
            };
            result.map_err(|e| AssemblyError::Remove {
                path: entry.path().to_path_buf(),
                error: e.to_string(),
            })?;

            self.writes += 1;
            removed.push(rel.to_path_buf());
        }

        Ok(removed)
    }

    /// Delete symlinks whose target no longer resolves
    pub fn sweep_broken_symlinks(&mut self) -> Result<Vec<PathBuf>, AssemblyError> {
        let broken: Vec<PathBuf> = WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.path_is_symlink() && fs::metadata(e.path()).is_err())
            .map(walkdir::DirEntry::into_path)
            .collect();

        let mut removed = Vec::with_capacity(broken.len());
        for path in broken {
            fs::remove_file(&path).map_err(|e| AssemblyError::Remove {
                path: path.clone(),
                error: e.to_string(),
            })?;
            self.writes += 1;
            tracing::debug!("Removed broken symlink {}", path.display());
            if let Ok(rel) = path.strip_prefix(&self.root) {
                removed.push(rel.to_path_buf());
            }
        }

        Ok(removed)
    }
}

/// Target text to reproduce for a link at `link` pointing at `target`,
/// or `None` when the target is in another directory
fn same_directory_target(link: &Path, target: &Path) -> Option<PathBuf> {
    let name = target.file_name()?;
    let parent = target.parent().unwrap_or_else(|| Path::new(""));

    if target.is_relative() {
        let bare = parent.as_os_str().is_empty()
            && matches!(target.components().next(), Some(Component::Normal(_)));
        return bare.then(|| target.to_path_buf());
    }

    (link.parent() == Some(parent)).then(|| PathBuf::from(name))
}

fn stage_copy(content: &Path, partial: &Path, metadata: &fs::Metadata) -> io::Result<()> {
    let mut reader = File::open(content)?;
    let mut writer = File::create(partial)?;
    io::copy(&mut reader, &mut writer)?;
    writer.set_modified(metadata.modified()?)?;
    writer.set_permissions(Permissions::from_mode(
        metadata.permissions().mode() & 0o7777,
    ))?;
    Ok(())
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(dest.file_name().unwrap_or_default());
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}

/// Sibling of `root` named `<name>.prev-<secs>[-n]` that does not exist yet
fn aside_path(root: &Path) -> Option<PathBuf> {
    let name = root.file_name()?.to_string_lossy();
    let parent = root.parent().unwrap_or_else(|| Path::new(""));
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());

    let base = format!("{name}.prev-{secs}");
    let mut aside = parent.join(&base);
    let mut n = 1;
    while fs::symlink_metadata(&aside).is_ok() {
        aside = parent.join(format!("{base}-{n}"));
        n += 1;
    }
    Some(aside)
}

fn remove_partials(root: &Path) -> Result<(), AssemblyError> {
    let stale = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_string_lossy().ends_with(PARTIAL_SUFFIX));

    for entry in stale {
        tracing::info!("Removing interrupted copy {}", entry.path().display());
        fs::remove_file(entry.path()).map_err(|e| AssemblyError::Remove {
            path: entry.path().to_path_buf(),
            error: e.to_string(),
        })?;
    }
    Ok(())
}

fn remove_existing(path: &Path) -> Result<(), AssemblyError> {
    let result = match fs::symlink_metadata(path) {
        Ok(m) if m.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(_) => Ok(()),
    };
    result.map_err(|e| AssemblyError::Remove {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

fn create_dir_all(path: &Path) -> Result<(), AssemblyError> {
    fs::create_dir_all(path).map_err(|e| AssemblyError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

fn create_parent(path: &Path) -> Result<(), AssemblyError> {
    match path.parent() {
        Some(parent) => create_dir_all(parent),
        None => Ok(()),
    }
}

fn copy_error(from: &Path, to: &Path, e: &io::Error) -> AssemblyError {
    AssemblyError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        error: e.to_string(),
    }
}
