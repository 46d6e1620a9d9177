//! Relocation engine
//!
//! Rewrites the library search path of a binary so that it points at the
//! image's library root relative to the binary's own location (`$ORIGIN`),
//! and propagates the dynamic loader of executables into the image.
//!
//! The source binary is never modified: it is copied into a private scratch
//! directory, the copy is edited, and the tree assembler places the copy.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use crate::config::defaults::SKIP_RELOCATION_PREFIXES;
use crate::config::settings::ImageConfig;
use crate::core::candidate::FileClass;
use crate::error::{AssemblyError, RelocationError, ToolError};
use crate::infra::tree::{Placement, TreeAssembler};

/// Edits binary-format metadata
pub trait BinaryEditor {
    /// Current library search path, if any
    fn runpath(&self, binary: &Path) -> Result<Option<String>, ToolError>;

    /// Overwrite the library search path
    fn set_runpath(&self, binary: &Path, value: &str) -> Result<(), ToolError>;

    /// Registered dynamic loader, if any
    fn interpreter(&self, binary: &Path) -> Result<Option<PathBuf>, ToolError>;
}

/// Compute the self-relative search path for a binary placed at `dest_rel`.
///
/// Depends only on the destination: one `..` per directory between the image
/// top and the binary, followed by `lib_root`.
pub fn runpath_for(dest_rel: &Path, lib_root: &Path) -> String {
    let depth = dest_rel.parent().map_or(0, |dir| {
        dir.components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .count()
    });

    let mut value = String::from("$ORIGIN");
    for _ in 0..depth {
        value.push_str("/..");
    }
    value.push('/');
    value.push_str(&lib_root.to_string_lossy());
    value
}

/// One binary to relocate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationJob {
    /// Original binary
    pub source: PathBuf,
    /// Destination relative to the image top
    pub dest_rel: PathBuf,
    /// Search path to write
    pub runpath: String,
}

/// A relocated copy waiting to be placed
#[derive(Debug)]
pub struct RelocatedArtifact {
    /// Edited scratch copy, original permission bits restored
    pub staged: PathBuf,
    /// Search path that was written
    pub runpath: String,
    /// Dynamic loader registered in the binary (executables only)
    pub loader: Option<PathBuf>,
}

impl RelocatedArtifact {
    /// Drop the scratch copy once it has been placed
    pub fn discard(self) {
        if let Err(e) = fs::remove_file(&self.staged) {
            tracing::debug!("Failed to remove scratch copy {}: {e}", self.staged.display());
        }
    }
}

/// Relocates binaries through a [`BinaryEditor`]
#[derive(Debug)]
pub struct RelocationEngine<E> {
    editor: E,
    lib_root: PathBuf,
    loader_dest: PathBuf,
    skip_prefixes: Vec<String>,
    scratch: tempfile::TempDir,
    staged: u64,
    loader: Option<PathBuf>,
}

impl<E: BinaryEditor> RelocationEngine<E> {
    /// Create an engine with a fresh scratch directory
    pub fn new(editor: E, image: &ImageConfig) -> Result<Self, RelocationError> {
        let scratch = tempfile::Builder::new()
            .prefix("portroot-reloc-")
            .tempdir()
            .map_err(|e| RelocationError::Stage {
                path: std::env::temp_dir(),
                error: e.to_string(),
            })?;

        let mut skip_prefixes: Vec<String> = SKIP_RELOCATION_PREFIXES
            .iter()
            .map(ToString::to_string)
            .collect();
        skip_prefixes.extend(image.skip_relocation.iter().cloned());

        Ok(Self {
            editor,
            lib_root: image.lib_root.clone(),
            loader_dest: image.loader_dest.clone(),
            skip_prefixes,
            scratch,
            staged: 0,
            loader: None,
        })
    }

    /// The underlying editor
    pub fn editor(&self) -> &E {
        &self.editor
    }

    /// Fixed destination of the dynamic loader
    pub fn loader_dest(&self) -> &Path {
        &self.loader_dest
    }

    /// Loader propagated into the image during this run
    pub fn propagated_loader(&self) -> Option<&Path> {
        self.loader.as_deref()
    }

    /// Describe the relocation of `source` to `dest_rel`
    pub fn job(&self, source: &Path, dest_rel: &Path) -> RelocationJob {
        RelocationJob {
            source: source.to_path_buf(),
            dest_rel: dest_rel.to_path_buf(),
            runpath: runpath_for(dest_rel, &self.lib_root),
        }
    }

    /// Known-problematic libraries that must not be edited
    pub fn should_skip(&self, dest_rel: &Path) -> bool {
        let Some(name) = dest_rel.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };
        self.skip_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    /// Copy, rewrite and (for executables) inspect the loader of one binary
    pub fn relocate(
        &mut self,
        job: &RelocationJob,
        class: FileClass,
    ) -> Result<RelocatedArtifact, RelocationError> {
        let stage_err = |e: std::io::Error| RelocationError::Stage {
            path: job.source.clone(),
            error: e.to_string(),
        };

        let mode = fs::metadata(&job.source).map_err(stage_err)?.permissions().mode() & 0o7777;

        self.staged += 1;
        let name = job
            .dest_rel
            .file_name()
            .map_or_else(|| "binary".into(), |n| n.to_string_lossy());
        let staged = self.scratch.path().join(format!("{}-{name}", self.staged));

        fs::copy(&job.source, &staged).map_err(stage_err)?;
        fs::set_permissions(&staged, fs::Permissions::from_mode(mode | 0o200))
            .map_err(stage_err)?;

        let edit_err = |source: ToolError| RelocationError::Edit {
            path: job.source.clone(),
            source,
        };
        self.editor
            .set_runpath(&staged, &job.runpath)
            .map_err(edit_err)?;

        let found = self.editor.runpath(&staged).map_err(edit_err)?;
        if found.as_deref() != Some(job.runpath.as_str()) {
            return Err(RelocationError::Unverified {
                path: job.source.clone(),
                expected: job.runpath.clone(),
                found: found.unwrap_or_default(),
            });
        }

        fs::set_permissions(&staged, fs::Permissions::from_mode(mode)).map_err(|e| {
            RelocationError::Permissions {
                path: staged.clone(),
                error: e.to_string(),
            }
        })?;

        let loader = if class == FileClass::ElfExecutable {
            self.discover_loader(&job.source)
        } else {
            None
        };

        tracing::debug!("Relocated {} with {}", job.source.display(), job.runpath);

        Ok(RelocatedArtifact {
            staged,
            runpath: job.runpath.clone(),
            loader,
        })
    }

    fn discover_loader(&self, binary: &Path) -> Option<PathBuf> {
        match self.editor.interpreter(binary) {
            Ok(Some(loader)) => Some(loader),
            Ok(None) => {
                tracing::info!("{} has no registered loader", binary.display());
                None
            }
            Err(e) => {
                tracing::warn!(
                    "Could not determine loader of {}: {e} (continuing)",
                    binary.display()
                );
                None
            }
        }
    }

    /// Place the dereferenced `loader` at the fixed loader destination.
    ///
    /// Happens at most once per run, whatever the tree's overwrite mode, and
    /// is a no-op when the destination already exists without overwrite.
    pub fn propagate_loader(
        &mut self,
        loader: &Path,
        tree: &mut TreeAssembler,
    ) -> Result<Placement, AssemblyError> {
        if self.loader.is_some() {
            return Ok(Placement::AlreadyPresent);
        }

        let real = match fs::canonicalize(loader) {
            Ok(real) => real,
            Err(e) => {
                tracing::warn!("Loader {} is not resolvable: {e}", loader.display());
                return Ok(Placement::MissingSource);
            }
        };

        let placement = tree.add_file_from(&real, &self.loader_dest, &real)?;
        if placement == Placement::Written {
            tracing::info!(
                "Propagated loader {} to {}",
                real.display(),
                self.loader_dest.display()
            );
            self.loader = Some(real);
        }
        Ok(placement)
    }
}
