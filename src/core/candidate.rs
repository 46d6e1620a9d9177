//! Candidate paths and their detected format

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Detected binary-format class of a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileClass {
    /// ELF shared object without an interpreter
    ElfShared,
    /// Dynamically linked ELF executable
    ElfExecutable,
    /// Plain text
    Text,
    /// Symbolic link, never followed
    Symlink,
    /// Directory
    Directory,
    /// Anything else, including static ELF binaries
    Other,
}

impl FileClass {
    /// Whether the file carries a dynamic search path worth rewriting
    pub fn is_elf(self) -> bool {
        matches!(self, FileClass::ElfShared | FileClass::ElfExecutable)
    }
}

/// Detects the format of a regular file
pub trait FormatSniffer {
    /// Classify the regular file at `path`
    fn sniff(&self, path: &Path) -> io::Result<FileClass>;
}

/// An absolute source path plus the facts derived from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePath {
    /// Absolute source path
    pub path: PathBuf,
    /// Detected class
    pub class: FileClass,
}

impl CandidatePath {
    /// Inspect `path` without following symlinks.
    ///
    /// Returns `Ok(None)` when the path does not exist.
    pub fn inspect(path: &Path, sniffer: &dyn FormatSniffer) -> io::Result<Option<Self>> {
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let file_type = metadata.file_type();
        let class = if file_type.is_symlink() {
            FileClass::Symlink
        } else if file_type.is_dir() {
            FileClass::Directory
        } else if file_type.is_file() {
            sniffer.sniff(path)?
        } else {
            FileClass::Other
        };

        Ok(Some(Self {
            path: path.to_path_buf(),
            class,
        }))
    }

    /// Whether the candidate is a symlink
    pub fn is_symlink(&self) -> bool {
        self.class == FileClass::Symlink
    }
}
