//! `patchelf` backed binary editing

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::config::settings::ToolsConfig;
use crate::core::relocate::BinaryEditor;
use crate::error::ToolError;
use crate::infra::process;

/// Binary editor running `patchelf`
#[derive(Debug, Clone)]
pub struct Patchelf {
    program: PathBuf,
}

impl Patchelf {
    /// Locate `patchelf`, honouring a configured path
    pub fn locate(tools: &ToolsConfig) -> Result<Self, ToolError> {
        Ok(Self::new(&process::locate("patchelf", tools.patchelf.as_deref())?))
    }

    /// Use an explicit program path
    pub fn new(program: &Path) -> Self {
        Self {
            program: program.to_path_buf(),
        }
    }
}

impl BinaryEditor for Patchelf {
    fn runpath(&self, binary: &Path) -> Result<Option<String>, ToolError> {
        let output = process::run(
            &self.program,
            &[OsStr::new("--print-rpath"), binary.as_os_str()],
        )?;
        Ok(non_empty(&output))
    }

    fn set_runpath(&self, binary: &Path, value: &str) -> Result<(), ToolError> {
        process::run(
            &self.program,
            &[OsStr::new("--set-rpath"), OsStr::new(value), binary.as_os_str()],
        )?;
        Ok(())
    }

    fn interpreter(&self, binary: &Path) -> Result<Option<PathBuf>, ToolError> {
        let output = process::run(
            &self.program,
            &[OsStr::new("--print-interpreter"), binary.as_os_str()],
        )?;
        Ok(non_empty(&output).map(PathBuf::from))
    }
}

fn non_empty(output: &str) -> Option<String> {
    let trimmed = output.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
