//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Test host context
///
/// A temporary directory standing in for the host filesystem, plus helpers
/// to write a configuration and run the binary against it.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Absolute path of `rel` inside the project
    pub fn join(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel.trim_start_matches('/'))
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Create a symlink in the test project
    pub fn create_symlink(&self, name: &str, target: &str) -> PathBuf {
        let path = self.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::os::unix::fs::symlink(target, &path).expect("Failed to create symlink");
        path
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.join(name).exists()
    }

    /// Regex-escaped project root, for rules that must match project paths
    pub fn pattern_prefix(&self) -> String {
        regex::escape(&self.dir.path().to_string_lossy())
    }

    /// Run the portroot binary inside the project with an isolated cache
    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_portroot"))
            .current_dir(self.dir.path())
            .env("PORTROOT_CACHE_DIR", self.join("cache"))
            .env_remove("PORTROOT_CONFIG")
            .env_remove("RUST_LOG")
            .args(args)
            .output()
            .expect("Failed to execute portroot")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Stdout of a finished command
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Stderr of a finished command
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Minimal little-endian ELF64 shared object with a dynamic section
pub fn shared_object() -> Vec<u8> {
    elf(3, &[1, 2])
}

/// Minimal little-endian ELF64 PIE executable with an interpreter
pub fn pie_executable() -> Vec<u8> {
    elf(3, &[6, 3, 1, 2])
}

fn elf(e_type: u16, program_headers: &[u32]) -> Vec<u8> {
    const EHDR: usize = 64;
    const PHENT: usize = 56;

    let mut image = vec![0u8; EHDR + PHENT * program_headers.len()];
    image[..4].copy_from_slice(b"\x7fELF");
    image[4] = 2;
    image[5] = 1;
    image[6] = 1;
    image[16..18].copy_from_slice(&e_type.to_le_bytes());
    image[32..40].copy_from_slice(&(EHDR as u64).to_le_bytes());
    image[54..56].copy_from_slice(&(PHENT as u16).to_le_bytes());
    image[56..58].copy_from_slice(&(program_headers.len() as u16).to_le_bytes());
    for (i, p_type) in program_headers.iter().enumerate() {
        let at = EHDR + i * PHENT;
        image[at..at + 4].copy_from_slice(&p_type.to_le_bytes());
    }
    image
}

/// Write `paths` as a `--files-from` list
pub fn write_path_list(project: &TestProject, name: &str, paths: &[&Path]) -> PathBuf {
    let content: String = paths
        .iter()
        .map(|p| format!("{}\n", p.display()))
        .collect();
    project.create_file(name, content.as_bytes())
}
