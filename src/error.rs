//! Error types for portroot
//!
//! Domain-specific error types using thiserror. Only configuration errors,
//! relocation errors and fatal tool errors stop a run; missing source files
//! and destination collisions are reported as outcomes, not errors.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors, raised before any file operation
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Failed to parse config file (includes unknown or missing keys)
    #[error("Failed to parse config file '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// Rule pattern does not compile
    #[error("Invalid pattern #{index} in '{list}': '{pattern}': {error}")]
    InvalidPattern {
        list: String,
        index: usize,
        pattern: String,
        error: String,
    },

    /// Structural assumption violated
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// External tool errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Tool is not installed
    #[error("Required tool '{tool}' not found in PATH")]
    NotFound { tool: String },

    /// Tool crashed non-deterministically; worth retrying
    #[error("'{command}' failed transiently: {error}")]
    Transient { command: String, error: String },

    /// Tool reported a deterministic failure
    #[error("'{command}' failed: {error}")]
    Permanent { command: String, error: String },

    /// Transient failures survived every attempt
    #[error("'{command}' still failing after {attempts} attempts: {error}")]
    RetriesExhausted {
        command: String,
        attempts: u32,
        error: String,
    },
}

impl ToolError {
    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, ToolError::Transient { .. })
    }
}

/// Binary relocation errors; fatal for the file being processed
#[derive(Error, Debug)]
pub enum RelocationError {
    /// Could not set up the scratch copy
    #[error("Failed to stage '{path}' for relocation: {error}")]
    Stage { path: PathBuf, error: String },

    /// The binary-format edit failed
    #[error("Failed to rewrite search path of '{path}': {source}")]
    Edit {
        path: PathBuf,
        #[source]
        source: ToolError,
    },

    /// The editor reported success but the binary does not carry the new value
    #[error("Search path of '{path}' reads '{found}' after rewriting it to '{expected}'")]
    Unverified {
        path: PathBuf,
        expected: String,
        found: String,
    },

    /// Restoring the original permission bits failed
    #[error("Failed to restore permissions on '{path}': {error}")]
    Permissions { path: PathBuf, error: String },
}

/// Tree assembly errors
#[derive(Error, Debug)]
pub enum AssemblyError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to copy a file into the tree
    #[error("Failed to copy '{from}' to '{to}': {error}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },

    /// Failed to create a symlink
    #[error("Failed to create symlink '{path}': {error}")]
    Symlink { path: PathBuf, error: String },

    /// Failed to remove an entry
    #[error("Failed to remove '{path}': {error}")]
    Remove { path: PathBuf, error: String },

    /// Failed to move the previous tree aside
    #[error("Failed to move existing tree '{path}' aside: {error}")]
    MoveAside { path: PathBuf, error: String },

    /// Destination path escapes the tree
    #[error("Destination '{path}' is not a relative path inside the tree")]
    InvalidDestination { path: PathBuf },
}

/// Closure/manifest cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Package database could not be inspected
    #[error("Failed to read package database '{path}': {error}")]
    Database { path: PathBuf, error: String },

    /// Cache entry could not be written
    #[error("Failed to write cache file '{path}': {error}")]
    Write { path: PathBuf, error: String },

    /// Cache directory could not be removed
    #[error("Failed to remove cache directory '{path}': {error}")]
    Clean { path: PathBuf, error: String },
}

/// Top-level portroot error type
#[derive(Error, Debug)]
pub enum PortrootError {
    /// Config error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// External tool error
    #[error("External tool error: {0}")]
    Tool(#[from] ToolError),

    /// Relocation error
    #[error("Relocation error: {0}")]
    Relocation(#[from] RelocationError),

    /// Assembly error
    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    /// Cache error
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let transient = ToolError::Transient {
            command: "repoquery".to_string(),
            error: "Traceback".to_string(),
        };
        let permanent = ToolError::Permanent {
            command: "repoquery".to_string(),
            error: "No package bogus".to_string(),
        };
        assert!(transient.is_transient());
        assert!(!permanent.is_transient());
    }

    #[test]
    fn test_relocation_error_names_file() {
        let err = RelocationError::Edit {
            path: PathBuf::from("/usr/bin/bash"),
            source: ToolError::Permanent {
                command: "patchelf --set-rpath".to_string(),
                error: "not an ELF executable".to_string(),
            },
        };
        let message = PortrootError::from(err).to_string();
        assert!(message.contains("/usr/bin/bash"));
        assert!(message.contains("patchelf"));
    }
}
