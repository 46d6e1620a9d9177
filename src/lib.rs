//! Portroot - relocatable runtime image builder
//!
//! Copies a dynamically linked program stack out of the host package
//! database into a directory tree that keeps working after it is moved,
//! by rewriting every binary's library search path relative to `$ORIGIN`.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Classification, resolution, relocation planning, reporting
//! - [`infra`] - Infrastructure layer (processes, filesystem, ELF headers)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
