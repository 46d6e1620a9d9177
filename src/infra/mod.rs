//! Infrastructure layer
//!
//! Handles all I/O operations: external processes, the filesystem tree and
//! binary headers. This module is the only place where side effects occur.

pub mod dirs;
pub mod elf;
pub mod patchelf;
pub mod process;
pub mod rpm;
pub mod tree;
