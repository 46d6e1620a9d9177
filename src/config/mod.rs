//! Configuration and constants
//!
//! - [`defaults`] - Default values and fixed constants
//! - [`settings`] - Typed `portroot.toml` schema, loading and validation

pub mod defaults;
pub mod settings;
