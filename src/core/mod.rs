//! Core logic
//!
//! Decisions live here; side effects are reached through the seams
//! ([`candidate::FormatSniffer`], [`closure::PackageQuery`],
//! [`relocate::BinaryEditor`]) implemented in [`crate::infra`].
//!
//! # Submodules
//!
//! - [`rules`] - Explicit classification rules and their usage counters
//! - [`classify`] - Classification policy and image paths
//! - [`candidate`] - Candidate paths and detected formats
//! - [`request`] - Package requests and closure filtering
//! - [`cache`] - Content-addressed closure/manifest cache
//! - [`closure`] - Closure and manifest resolution
//! - [`relocate`] - Search-path rewriting and loader propagation
//! - [`report`] - Per-file outcomes and the run report
//! - [`pipeline`] - Image build sequencing

pub mod cache;
pub mod candidate;
pub mod classify;
pub mod closure;
pub mod pipeline;
pub mod relocate;
pub mod report;
pub mod request;
pub mod rules;
