// src/lib.rs

//! HAP Package Installer
//!
//! On-device installer for HAP application packages: decodes the binary
//! container, verifies and installs bundles with full rollback on failure,
//! and keeps the bundle registry consistent with the filesystem across
//! restarts.
//!
//! # Architecture
//!
//! - Single installer task: one [`installer::InstallerContext`] owns all state,
//!   requests are serialized through [`installer::service`]
//! - Transactional installs: extraction into a temp directory, RAII rollback
//!   guards, two-phase JSON record commit
//! - Registry in memory, records on disk: the registry is rebuilt from the
//!   install records at boot
//! - Platform variants behind a trait: `lite` (no ownership tracking) and
//!   `linux` (per-bundle uid/gid)

pub mod config;
mod error;
pub mod installer;
pub mod packages;
pub mod permissions;
pub mod platform;
pub mod record;
pub mod registry;
pub mod signature;

pub use error::{Error, Result};
