// src/installer/mod.rs

//! Installer context and entry points
//!
//! [`InstallerContext`] owns everything an install or uninstall touches:
//! the configuration, the in-memory registry, the on-disk record stores and
//! the external collaborators (signature verifier, permission store,
//! platform hooks). It is owned by exactly one task at a time, see
//! [`service`] for the request queue built around it.

pub mod guard;
mod pipeline;
pub mod progress;
pub mod service;
mod uninstall;

use crate::config::InstallerConfig;
use crate::error::Result;
use crate::permissions::PermissionStore;
use crate::platform::{self, PlatformIo};
use crate::record::uid_gid::UidGidLedger;
use crate::record::uninstalled::UninstalledLedger;
use crate::record::{InstallRecordStore, TEMP_SUFFIX_LEN};
use crate::registry::models::{BundleInfo, InstallSource};
use crate::registry::scan::{self, ScanReport};
use crate::registry::BundleRegistry;
use crate::signature::SignatureVerifier;
use progress::ProgressSink;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::Path;
use tracing::info;

/// Optional bytecode transform run over the extracted tree
///
/// The returned status is stored in the install record.
pub trait BytecodeTransform {
    fn transform(&self, code_dir: &Path, bundle: &BundleInfo) -> Result<i32>;
}

impl<F> BytecodeTransform for F
where
    F: Fn(&Path, &BundleInfo) -> Result<i32>,
{
    fn transform(&self, code_dir: &Path, bundle: &BundleInfo) -> Result<i32> {
        self(code_dir, bundle)
    }
}

/// Random alphanumeric name for temp and backup directories
pub fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TEMP_SUFFIX_LEN)
        .map(char::from)
        .collect()
}

/// All state of the installer
pub struct InstallerContext {
    pub(crate) config: InstallerConfig,
    pub(crate) registry: BundleRegistry,
    pub(crate) records: InstallRecordStore,
    pub(crate) uid_gid: UidGidLedger,
    pub(crate) uninstalled: UninstalledLedger,
    pub(crate) verifier: Box<dyn SignatureVerifier + Send>,
    pub(crate) permissions: Box<dyn PermissionStore + Send>,
    pub(crate) platform: Box<dyn PlatformIo>,
    pub(crate) transform: Option<Box<dyn BytecodeTransform + Send>>,
}

impl InstallerContext {
    /// Create a context with an empty registry
    ///
    /// The platform variant follows `config.platform`; call
    /// [`InstallerContext::boot`] to load the installed bundles.
    pub fn new(
        config: InstallerConfig,
        verifier: Box<dyn SignatureVerifier + Send>,
        permissions: Box<dyn PermissionStore + Send>,
    ) -> Self {
        Self {
            registry: BundleRegistry::new(),
            records: InstallRecordStore::new(&config.json_path),
            uid_gid: UidGidLedger::new(config.uid_gid_ledger_path()),
            uninstalled: UninstalledLedger::new(config.uninstalled_ledger_path()),
            platform: platform::for_kind(config.platform),
            transform: None,
            verifier,
            permissions,
            config,
        }
    }

    pub fn with_platform(mut self, platform: Box<dyn PlatformIo>) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_transform(mut self, transform: Box<dyn BytecodeTransform + Send>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Create the working directories, reload the installed bundles and
    /// install pre-installed system apps that are missing
    pub fn boot(&mut self) -> Result<ScanReport> {
        self.config.ensure_dirs()?;
        let report = scan::scan_packages(self)?;
        info!(
            "Installer ready: {} reloaded, {} installed, {} skipped, {} failed",
            report.reloaded.len(),
            report.installed.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Install or upgrade the package at `path`
    pub fn install(&mut self, path: &Path, progress: &mut dyn ProgressSink) -> Result<BundleInfo> {
        pipeline::install(self, path, progress)
    }

    /// Remove an installed bundle
    pub fn uninstall(&mut self, bundle_name: &str, progress: &mut dyn ProgressSink) -> Result<()> {
        uninstall::uninstall(self, bundle_name, progress)
    }

    /// Re-run the boot reconciliation
    pub fn scan(&mut self) -> Result<ScanReport> {
        scan::scan_packages(self)
    }

    pub fn query(&self, bundle_name: &str) -> Option<BundleInfo> {
        self.registry.query(bundle_name)
    }

    pub fn list(&self) -> Vec<BundleInfo> {
        self.registry.list()
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    pub fn registry(&self) -> &BundleRegistry {
        &self.registry
    }

    pub fn records(&self) -> &InstallRecordStore {
        &self.records
    }

    pub fn uid_gid(&self) -> &UidGidLedger {
        &self.uid_gid
    }

    pub fn uninstalled(&self) -> &UninstalledLedger {
        &self.uninstalled
    }

    /// Where a package installs from, decided by its location
    pub fn install_source(&self, path: &Path) -> InstallSource {
        if path.starts_with(&self.config.system_bundle_path) {
            InstallSource::System
        } else if path.starts_with(&self.config.third_system_bundle_path) {
            InstallSource::ThirdSystem
        } else {
            InstallSource::ThirdParty
        }
    }
}
