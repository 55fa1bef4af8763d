// src/registry/mod.rs

//! In-memory bundle registry
//!
//! The registry is the installer's catalog of installed bundles, keyed by
//! bundle name, together with the resource list launchers read label and
//! icon ids from. It is rebuilt from the install records at boot
//! ([`scan::scan_packages`]) and only mutated by the installer task.

pub mod models;
pub mod scan;

use crate::error::{Error, Result};
use models::{BundleInfo, BundleRes, InstallSource};
use std::collections::BTreeMap;
use tracing::debug;

/// Catalog of installed bundles
#[derive(Debug, Default)]
pub struct BundleRegistry {
    bundles: BTreeMap<String, BundleInfo>,
    resources: Vec<BundleRes>,
    third_party_count: u32,
}

impl BundleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly installed bundle
    pub fn add(&mut self, info: BundleInfo) -> Result<()> {
        if self.bundles.contains_key(&info.bundle_name) {
            return Err(Error::InternalError(format!(
                "{} is already registered",
                info.bundle_name
            )));
        }
        if !info.has_consistent_code_path() {
            return Err(Error::InternalError(format!(
                "code path {} does not belong to {}",
                info.code_path.display(),
                info.bundle_name
            )));
        }

        if info.source == InstallSource::ThirdParty {
            self.third_party_count += 1;
        }
        debug!("Registered {} version {}", info.bundle_name, info.version_code);
        self.bundles.insert(info.bundle_name.clone(), info);
        Ok(())
    }

    /// Replace a registered bundle, keeping its system-app flag and source
    pub fn update(&mut self, mut info: BundleInfo) -> Result<()> {
        let existing = self.bundles.get_mut(&info.bundle_name).ok_or_else(|| {
            Error::InternalError(format!("{} is not registered", info.bundle_name))
        })?;
        if !info.has_consistent_code_path() {
            return Err(Error::InternalError(format!(
                "code path {} does not belong to {}",
                info.code_path.display(),
                info.bundle_name
            )));
        }

        info.is_system_app = existing.is_system_app;
        info.source = existing.source;
        debug!(
            "Updated {} from version {} to {}",
            info.bundle_name, existing.version_code, info.version_code
        );
        *existing = info;
        Ok(())
    }

    /// Unregister a bundle
    pub fn remove(&mut self, bundle_name: &str) -> Option<BundleInfo> {
        let removed = self.bundles.remove(bundle_name)?;
        if removed.source == InstallSource::ThirdParty {
            self.third_party_count = self.third_party_count.saturating_sub(1);
        }
        debug!("Unregistered {}", bundle_name);
        Some(removed)
    }

    /// Snapshot of a registered bundle
    pub fn query(&self, bundle_name: &str) -> Option<BundleInfo> {
        self.bundles.get(bundle_name).cloned()
    }

    pub fn get(&self, bundle_name: &str) -> Option<&BundleInfo> {
        self.bundles.get(bundle_name)
    }

    pub fn contains(&self, bundle_name: &str) -> bool {
        self.bundles.contains_key(bundle_name)
    }

    /// All bundles, ordered by name
    pub fn list(&self) -> Vec<BundleInfo> {
        self.bundles.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn third_party_count(&self) -> u32 {
        self.third_party_count
    }

    /// Add or replace the resource entry of a bundle
    pub fn add_bundle_res(&mut self, res: BundleRes) {
        self.remove_bundle_res(&res.bundle_name);
        self.resources.push(res);
    }

    pub fn remove_bundle_res(&mut self, bundle_name: &str) -> Option<BundleRes> {
        let index = self
            .resources
            .iter()
            .position(|r| r.bundle_name == bundle_name)?;
        Some(self.resources.remove(index))
    }

    pub fn bundle_res(&self, bundle_name: &str) -> Option<&BundleRes> {
        self.resources.iter().find(|r| r.bundle_name == bundle_name)
    }

    pub fn resources(&self) -> &[BundleRes] {
        &self.resources
    }
}
