// src/config.rs

//! Installer configuration
//!
//! All filesystem roots and limits the installer works with. A config is
//! either derived from a root directory ([`InstallerConfig::with_root`]) or
//! loaded from a JSON file where every field is optional.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default maximum number of third-party bundles
pub const MAX_THIRD_BUNDLE_NUMBER: u32 = 20;

/// Bundle names shorter than this are rejected
pub const MIN_BUNDLE_NAME_LEN: usize = 7;

/// Bundle names longer than this are rejected
pub const MAX_BUNDLE_NAME_LEN: usize = 127;

/// Upper bound for the in-memory profile entry
pub const MAX_PROFILE_SIZE: u64 = 1024 * 1024;

/// Directory raw resource files are moved to, inside a bundle's data directory
pub const RAW_FILE_DIR: &str = "rawfile";

const UID_GID_LEDGER_NAME: &str = "uid_gid.json";
const UNINSTALLED_LEDGER_NAME: &str = "uninstalled_delbundle.json";

/// Which platform variant the installer runs as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    /// Small-footprint variant: no uid/gid ledger, no ownership changes
    #[default]
    Lite,
    /// Full variant: per-bundle uid/gid and directory ownership
    Linux,
}

impl std::str::FromStr for PlatformKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "lite" => Ok(PlatformKind::Lite),
            "linux" => Ok(PlatformKind::Linux),
            _ => Err(format!("Invalid platform: {}", s)),
        }
    }
}

/// Filesystem layout and limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstallerConfig {
    /// Parent of every bundle code directory
    pub install_path: PathBuf,
    /// Parent of every bundle data directory
    pub data_path: PathBuf,
    /// Install records and ledgers
    pub json_path: PathBuf,
    /// Permission store directory
    pub permissions_path: PathBuf,
    /// Pre-installed, non-uninstallable system apps
    pub system_bundle_path: PathBuf,
    /// Pre-installed, uninstallable system apps
    pub third_system_bundle_path: PathBuf,
    pub max_third_bundle_number: u32,
    pub min_bundle_name_len: usize,
    pub max_bundle_name_len: usize,
    pub max_profile_size: u64,
    /// Permissions that must be granted by the signature
    pub restricted_permissions: Vec<String>,
    pub platform: PlatformKind,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self::with_root("/")
    }
}

impl InstallerConfig {
    /// Derive every path under `root`
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            install_path: root.join("storage/app/run"),
            data_path: root.join("storage/app/data"),
            json_path: root.join("storage/app/etc/bundles"),
            permissions_path: root.join("storage/app/etc/permissions"),
            system_bundle_path: root.join("system/internal"),
            third_system_bundle_path: root.join("system/external"),
            max_third_bundle_number: MAX_THIRD_BUNDLE_NUMBER,
            min_bundle_name_len: MIN_BUNDLE_NAME_LEN,
            max_bundle_name_len: MAX_BUNDLE_NAME_LEN,
            max_profile_size: MAX_PROFILE_SIZE,
            restricted_permissions: Vec::new(),
            platform: PlatformKind::default(),
        }
    }

    /// Load a config from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading installer config from {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Code directory of a bundle
    pub fn code_path(&self, bundle_name: &str) -> PathBuf {
        self.install_path.join(bundle_name)
    }

    /// Data directory of a bundle
    pub fn bundle_data_path(&self, bundle_name: &str) -> PathBuf {
        self.data_path.join(bundle_name)
    }

    /// Raw resource files of a bundle
    pub fn raw_file_path(&self, bundle_name: &str) -> PathBuf {
        self.bundle_data_path(bundle_name).join(RAW_FILE_DIR)
    }

    /// Canonical install record of a bundle
    pub fn record_path(&self, bundle_name: &str) -> PathBuf {
        self.json_path.join(format!("{}.json", bundle_name))
    }

    pub fn uid_gid_ledger_path(&self) -> PathBuf {
        self.json_path.join(UID_GID_LEDGER_NAME)
    }

    pub fn uninstalled_ledger_path(&self) -> PathBuf {
        self.json_path.join(UNINSTALLED_LEDGER_NAME)
    }

    /// Whether `name` is one of the ledger files living next to the records
    pub fn is_ledger_file(&self, name: &str) -> bool {
        name == UID_GID_LEDGER_NAME || name == UNINSTALLED_LEDGER_NAME
    }

    /// Create every directory the installer writes into
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            &self.install_path,
            &self.data_path,
            &self.json_path,
            &self.permissions_path,
        ] {
            std::fs::create_dir_all(dir).map_err(|e| {
                Error::Config(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_root_layout() {
        let config = InstallerConfig::with_root("/tmp/dev");
        assert_eq!(config.install_path, PathBuf::from("/tmp/dev/storage/app/run"));
        assert_eq!(
            config.record_path("com.example.app"),
            PathBuf::from("/tmp/dev/storage/app/etc/bundles/com.example.app.json")
        );
        assert_eq!(
            config.code_path("com.example.app"),
            PathBuf::from("/tmp/dev/storage/app/run/com.example.app")
        );
        assert!(config.is_ledger_file("uid_gid.json"));
        assert!(!config.is_ledger_file("com.example.app.json"));
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("installer.json");
        std::fs::write(
            &path,
            r#"{ "maxThirdBundleNumber": 3, "platform": "linux", "installPath": "/apps" }"#,
        )
        .unwrap();

        let config = InstallerConfig::load(&path).unwrap();
        assert_eq!(config.max_third_bundle_number, 3);
        assert_eq!(config.platform, PlatformKind::Linux);
        assert_eq!(config.install_path, PathBuf::from("/apps"));
        assert_eq!(config.min_bundle_name_len, MIN_BUNDLE_NAME_LEN);
    }

    #[test]
    fn test_load_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("installer.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = InstallerConfig::load(&path);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_platform_from_str() {
        assert_eq!("linux".parse::<PlatformKind>(), Ok(PlatformKind::Linux));
        assert_eq!("lite".parse::<PlatformKind>(), Ok(PlatformKind::Lite));
        assert!("windows".parse::<PlatformKind>().is_err());
    }

    #[test]
    fn test_ensure_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let config = InstallerConfig::with_root(dir.path());
        config.ensure_dirs().unwrap();
        assert!(config.install_path.is_dir());
        assert!(config.json_path.is_dir());
    }
}
