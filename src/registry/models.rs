// src/registry/models.rs

//! Data models for installed bundles
//!
//! `BundleInfo` is the registry's view of an installed package; `BundleRes`
//! is the matching entry of the resource list (label and icon ids used by
//! launchers).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Where a bundle was installed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallSource {
    /// Pre-installed, never uninstallable
    System,
    /// Pre-installed, uninstallable and remembered once uninstalled
    ThirdSystem,
    /// Installed by the user, counts against the bundle limit
    ThirdParty,
}

impl InstallSource {
    pub fn as_str(&self) -> &str {
        match self {
            InstallSource::System => "system",
            InstallSource::ThirdSystem => "third-system",
            InstallSource::ThirdParty => "third-party",
        }
    }

    pub fn is_system_app(&self) -> bool {
        matches!(self, InstallSource::System)
    }
}

impl FromStr for InstallSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "system" => Ok(InstallSource::System),
            "third-system" => Ok(InstallSource::ThirdSystem),
            "third-party" => Ok(InstallSource::ThirdParty),
            _ => Err(format!("Invalid install source: {}", s)),
        }
    }
}

/// An ability declared by a module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityInfo {
    pub name: String,
    pub label: Option<String>,
    pub icon: Option<String>,
    pub label_id: u32,
    pub icon_id: u32,
    pub visible: bool,
    pub src_path: Option<String>,
}

/// A module of a bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub module_name: String,
    pub module_type: String,
    pub device_types: Vec<String>,
    pub abilities: Vec<AbilityInfo>,
}

/// An installed bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleInfo {
    pub bundle_name: String,
    pub vendor: Option<String>,
    pub version_code: u32,
    pub version_name: String,
    pub compatible_api: u32,
    pub target_api: u32,
    pub code_path: PathBuf,
    pub data_path: PathBuf,
    pub app_id: String,
    pub is_system_app: bool,
    pub source: InstallSource,
    pub label_id: u32,
    pub icon_id: u32,
    pub modules: Vec<ModuleInfo>,
}

impl BundleInfo {
    /// Create a BundleInfo with everything but name and version defaulted
    pub fn new(bundle_name: String, version_code: u32) -> Self {
        Self {
            bundle_name,
            vendor: None,
            version_code,
            version_name: String::new(),
            compatible_api: 0,
            target_api: 0,
            code_path: PathBuf::new(),
            data_path: PathBuf::new(),
            app_id: String::new(),
            is_system_app: false,
            source: InstallSource::ThirdParty,
            label_id: 0,
            icon_id: 0,
            modules: Vec::new(),
        }
    }

    /// Name of the first module, which owns the bundle's resources
    pub fn main_module(&self) -> Option<&ModuleInfo> {
        self.modules.first()
    }

    /// The code directory must be named after the bundle
    pub fn has_consistent_code_path(&self) -> bool {
        self.code_path
            .file_name()
            .is_some_and(|name| name == self.bundle_name.as_str())
    }
}

/// Label/icon ids of one ability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityRes {
    pub name: String,
    pub label_id: u32,
    pub icon_id: u32,
}

/// Resource list entry of a bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRes {
    pub bundle_name: String,
    pub module_name: String,
    pub label_id: u32,
    pub icon_id: u32,
    pub abilities: Vec<AbilityRes>,
}
