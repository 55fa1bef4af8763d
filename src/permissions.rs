// src/permissions.rs

//! Permission store interface
//!
//! The installer hands the permissions a bundle requested (and was allowed
//! to request) to a [`PermissionStore`]. [`JsonPermissionStore`] keeps one
//! JSON document per bundle below the configured permissions directory.

use crate::error::{Error, Result};
use crate::record::write_json_atomic;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

/// A permission requested by a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub name: String,
    pub reason: Option<String>,
    /// Abilities the permission is used by
    #[serde(default)]
    pub abilities: Vec<String>,
    /// When the permission is used ("always" / "inuse")
    pub when: Option<String>,
}

impl Permission {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: None,
            abilities: Vec::new(),
            when: None,
        }
    }
}

/// Persistent permission storage consumed by the installer
pub trait PermissionStore {
    /// Save (or replace, when `is_update`) the permissions of a bundle
    fn save(&mut self, bundle_name: &str, permissions: &[Permission], is_update: bool)
        -> Result<()>;

    /// Remove every permission of a bundle
    fn delete(&mut self, bundle_name: &str) -> Result<()>;

    /// Permissions currently stored for a bundle, `None` if it has none
    fn load(&self, bundle_name: &str) -> Result<Option<Vec<Permission>>>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PermissionDocument {
    bundle_name: String,
    permissions: Vec<Permission>,
}

/// One JSON file per bundle
#[derive(Debug, Clone)]
pub struct JsonPermissionStore {
    dir: PathBuf,
}

impl JsonPermissionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, bundle_name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", bundle_name))
    }
}

impl PermissionStore for JsonPermissionStore {
    fn save(
        &mut self,
        bundle_name: &str,
        permissions: &[Permission],
        is_update: bool,
    ) -> Result<()> {
        debug!(
            "Storing {} permissions for {} (update: {})",
            permissions.len(),
            bundle_name,
            is_update
        );

        fs::create_dir_all(&self.dir).map_err(|e| {
            Error::StorePermissionsError(format!("Failed to create {}: {}", self.dir.display(), e))
        })?;

        let doc = PermissionDocument {
            bundle_name: bundle_name.to_string(),
            permissions: permissions.to_vec(),
        };
        write_json_atomic(&self.dir, bundle_name, &doc)
            .and_then(|tmp| {
                tmp.persist(self.path(bundle_name))
                    .map(|_| ())
                    .map_err(|e| Error::Io(e.error))
            })
            .map_err(|e| Error::StorePermissionsError(format!("{}: {}", bundle_name, e)))
    }

    fn delete(&mut self, bundle_name: &str) -> Result<()> {
        match fs::remove_file(self.path(bundle_name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::DeletePermissionsError(format!("{}: {}", bundle_name, e))),
        }
    }

    fn load(&self, bundle_name: &str) -> Result<Option<Vec<Permission>>> {
        let path = self.path(bundle_name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };
        let doc: PermissionDocument = serde_json::from_str(&content)?;
        Ok(Some(doc.permissions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonPermissionStore::new(dir.path().join("permissions"));

        let mut camera = Permission::new("ohos.permission.CAMERA");
        camera.reason = Some("scan codes".to_string());
        store
            .save("com.example.app", &[camera.clone()], false)
            .unwrap();

        assert_eq!(store.load("com.example.app").unwrap(), Some(vec![camera]));

        store.save("com.example.app", &[], true).unwrap();
        assert_eq!(store.load("com.example.app").unwrap(), Some(vec![]));

        store.delete("com.example.app").unwrap();
        assert_eq!(store.load("com.example.app").unwrap(), None);

        // deleting twice is fine
        store.delete("com.example.app").unwrap();
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonPermissionStore::new(dir.path());
        store
            .save("com.example.app", &[Permission::new("ohos.permission.INTERNET")], false)
            .unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["com.example.app.json".to_string()]);
    }
}
