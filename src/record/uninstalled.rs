// src/record/uninstalled.rs

//! Ledger of third-system bundles the user uninstalled
//!
//! Pre-installed third-system apps are reinstalled by the boot scan unless
//! they appear here.

use crate::error::{Error, Result};
use crate::record::write_json_atomic;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UninstalledDocument {
    bundle_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UninstalledLedger {
    path: PathBuf,
}

impl UninstalledLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<UninstalledDocument> {
        match fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                Error::RecordInfoError(format!("Failed to parse {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(UninstalledDocument::default()),
            Err(e) => Err(Error::RecordInfoError(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn write(&self, doc: &UninstalledDocument) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| Error::RecordInfoError("uninstalled ledger has no parent".to_string()))?;
        fs::create_dir_all(dir)
            .map_err(|e| Error::RecordInfoError(format!("Failed to create {}: {}", dir.display(), e)))?;

        write_json_atomic(dir, "uninstalled_delbundle", doc)
            .and_then(|tmp| tmp.persist(&self.path).map(|_| ()).map_err(|e| Error::Io(e.error)))
            .map_err(|e| {
                Error::RecordInfoError(format!("Failed to write {}: {}", self.path.display(), e))
            })
    }

    /// All bundle names in the ledger
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self.load()?.bundle_names)
    }

    pub fn contains(&self, bundle_name: &str) -> Result<bool> {
        Ok(self.load()?.bundle_names.iter().any(|n| n == bundle_name))
    }

    /// Remember that a bundle was uninstalled
    pub fn add(&self, bundle_name: &str) -> Result<()> {
        let mut doc = self.load()?;
        if doc.bundle_names.iter().any(|n| n == bundle_name) {
            return Ok(());
        }
        doc.bundle_names.push(bundle_name.to_string());
        self.write(&doc)?;
        debug!("Marked {} as uninstalled", bundle_name);
        Ok(())
    }

    /// Forget a bundle (it was installed again)
    pub fn remove(&self, bundle_name: &str) -> Result<()> {
        let mut doc = self.load()?;
        let before = doc.bundle_names.len();
        doc.bundle_names.retain(|n| n != bundle_name);
        if doc.bundle_names.len() == before {
            return Ok(());
        }

        if doc.bundle_names.is_empty() {
            match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(Error::RecordInfoError(format!(
                    "Failed to delete {}: {}",
                    self.path.display(),
                    e
                ))),
            }
        } else {
            self.write(&doc)
        }
    }
}
