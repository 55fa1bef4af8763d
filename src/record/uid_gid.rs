// src/record/uid_gid.rs

//! UID/GID assignment ledger
//!
//! A single JSON document `{count, records: [{bundleName, uid, gid}]}`.
//! `count` always equals the number of records; when the last record is
//! removed the file itself is deleted.

use crate::error::{Error, Result};
use crate::record::write_json_atomic;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// First id handed out to bundles
pub const BASE_APP_UID: u32 = 10000;

/// Ids are never assigned at or above this value
pub const MAX_APP_UID: u32 = 65534;

/// One assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UidGid {
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UidGidRecord {
    pub bundle_name: String,
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UidGidDocument {
    pub count: usize,
    pub records: Vec<UidGidRecord>,
}

/// Ledger file handle
#[derive(Debug, Clone)]
pub struct UidGidLedger {
    path: PathBuf,
}

impl UidGidLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document; a missing file is an empty ledger
    pub fn load(&self) -> Result<UidGidDocument> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(UidGidDocument::default()),
            Err(e) => {
                return Err(Error::RecordInfoError(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let mut doc: UidGidDocument = serde_json::from_str(&content).map_err(|e| {
            Error::RecordInfoError(format!("Failed to parse {}: {}", self.path.display(), e))
        })?;

        if doc.count != doc.records.len() {
            warn!(
                "uid/gid ledger count {} does not match {} records, using record count",
                doc.count,
                doc.records.len()
            );
            doc.count = doc.records.len();
        }
        Ok(doc)
    }

    fn write(&self, doc: &UidGidDocument) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| Error::RecordInfoError("uid/gid ledger has no parent".to_string()))?;
        let prefix = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("uid_gid");

        fs::create_dir_all(dir)
            .map_err(|e| Error::RecordInfoError(format!("Failed to create {}: {}", dir.display(), e)))?;

        write_json_atomic(dir, prefix, doc)
            .and_then(|tmp| tmp.persist(&self.path).map(|_| ()).map_err(|e| Error::Io(e.error)))
            .map_err(|e| {
                Error::RecordInfoError(format!("Failed to write {}: {}", self.path.display(), e))
            })
    }

    /// Look up the assignment of a bundle
    pub fn get(&self, bundle_name: &str) -> Result<Option<UidGid>> {
        let doc = self.load()?;
        Ok(doc
            .records
            .iter()
            .find(|r| r.bundle_name == bundle_name)
            .map(|r| UidGid { uid: r.uid, gid: r.gid }))
    }

    /// Return the existing assignment of a bundle or create a new one
    ///
    /// The flag is true when a new entry was appended.
    pub fn assign(&self, bundle_name: &str) -> Result<(UidGid, bool)> {
        let mut doc = self.load()?;

        if let Some(existing) = doc.records.iter().find(|r| r.bundle_name == bundle_name) {
            return Ok((
                UidGid {
                    uid: existing.uid,
                    gid: existing.gid,
                },
                false,
            ));
        }

        let uid = (BASE_APP_UID..MAX_APP_UID)
            .find(|candidate| doc.records.iter().all(|r| r.uid != *candidate))
            .ok_or_else(|| Error::RecordInfoError("no free uid left".to_string()))?;

        doc.records.push(UidGidRecord {
            bundle_name: bundle_name.to_string(),
            uid,
            gid: uid,
        });
        doc.count = doc.records.len();
        self.write(&doc)?;

        debug!("Assigned uid/gid {} to {}", uid, bundle_name);
        Ok((UidGid { uid, gid: uid }, true))
    }

    /// Remove the first entry of a bundle
    ///
    /// Returns whether an entry was removed. The ledger file is deleted once
    /// it would become empty.
    pub fn delete(&self, bundle_name: &str) -> Result<bool> {
        let mut doc = self.load()?;

        let Some(index) = doc.records.iter().position(|r| r.bundle_name == bundle_name) else {
            return Ok(false);
        };
        doc.records.remove(index);
        doc.count -= 1;

        if doc.count == 0 {
            match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Error::DeleteRecordInfoError(format!(
                        "Failed to delete {}: {}",
                        self.path.display(),
                        e
                    )));
                }
            }
        } else {
            self.write(&doc)
                .map_err(|e| Error::DeleteRecordInfoError(e.to_string()))?;
        }

        debug!("Released uid/gid of {}", bundle_name);
        Ok(true)
    }
}
