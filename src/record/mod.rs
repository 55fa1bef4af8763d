// src/record/mod.rs

//! On-disk install records and ledgers
//!
//! Every installed bundle has a JSON record at `<json_path>/<bundle>.json`.
//! Records are written in two phases: the document is first written to a
//! randomized temp name next to the canonical one ([`StagedRecord`]), and
//! only renamed into place once the code directory has been committed.
//! A staged record that is dropped without being committed is deleted.
//!
//! Temp names end in `.json.tmp`, which no canonical `<bundle>.json` name
//! can end in.

pub mod uid_gid;
pub mod uninstalled;

use crate::error::{Error, Result};
use crate::registry::models::{BundleInfo, InstallSource};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Length of the random part of temp file and directory names
pub const TEMP_SUFFIX_LEN: usize = 16;

/// Trailing part of every temp document name
pub const TEMP_JSON_SUFFIX: &str = ".json.tmp";

/// Write `value` as JSON to `<dir>/<prefix>.<random>.json.tmp`
///
/// The returned temp file is removed on drop unless persisted.
pub fn write_json_atomic<T: Serialize>(dir: &Path, prefix: &str, value: &T) -> Result<NamedTempFile> {
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!("{}.", prefix))
        .suffix(TEMP_JSON_SUFFIX)
        .rand_bytes(TEMP_SUFFIX_LEN)
        .tempfile_in(dir)?;

    serde_json::to_writer_pretty(tmp.as_file_mut(), value)?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

/// Whether `file_name` is a temp document written for `prefix`
pub fn is_temp_json_for(file_name: &str, prefix: &str) -> bool {
    file_name
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('.'))
        .and_then(|rest| rest.strip_suffix(TEMP_JSON_SUFFIX))
        .is_some_and(is_random_suffix)
}

/// Whether `file_name` looks like any temp document (`<x>.<random>.json.tmp`)
pub fn looks_like_temp_json(file_name: &str) -> bool {
    file_name
        .strip_suffix(TEMP_JSON_SUFFIX)
        .and_then(|stem| stem.rsplit_once('.'))
        .is_some_and(|(_, suffix)| is_random_suffix(suffix))
}

/// Whether `suffix` has the shape of a generated random suffix
pub fn is_random_suffix(suffix: &str) -> bool {
    suffix.len() == TEMP_SUFFIX_LEN && suffix.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Persisted metadata of an installed bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRecord {
    pub bundle_name: String,
    pub code_path: PathBuf,
    pub app_id: String,
    pub version_code: u32,
    #[serde(default)]
    pub version_name: String,
    pub source: InstallSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform_result: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<String>,
}

impl InstallRecord {
    /// Build the record of a freshly installed bundle
    pub fn from_bundle(info: &BundleInfo, transform_result: Option<i32>) -> Self {
        Self {
            bundle_name: info.bundle_name.clone(),
            code_path: info.code_path.clone(),
            app_id: info.app_id.clone(),
            version_code: info.version_code,
            version_name: info.version_name.clone(),
            source: info.source,
            transform_result,
            installed_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }
}

/// A record written under its temp name, not yet visible
#[derive(Debug)]
pub struct StagedRecord {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl StagedRecord {
    pub fn temp_path(&self) -> &Path {
        self.tmp.path()
    }

    /// Rename the temp document onto the canonical record path
    pub fn commit(self) -> Result<()> {
        let target = self.target;
        self.tmp.persist(&target).map_err(|e| {
            Error::RecordInfoError(format!("Failed to rename record to {}: {}", target.display(), e.error))
        })?;
        debug!("Committed install record {}", target.display());
        Ok(())
    }
}

/// Result of walking the record directory
#[derive(Debug, Default)]
pub struct RecordScan {
    pub records: Vec<InstallRecord>,
    /// Temp documents left behind by an interrupted install
    pub stale: Vec<PathBuf>,
}

/// JSON install records, one file per bundle
#[derive(Debug, Clone)]
pub struct InstallRecordStore {
    dir: PathBuf,
}

impl InstallRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, bundle_name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", bundle_name))
    }

    /// Write a record under a temp name (phase one)
    pub fn stage(&self, record: &InstallRecord) -> Result<StagedRecord> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            Error::RecordInfoError(format!("Failed to create {}: {}", self.dir.display(), e))
        })?;
        self.remove_temp_files(&record.bundle_name);

        let tmp = write_json_atomic(&self.dir, &record.bundle_name, record).map_err(|e| {
            Error::RecordInfoError(format!("Failed to write record of {}: {}", record.bundle_name, e))
        })?;

        Ok(StagedRecord {
            tmp,
            target: self.record_path(&record.bundle_name),
        })
    }

    /// Write a record and commit it immediately
    pub fn store(&self, record: &InstallRecord) -> Result<()> {
        self.stage(record)?.commit()
    }

    /// Load the canonical record of a bundle
    pub fn load(&self, bundle_name: &str) -> Result<Option<InstallRecord>> {
        let path = self.record_path(bundle_name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::RecordInfoError(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let record = serde_json::from_str(&content).map_err(|e| {
            Error::RecordInfoError(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        Ok(Some(record))
    }

    /// Remove the record of a bundle, temp documents included
    ///
    /// A missing record is not an error.
    pub fn delete(&self, bundle_name: &str) -> Result<()> {
        self.remove_temp_files(bundle_name);

        let path = self.record_path(bundle_name);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Deleted install record {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::DeleteRecordInfoError(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Walk the record directory
    ///
    /// `is_reserved` names files that share the directory but are not
    /// records (the ledgers).
    pub fn scan(&self, is_reserved: impl Fn(&str) -> bool) -> Result<RecordScan> {
        let mut scan = RecordScan::default();

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(scan),
            Err(e) => return Err(Error::Io(e)),
        };

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !path.is_file() {
                continue;
            }
            if looks_like_temp_json(file_name) {
                scan.stale.push(path);
                continue;
            }
            if !file_name.ends_with(".json") || is_reserved(file_name) {
                continue;
            }

            let parsed = fs::read_to_string(&path)
                .ok()
                .and_then(|content| serde_json::from_str::<InstallRecord>(&content).ok());

            match parsed {
                Some(record) if file_name == format!("{}.json", record.bundle_name) => {
                    scan.records.push(record);
                }
                _ => warn!("Ignoring unrecognized file {}", path.display()),
            }
        }

        scan.records.sort_by(|a, b| a.bundle_name.cmp(&b.bundle_name));
        Ok(scan)
    }

    fn remove_temp_files(&self, bundle_name: &str) {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return;
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if is_temp_json_for(name, bundle_name) {
                if let Err(e) = fs::remove_file(entry.path()) {
                    warn!("Failed to remove stale record {}: {}", name, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, version: u32) -> InstallRecord {
        InstallRecord {
            bundle_name: name.to_string(),
            code_path: PathBuf::from("/storage/app/run").join(name),
            app_id: format!("{}_ABCDEF", name),
            version_code: version,
            version_name: format!("{}.0", version),
            source: InstallSource::ThirdParty,
            transform_result: None,
            installed_at: None,
        }
    }

    #[test]
    fn test_temp_name_matching() {
        assert!(is_temp_json_for("com.example.app.AbCdEf0123456789.json.tmp", "com.example.app"));
        assert!(!is_temp_json_for("com.example.app.json", "com.example.app"));
        assert!(!is_temp_json_for("com.example.app.short.json.tmp", "com.example.app"));
        assert!(!is_temp_json_for("com.example.other.AbCdEf0123456789.json.tmp", "com.example.app"));
        // canonical record of a bundle whose name ends in 16 alphanumerics
        assert!(!is_temp_json_for("com.example.app.AbCdEf0123456789.json", "com.example.app"));
        assert!(looks_like_temp_json("x.AbCdEf0123456789.json.tmp"));
        assert!(!looks_like_temp_json("x.AbCdEf0123456789.json"));
        assert!(!looks_like_temp_json("uid_gid.json"));
    }

    #[test]
    fn test_staged_record_invisible_until_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = InstallRecordStore::new(dir.path());
        let rec = record("com.example.app", 1);

        let staged = store.stage(&rec).unwrap();
        let temp_name = staged.temp_path().file_name().unwrap().to_str().unwrap().to_string();
        assert!(is_temp_json_for(&temp_name, "com.example.app"));
        assert_eq!(store.load("com.example.app").unwrap(), None);

        staged.commit().unwrap();
        assert_eq!(store.load("com.example.app").unwrap(), Some(rec));
        assert!(!dir.path().join(temp_name).exists());
    }

    #[test]
    fn test_dropped_stage_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = InstallRecordStore::new(dir.path());

        let staged = store.stage(&record("com.example.app", 1)).unwrap();
        let temp = staged.temp_path().to_path_buf();
        assert!(temp.exists());
        drop(staged);

        assert!(!temp.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_store_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = InstallRecordStore::new(dir.path());

        store.store(&record("com.example.app", 1)).unwrap();
        store.store(&record("com.example.app", 2)).unwrap();

        let loaded = store.load("com.example.app").unwrap().unwrap();
        assert_eq!(loaded.version_code, 2);
    }

    #[test]
    fn test_delete_removes_temp_and_canonical() {
        let dir = tempfile::tempdir().unwrap();
        let store = InstallRecordStore::new(dir.path());
        store.store(&record("com.example.app", 1)).unwrap();
        fs::write(dir.path().join("com.example.app.AbCdEf0123456789.json.tmp"), "{").unwrap();

        store.delete("com.example.app").unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

        // missing record is fine
        store.delete("com.example.app").unwrap();
    }

    #[test]
    fn test_scan_sorts_records_and_finds_stale() {
        let dir = tempfile::tempdir().unwrap();
        let store = InstallRecordStore::new(dir.path());
        store.store(&record("com.example.bbb", 1)).unwrap();
        store.store(&record("com.example.aaa", 1)).unwrap();
        fs::write(dir.path().join("com.example.ccc.AbCdEf0123456789.json.tmp"), "{trunc").unwrap();
        fs::write(dir.path().join("uid_gid.json"), r#"{"count":0,"records":[]}"#).unwrap();

        let scan = store.scan(|name| name == "uid_gid.json").unwrap();
        let names: Vec<_> = scan.records.iter().map(|r| r.bundle_name.as_str()).collect();
        assert_eq!(names, vec!["com.example.aaa", "com.example.bbb"]);
        assert_eq!(scan.stale.len(), 1);
    }

    #[test]
    fn test_similar_bundle_names_keep_their_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = InstallRecordStore::new(dir.path());
        let longer = "com.example.notes.AbCdEf0123456789";
        store.store(&record(longer, 1)).unwrap();

        store.store(&record("com.example.notes", 1)).unwrap();
        assert_eq!(store.load(longer).unwrap().unwrap().bundle_name, longer);

        store.delete("com.example.notes").unwrap();
        assert!(store.load(longer).unwrap().is_some());

        let scan = store.scan(|_| false).unwrap();
        assert_eq!(scan.records.len(), 1);
        assert!(scan.stale.is_empty());
    }

    #[test]
    fn test_scan_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = InstallRecordStore::new(dir.path().join("nope"));
        let scan = store.scan(|_| false).unwrap();
        assert!(scan.records.is_empty());
    }

    #[test]
    fn test_from_bundle_sets_timestamp() {
        let mut info = BundleInfo::new("com.example.app".to_string(), 4);
        info.app_id = "com.example.app_KEY".to_string();
        let rec = InstallRecord::from_bundle(&info, Some(0));
        assert_eq!(rec.version_code, 4);
        assert_eq!(rec.transform_result, Some(0));
        assert!(rec.installed_at.is_some());
    }
}
