// src/installer/guard.rs

//! Rollback guards
//!
//! Each guard owns one piece of filesystem state an install creates and
//! undoes it on drop unless it was disarmed. A failed install simply
//! returns early and lets the guards unwind in reverse creation order.
//!
//! Backups live next to the directory they replace as
//! `<name>.<random>.bak`, so a backup orphaned by a crash can still be
//! traced to its owner at the next boot.

use super::random_suffix;
use crate::record::is_random_suffix;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const BACKUP_SUFFIX: &str = ".bak";

pub(crate) fn remove_tree(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Fresh backup location for `original`, in the same directory
pub fn backup_path_for(original: &Path) -> PathBuf {
    let name = original
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    original.with_file_name(format!("{}.{}{}", name, random_suffix(), BACKUP_SUFFIX))
}

/// Whether `file_name` is a backup of the entry named `original_name`
pub fn is_backup_of(file_name: &str, original_name: &str) -> bool {
    file_name
        .strip_prefix(original_name)
        .and_then(|rest| rest.strip_prefix('.'))
        .and_then(|rest| rest.strip_suffix(BACKUP_SUFFIX))
        .is_some_and(is_random_suffix)
}

/// Whether `file_name` has the shape of any backup
pub fn is_backup_name(file_name: &str) -> bool {
    file_name
        .strip_suffix(BACKUP_SUFFIX)
        .and_then(|stem| stem.rsplit_once('.'))
        .is_some_and(|(owner, suffix)| !owner.is_empty() && is_random_suffix(suffix))
}

/// Backup directories of `original` present next to it, sorted by name
///
/// Entries for which `skip` returns true are ignored.
pub fn find_backups(original: &Path, skip: impl Fn(&str) -> bool) -> Vec<PathBuf> {
    let (Some(parent), Some(name)) = (original.parent(), original.file_name()) else {
        return Vec::new();
    };
    let name = name.to_string_lossy();
    let Ok(entries) = fs::read_dir(parent) else {
        return Vec::new();
    };

    let mut found: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            is_backup_of(&file_name, &name) && !skip(&file_name) && entry.path().is_dir()
        })
        .map(|entry| entry.path())
        .collect();
    found.sort();
    found
}

/// Replace whatever lives at `original` with `backup`
pub fn restore_backup(backup: &Path, original: &Path) -> io::Result<()> {
    remove_tree(original)?;
    fs::rename(backup, original)?;
    debug!("Restored {} from {}", original.display(), backup.display());
    Ok(())
}

/// Removes a directory tree on drop
#[derive(Debug)]
pub struct DirGuard {
    path: PathBuf,
    armed: bool,
}

impl DirGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the directory
    pub fn disarm(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        debug!("Rolling back {}", self.path.display());
        if let Err(e) = remove_tree(&self.path) {
            warn!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}

/// An existing directory moved aside to a backup location
///
/// Dropping the guard puts the backup back in place, replacing whatever
/// now lives at the original path. [`BackupGuard::commit`] deletes the
/// backup instead.
#[derive(Debug)]
pub struct BackupGuard {
    original: PathBuf,
    backup: PathBuf,
    armed: bool,
}

impl BackupGuard {
    /// Move `original` to a fresh [`backup_path_for`] location
    pub fn new(original: &Path) -> io::Result<Self> {
        Self::move_aside(original, backup_path_for(original))
    }

    pub fn move_aside(original: &Path, backup: PathBuf) -> io::Result<Self> {
        fs::rename(original, &backup)?;
        debug!("Moved {} aside to {}", original.display(), backup.display());
        Ok(Self {
            original: original.to_path_buf(),
            backup,
            armed: true,
        })
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    /// Drop the backup, keeping the new contents
    pub fn commit(mut self) {
        self.armed = false;
        if let Err(e) = remove_tree(&self.backup) {
            warn!("Failed to remove backup {}: {}", self.backup.display(), e);
        }
    }
}

impl Drop for BackupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = restore_backup(&self.backup, &self.original) {
            warn!(
                "Failed to restore {} from {}: {}",
                self.original.display(),
                self.backup.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_guard_removes_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("tmp");
        fs::create_dir_all(target.join("nested")).unwrap();

        drop(DirGuard::new(&target));
        assert!(!target.exists());
    }

    #[test]
    fn test_dir_guard_disarm_keeps() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("keep");
        fs::create_dir(&target).unwrap();

        let kept = DirGuard::new(&target).disarm();
        assert_eq!(kept, target);
        assert!(target.exists());
    }

    #[test]
    fn test_dir_guard_missing_dir_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        drop(DirGuard::new(dir.path().join("never-created")));
    }

    #[test]
    fn test_backup_guard_restores() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("code");
        fs::create_dir(&original).unwrap();
        fs::write(original.join("v1"), "old").unwrap();

        let guard = BackupGuard::move_aside(&original, dir.path().join("backup")).unwrap();
        assert!(!original.exists());
        fs::create_dir(&original).unwrap();
        fs::write(original.join("v2"), "new").unwrap();
        drop(guard);

        assert!(original.join("v1").exists());
        assert!(!original.join("v2").exists());
        assert!(!dir.path().join("backup").exists());
    }

    #[test]
    fn test_backup_guard_commit_discards_backup() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("code");
        fs::create_dir(&original).unwrap();

        let guard = BackupGuard::move_aside(&original, dir.path().join("backup")).unwrap();
        let backup = guard.backup_path().to_path_buf();
        fs::create_dir(&original).unwrap();
        fs::write(original.join("v2"), "new").unwrap();
        guard.commit();

        assert!(original.join("v2").exists());
        assert!(!backup.exists());
    }

    #[test]
    fn test_backup_names_trace_to_owner() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("com.example.app");
        fs::create_dir(&original).unwrap();

        let guard = BackupGuard::new(&original).unwrap();
        let backup_name = guard
            .backup_path()
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(is_backup_of(&backup_name, "com.example.app"));
        assert!(!is_backup_of(&backup_name, "com.example"));
        assert!(is_backup_name(&backup_name));
        assert!(!is_backup_name("com.example.app"));
        assert!(!is_backup_name("AbCdEf0123456789"));

        assert_eq!(
            find_backups(&original, |_| false),
            vec![guard.backup_path().to_path_buf()]
        );
        assert!(find_backups(&original, |name| name == backup_name).is_empty());
        guard.commit();
    }

    #[test]
    fn test_restore_backup_replaces_original() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("rawfile");
        let backup = dir.path().join("rawfile.AbCdEf0123456789.bak");
        fs::create_dir(&original).unwrap();
        fs::write(original.join("r.txt"), "new").unwrap();
        fs::create_dir(&backup).unwrap();
        fs::write(backup.join("r.txt"), "old").unwrap();

        restore_backup(&backup, &original).unwrap();
        assert_eq!(fs::read_to_string(original.join("r.txt")).unwrap(), "old");
        assert!(!backup.exists());
    }
}
