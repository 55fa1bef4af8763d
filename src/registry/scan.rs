// src/registry/scan.rs

//! Boot-time reload and reconciliation
//!
//! The registry only lives in memory. At startup it is rebuilt from the
//! install records, leftovers of interrupted installs are cleaned up, and
//! pre-installed system apps that are not installed yet get installed.
//!
//! The install record is the commit point of an upgrade. An upgrade cut
//! off before its record was renamed into place is undone here by putting
//! the backed-up code directory and raw files back.

use crate::config::InstallerConfig;
use crate::error::{Error, Result};
use crate::installer::guard::{find_backups, is_backup_name, remove_tree, restore_backup};
use crate::installer::progress::LogProgress;
use crate::installer::InstallerContext;
use crate::packages::{extract_bundle_param, parse_profile, PROFILE_NAME};
use crate::record::{is_random_suffix, InstallRecord};
use crate::registry::models::{BundleInfo, BundleRes, InstallSource};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of [`scan_packages`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Bundles restored from their install records
    pub reloaded: Vec<String>,
    /// Pre-installed packages installed by this scan
    pub installed: Vec<String>,
    /// Pre-installed packages the user uninstalled before
    pub skipped: Vec<String>,
    /// Pre-installed packages that could not be installed
    pub failed: Vec<PathBuf>,
}

/// Reload the registry and install missing pre-installed apps
pub fn scan_packages(ctx: &mut InstallerContext) -> Result<ScanReport> {
    let mut report = ScanReport::default();

    reload_installed(ctx, &mut report)?;
    remove_orphan_dirs(ctx);

    let system_dirs = [
        (ctx.config.system_bundle_path.clone(), InstallSource::System),
        (
            ctx.config.third_system_bundle_path.clone(),
            InstallSource::ThirdSystem,
        ),
    ];
    for (dir, source) in system_dirs {
        install_preinstalled(ctx, &dir, source, &mut report);
    }

    debug!("Scan finished: {:?}", report);
    Ok(report)
}

fn reload_installed(ctx: &mut InstallerContext, report: &mut ScanReport) -> Result<()> {
    let config = &ctx.config;
    let scan = ctx.records.scan(|name| config.is_ledger_file(name))?;

    for stale in &scan.stale {
        info!("Removing interrupted record {}", stale.display());
        if let Err(e) = fs::remove_file(stale) {
            warn!("Failed to remove {}: {}", stale.display(), e);
        }
    }

    let record_names: HashSet<String> = scan
        .records
        .iter()
        .map(|record| record.bundle_name.clone())
        .collect();

    for record in scan.records {
        if ctx.registry.contains(&record.bundle_name) {
            continue;
        }
        recover_interrupted_upgrade(&ctx.config, &record, &record_names);
        if !record.code_path.is_dir() {
            warn!(
                "Code directory of {} is gone, dropping its record",
                record.bundle_name
            );
            if let Err(e) = ctx.records.delete(&record.bundle_name) {
                warn!("{}", e);
            }
            continue;
        }

        let (bundle, resources) = match reload_bundle(&ctx.config, &record) {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("Skipping {}: {}", record.bundle_name, e);
                continue;
            }
        };
        if let Err(e) = ctx.registry.add(bundle) {
            warn!("Skipping {}: {}", record.bundle_name, e);
            continue;
        }
        ctx.registry.add_bundle_res(resources);
        report.reloaded.push(record.bundle_name);
    }
    Ok(())
}

/// Put back the directories an unfinished upgrade of `record` moved aside
///
/// When the code directory already holds the version the record names,
/// the upgrade got past its commit point and the backups are dropped.
fn recover_interrupted_upgrade(
    config: &InstallerConfig,
    record: &InstallRecord,
    record_names: &HashSet<String>,
) {
    // another bundle's code directory may be named like a backup
    let code_backup = find_backups(&record.code_path, |name| record_names.contains(name))
        .into_iter()
        .next();
    let raw_path = config.raw_file_path(&record.bundle_name);
    let raw_backup = find_backups(&raw_path, |_| false).into_iter().next();
    if code_backup.is_none() && raw_backup.is_none() {
        return;
    }

    if installed_version(&record.code_path) == Some(record.version_code) {
        for backup in code_backup.iter().chain(raw_backup.iter()) {
            debug!("Dropping backup {} of a finished upgrade", backup.display());
            if let Err(e) = remove_tree(backup) {
                warn!("Failed to remove {}: {}", backup.display(), e);
            }
        }
        return;
    }

    info!("Rolling back interrupted upgrade of {}", record.bundle_name);
    for (backup, original) in [(code_backup, &record.code_path), (raw_backup, &raw_path)] {
        let Some(backup) = backup else {
            continue;
        };
        if let Err(e) = restore_backup(&backup, original) {
            warn!(
                "Failed to restore {} from {}: {}",
                original.display(),
                backup.display(),
                e
            );
        }
    }
}

/// Version code declared by the profile in a code directory
fn installed_version(code_path: &Path) -> Option<u32> {
    let bytes = fs::read(code_path.join(PROFILE_NAME)).ok()?;
    parse_profile(&bytes)
        .ok()
        .map(|parsed| parsed.bundle.version_code)
}

/// Rebuild a bundle from its record and the profile in its code directory
fn reload_bundle(config: &InstallerConfig, record: &InstallRecord) -> Result<(BundleInfo, BundleRes)> {
    let profile_path = record.code_path.join(PROFILE_NAME);
    let bytes = fs::read(&profile_path).map_err(|e| {
        Error::ParseProfileError(format!("Failed to read {}: {}", profile_path.display(), e))
    })?;
    let parsed = parse_profile(&bytes)?;
    if parsed.bundle.bundle_name != record.bundle_name {
        return Err(Error::ParseProfileError(format!(
            "{} belongs to {}",
            profile_path.display(),
            parsed.bundle.bundle_name
        )));
    }

    let mut bundle = parsed.bundle;
    bundle.code_path = record.code_path.clone();
    bundle.data_path = config.bundle_data_path(&record.bundle_name);
    bundle.app_id = record.app_id.clone();
    bundle.source = record.source;
    bundle.is_system_app = record.source.is_system_app();
    Ok((bundle, parsed.resources))
}

/// Remove temp and backup directories an interrupted install left behind
fn remove_orphan_dirs(ctx: &InstallerContext) {
    let Ok(entries) = fs::read_dir(&ctx.config.install_path) else {
        return;
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let is_leftover = is_random_suffix(name) || is_backup_name(name);
        if !is_leftover || ctx.registry.contains(name) || !entry.path().is_dir() {
            continue;
        }

        info!("Removing leftover directory {}", entry.path().display());
        if let Err(e) = fs::remove_dir_all(entry.path()) {
            warn!("Failed to remove {}: {}", entry.path().display(), e);
        }
    }
}

fn install_preinstalled(
    ctx: &mut InstallerContext,
    dir: &Path,
    source: InstallSource,
    report: &mut ScanReport,
) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return,
        Err(e) => {
            warn!("Failed to read {}: {}", dir.display(), e);
            return;
        }
    };

    let mut packages: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "hap"))
        .collect();
    packages.sort();

    for package in packages {
        let bundle_name = match extract_bundle_param(&package, &ctx.config) {
            Ok(name) => name,
            Err(e) => {
                warn!("Unreadable system package {}: {}", package.display(), e);
                report.failed.push(package);
                continue;
            }
        };

        if ctx.registry.contains(&bundle_name) {
            continue;
        }
        if source == InstallSource::ThirdSystem {
            match ctx.uninstalled.contains(&bundle_name) {
                Ok(true) => {
                    debug!("{} was uninstalled by the user", bundle_name);
                    report.skipped.push(bundle_name);
                    continue;
                }
                Ok(false) => {}
                Err(e) => warn!("Failed to read uninstalled ledger: {}", e),
            }
        }

        let mut progress = LogProgress::new(format!("install {}", bundle_name));
        match ctx.install(&package, &mut progress) {
            Ok(_) => report.installed.push(bundle_name),
            Err(e) => {
                warn!("Failed to install system package {}: {}", package.display(), e);
                report.failed.push(package);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::progress::SilentProgress;
    use crate::packages::HapBuilder;
    use crate::permissions::JsonPermissionStore;
    use crate::signature::SignatureInfo;

    fn signature(path: &Path) -> Result<SignatureInfo> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        Ok(SignatureInfo {
            app_id: format!("{}_KEY", stem),
            bundle_name: stem,
            restricted_permissions: vec![],
        })
    }

    fn write_package(dir: &Path, name: &str, version: u32) -> PathBuf {
        fs::create_dir_all(dir).unwrap();
        let path = dir.join(format!("{}.hap", name));
        HapBuilder::new(name)
            .profile(format!(
                r#"{{"app":{{"bundleName":"{}","version":{{"code":{},"name":"v"}}}}}}"#,
                name, version
            ))
            .entry("lib", "main.bin", "code")
            .write_to(&path)
            .unwrap();
        path
    }

    fn context(root: &Path) -> InstallerContext {
        let config = InstallerConfig::with_root(root);
        let permissions = JsonPermissionStore::new(&config.permissions_path);
        InstallerContext::new(config, Box::new(signature), Box::new(permissions))
    }

    #[test]
    fn test_reload_after_restart() {
        let root = tempfile::tempdir().unwrap();
        let hap = write_package(&root.path().join("downloads"), "com.example.app", 4);
        {
            let mut ctx = context(root.path());
            ctx.boot().unwrap();
            ctx.install(&hap, &mut SilentProgress).unwrap();
        }

        let mut ctx = context(root.path());
        let report = ctx.boot().unwrap();

        assert_eq!(report.reloaded, vec!["com.example.app".to_string()]);
        let info = ctx.query("com.example.app").unwrap();
        assert_eq!(info.version_code, 4);
        assert_eq!(info.app_id, "com.example.app_KEY");
        assert_eq!(info.source, InstallSource::ThirdParty);
        assert_eq!(ctx.registry().third_party_count(), 1);
        assert!(ctx.registry().bundle_res("com.example.app").is_some());
    }

    #[test]
    fn test_interrupted_install_leftovers_removed() {
        let root = tempfile::tempdir().unwrap();
        let mut ctx = context(root.path());
        ctx.config.ensure_dirs().unwrap();

        let stale_record = ctx.config.json_path.join("com.example.app.AbCdEf0123456789.json.tmp");
        fs::write(&stale_record, "{").unwrap();
        let stale_dir = ctx.config.install_path.join("AbCdEf0123456789");
        fs::create_dir_all(stale_dir.join("lib")).unwrap();

        ctx.boot().unwrap();
        assert!(!stale_record.exists());
        assert!(!stale_dir.exists());
    }

    #[test]
    fn test_upgrade_cut_off_before_new_code_is_restored() {
        let root = tempfile::tempdir().unwrap();
        let hap = write_package(&root.path().join("downloads"), "com.example.app", 1);
        let code_path;
        {
            let mut ctx = context(root.path());
            ctx.boot().unwrap();
            ctx.install(&hap, &mut SilentProgress).unwrap();
            code_path = ctx.config.code_path("com.example.app");
        }
        let backup = code_path.with_file_name("com.example.app.AbCdEf0123456789.bak");
        fs::rename(&code_path, &backup).unwrap();

        let mut ctx = context(root.path());
        let report = ctx.boot().unwrap();

        assert_eq!(report.reloaded, vec!["com.example.app".to_string()]);
        assert_eq!(ctx.query("com.example.app").unwrap().version_code, 1);
        assert!(code_path.join("lib/main.bin").is_file());
        assert!(!backup.exists());
        assert!(ctx.records().load("com.example.app").unwrap().is_some());
    }

    #[test]
    fn test_upgrade_cut_off_before_record_commit_is_rolled_back() {
        let root = tempfile::tempdir().unwrap();
        let hap = write_package(&root.path().join("downloads"), "com.example.app", 1);
        let config = InstallerConfig::with_root(root.path());
        {
            let mut ctx = context(root.path());
            ctx.boot().unwrap();
            ctx.install(&hap, &mut SilentProgress).unwrap();
        }

        // new code renamed into place and raw files swapped, record still v1
        let code_path = config.code_path("com.example.app");
        fs::rename(
            &code_path,
            code_path.with_file_name("com.example.app.AbCdEf0123456789.bak"),
        )
        .unwrap();
        fs::create_dir(&code_path).unwrap();
        fs::write(
            code_path.join(PROFILE_NAME),
            r#"{"app":{"bundleName":"com.example.app","version":{"code":2,"name":"v2"}}}"#,
        )
        .unwrap();
        let raw_path = config.raw_file_path("com.example.app");
        let raw_backup = raw_path.with_file_name("rawfile.AbCdEf0123456789.bak");
        fs::create_dir_all(&raw_backup).unwrap();
        fs::write(raw_backup.join("r.txt"), "raw v1").unwrap();
        fs::create_dir_all(&raw_path).unwrap();
        fs::write(raw_path.join("r.txt"), "raw v2").unwrap();

        let mut ctx = context(root.path());
        ctx.boot().unwrap();

        assert_eq!(ctx.query("com.example.app").unwrap().version_code, 1);
        assert!(code_path.join("lib/main.bin").is_file());
        assert_eq!(fs::read_to_string(raw_path.join("r.txt")).unwrap(), "raw v1");
        assert!(!raw_backup.exists());
        let leftovers: Vec<_> = fs::read_dir(&config.install_path)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_finished_upgrade_drops_backups() {
        let root = tempfile::tempdir().unwrap();
        let hap = write_package(&root.path().join("downloads"), "com.example.app", 1);
        let config = InstallerConfig::with_root(root.path());
        {
            let mut ctx = context(root.path());
            ctx.boot().unwrap();
            ctx.install(&hap, &mut SilentProgress).unwrap();
        }
        let code_backup = config.install_path.join("com.example.app.AbCdEf0123456789.bak");
        fs::create_dir_all(code_backup.join("lib")).unwrap();
        let raw_path = config.raw_file_path("com.example.app");
        let raw_backup = raw_path.with_file_name("rawfile.AbCdEf0123456789.bak");
        fs::create_dir_all(&raw_backup).unwrap();

        let mut ctx = context(root.path());
        ctx.boot().unwrap();

        assert!(ctx.query("com.example.app").is_some());
        assert!(!code_backup.exists());
        assert!(!raw_backup.exists());
        assert!(config.code_path("com.example.app").join("lib/main.bin").is_file());
    }

    #[test]
    fn test_similarly_named_bundles_survive_restart() {
        let root = tempfile::tempdir().unwrap();
        let downloads = root.path().join("downloads");
        let longer = "com.example.notes.AbCdEf0123456789";
        {
            let mut ctx = context(root.path());
            ctx.boot().unwrap();
            ctx.install(&write_package(&downloads, longer, 1), &mut SilentProgress)
                .unwrap();
            ctx.install(
                &write_package(&downloads, "com.example.notes", 1),
                &mut SilentProgress,
            )
            .unwrap();
            assert!(ctx.records().load(longer).unwrap().is_some());
        }

        let mut ctx = context(root.path());
        let report = ctx.boot().unwrap();
        assert_eq!(report.reloaded.len(), 2);
        assert!(ctx.query(longer).is_some());
        assert!(ctx.query("com.example.notes").is_some());
    }

    #[test]
    fn test_record_without_code_dir_is_dropped() {
        let root = tempfile::tempdir().unwrap();
        let hap = write_package(&root.path().join("downloads"), "com.example.app", 1);
        {
            let mut ctx = context(root.path());
            ctx.boot().unwrap();
            ctx.install(&hap, &mut SilentProgress).unwrap();
            fs::remove_dir_all(ctx.config.code_path("com.example.app")).unwrap();
        }

        let mut ctx = context(root.path());
        let report = ctx.boot().unwrap();
        assert!(report.reloaded.is_empty());
        assert!(ctx.query("com.example.app").is_none());
        assert_eq!(ctx.records().load("com.example.app").unwrap(), None);
    }

    #[test]
    fn test_system_apps_installed_once() {
        let root = tempfile::tempdir().unwrap();
        let mut ctx = context(root.path());
        let system_dir = ctx.config.system_bundle_path.clone();
        write_package(&system_dir, "com.example.settings", 1);

        let report = ctx.boot().unwrap();
        assert_eq!(report.installed, vec!["com.example.settings".to_string()]);

        let info = ctx.query("com.example.settings").unwrap();
        assert!(info.is_system_app);
        assert_eq!(info.source, InstallSource::System);
        assert_eq!(ctx.registry().third_party_count(), 0);

        let again = ctx.scan().unwrap();
        assert!(again.installed.is_empty());
    }

    #[test]
    fn test_uninstalled_third_system_app_skipped() {
        let root = tempfile::tempdir().unwrap();
        let mut ctx = context(root.path());
        let external = ctx.config.third_system_bundle_path.clone();
        write_package(&external, "com.example.music", 1);

        let report = ctx.boot().unwrap();
        assert_eq!(report.installed, vec!["com.example.music".to_string()]);
        assert!(!ctx.query("com.example.music").unwrap().is_system_app);

        ctx.uninstall("com.example.music", &mut SilentProgress).unwrap();
        assert!(ctx.uninstalled().contains("com.example.music").unwrap());

        let mut ctx = context(root.path());
        let report = ctx.boot().unwrap();
        assert!(report.installed.is_empty());
        assert_eq!(report.skipped, vec!["com.example.music".to_string()]);
        assert!(ctx.query("com.example.music").is_none());
    }

    #[test]
    fn test_broken_system_package_reported() {
        let root = tempfile::tempdir().unwrap();
        let mut ctx = context(root.path());
        let system_dir = ctx.config.system_bundle_path.clone();
        fs::create_dir_all(&system_dir).unwrap();
        fs::write(system_dir.join("broken.hap"), b"\x00\x00").unwrap();
        write_package(&system_dir, "com.example.clock", 1);

        let report = ctx.boot().unwrap();
        assert_eq!(report.failed, vec![system_dir.join("broken.hap")]);
        assert_eq!(report.installed, vec!["com.example.clock".to_string()]);
    }
}
