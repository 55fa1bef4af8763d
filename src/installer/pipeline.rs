// src/installer/pipeline.rs

//! Install pipeline
//!
//! Stages, in order:
//! 1. precheck: package file, header bundle name, signature, appId, limit
//! 2. profile parse and provisioning match
//! 3. restricted permission and upgrade compatibility checks
//! 4. extraction into a temp directory next to the final code directory
//! 5. optional bytecode transform
//! 6. commit of code and data directories
//! 7. install record, permissions, uid/gid
//! 8. registry update
//!
//! Nothing outside the temp directory is touched before stage 6. From
//! stage 4 on every created or replaced directory is held by a guard, so
//! an early return rolls the filesystem back; record and store changes
//! made in stage 7 are undone explicitly, back to the state the upgrade
//! started from.

use super::guard::{BackupGuard, DirGuard};
use super::progress::{ProgressSink, ProgressTracker};
use super::{random_suffix, InstallerContext};
use crate::config::{InstallerConfig, RAW_FILE_DIR};
use crate::error::{Error, Result};
use crate::packages::extractor::open_package;
use crate::packages::{extract_bundle_param, extract_hap, extract_hap_profile, parse_profile};
use crate::permissions::Permission;
use crate::record::{InstallRecord, StagedRecord};
use crate::registry::models::{BundleInfo, BundleRes, InstallSource};
use crate::signature::{is_wildcard_app_id, match_bundle_name, reshape_app_id, SignatureInfo};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of the precheck stage
struct Prechecked {
    bundle_name: String,
    signature: SignatureInfo,
    app_id: String,
    source: InstallSource,
    existing: Option<BundleInfo>,
}

/// Stored state of the bundle an upgrade replaces
struct Previous {
    record: InstallRecord,
    permissions: Option<Vec<Permission>>,
}

/// Store changes made after the code directory was committed
#[derive(Default)]
struct Committed {
    record_written: bool,
    permissions_saved: bool,
    uid_assigned: bool,
}

pub(crate) fn install(
    ctx: &mut InstallerContext,
    path: &Path,
    progress: &mut dyn ProgressSink,
) -> Result<BundleInfo> {
    debug!("Installing {}", path.display());
    let mut tracker = ProgressTracker::new(progress);
    let result = run(ctx, path, &mut tracker);
    tracker.finish(&result);

    match &result {
        Ok(info) => info!(
            "Installed {} version {} ({})",
            info.bundle_name, info.version_code, info.version_name
        ),
        Err(e) => warn!("Install of {} failed: {}", path.display(), e),
    }
    result
}

fn run(
    ctx: &mut InstallerContext,
    path: &Path,
    tracker: &mut ProgressTracker<'_>,
) -> Result<BundleInfo> {
    let pre = precheck(ctx, path)?;
    tracker.checkpoint(10);

    let mut reader = open_package(path)?;
    let profile = extract_hap_profile(&mut reader, ctx.config.max_profile_size)?;
    drop(reader);
    let parsed = parse_profile(&profile)?;
    drop(profile);

    if parsed.bundle.bundle_name != pre.bundle_name {
        return Err(Error::ParseProfileError(format!(
            "profile declares {} but the package header declares {}",
            parsed.bundle.bundle_name, pre.bundle_name
        )));
    }
    if !match_bundle_name(&pre.signature.bundle_name, &parsed.bundle.bundle_name) {
        return Err(Error::InvalidProvisionInfo(format!(
            "signature is for {}, package is {}",
            pre.signature.bundle_name, parsed.bundle.bundle_name
        )));
    }
    check_permissions(&ctx.config, &parsed.permissions, &pre.signature)?;

    let previous = match &pre.existing {
        Some(existing) => {
            let record = check_compatibility(ctx, existing, &parsed.bundle, &pre.app_id)?;
            let permissions = ctx.permissions.load(&existing.bundle_name).map_err(|e| {
                Error::StorePermissionsError(format!(
                    "Failed to read permissions of {}: {}",
                    existing.bundle_name, e
                ))
            })?;
            Some(Previous {
                record,
                permissions,
            })
        }
        None => None,
    };
    tracker.checkpoint(50);

    // extraction into a sibling temp directory
    let name = pre.bundle_name.as_str();
    let code_path = ctx.config.code_path(name);
    let data_path = ctx.config.bundle_data_path(name);
    fs::create_dir_all(&ctx.config.install_path).map_err(|e| {
        Error::RenameDirError(format!(
            "Failed to create {}: {}",
            ctx.config.install_path.display(),
            e
        ))
    })?;

    let tmp = DirGuard::new(ctx.config.install_path.join(random_suffix()));
    fs::create_dir(tmp.path()).map_err(|e| {
        Error::RenameDirError(format!("Failed to create {}: {}", tmp.path().display(), e))
    })?;
    let mut reader = open_package(path)?;
    extract_hap(tmp.path(), name, &mut reader)?;
    drop(reader);
    debug!("Extracted {} into {}", name, tmp.path().display());
    tracker.checkpoint(60);

    let transform_result = match &ctx.transform {
        Some(transform) => {
            let status = transform
                .transform(tmp.path(), &parsed.bundle)
                .map_err(|e| match e {
                    Error::TransformError(_) => e,
                    other => Error::TransformError(other.to_string()),
                })?;
            debug!("Transform of {} returned {}", name, status);
            Some(status)
        }
        None => None,
    };
    tracker.checkpoint(70);

    let mut bundle = parsed.bundle;
    bundle.code_path = code_path.clone();
    bundle.data_path = data_path.clone();
    bundle.app_id = pre.app_id;
    match &pre.existing {
        Some(existing) => {
            bundle.source = existing.source;
            bundle.is_system_app = existing.is_system_app;
        }
        None => {
            bundle.source = pre.source;
            bundle.is_system_app = pre.source.is_system_app();
        }
    }

    let staged = ctx
        .records
        .stage(&InstallRecord::from_bundle(&bundle, transform_result))?;

    // commit the code directory
    let backup = if code_path.exists() {
        if pre.existing.is_some() {
            Some(BackupGuard::new(&code_path).map_err(|e| {
                Error::RenameDirError(format!("Failed to back up {}: {}", code_path.display(), e))
            })?)
        } else {
            warn!("Removing leftover code directory {}", code_path.display());
            fs::remove_dir_all(&code_path).map_err(|e| {
                Error::RenameDirError(format!("Failed to remove {}: {}", code_path.display(), e))
            })?;
            None
        }
    } else {
        None
    };

    fs::rename(tmp.path(), &code_path).map_err(|e| {
        Error::RenameDirError(format!(
            "Failed to rename {} to {}: {}",
            tmp.path().display(),
            code_path.display(),
            e
        ))
    })?;
    tmp.disarm();
    let code_guard = match &backup {
        Some(_) => None,
        None => Some(DirGuard::new(&code_path)),
    };

    if pre.existing.is_none() && data_path.exists() {
        warn!("Removing leftover data directory {}", data_path.display());
        fs::remove_dir_all(&data_path).map_err(|e| {
            Error::CreateDataDirError(format!("Failed to remove {}: {}", data_path.display(), e))
        })?;
    }
    let data_guard = if data_path.exists() {
        None
    } else {
        fs::create_dir_all(&data_path).map_err(|e| {
            Error::CreateDataDirError(format!("Failed to create {}: {}", data_path.display(), e))
        })?;
        Some(DirGuard::new(&data_path))
    };

    let raw_backup = match bundle.main_module() {
        Some(module) => move_raw_files(&code_path, &data_path, &module.module_name)?,
        None => None,
    };
    tracker.checkpoint(80);

    let mut committed = Committed::default();
    if let Err(e) = finish(
        ctx,
        staged,
        &bundle,
        &parsed.permissions,
        parsed.resources,
        pre.existing.is_some(),
        &mut committed,
        tracker,
    ) {
        undo_stores(ctx, name, previous, &committed);
        return Err(e);
    }

    if let Some(guard) = raw_backup {
        guard.commit();
    }
    if let Some(guard) = code_guard {
        guard.disarm();
    }
    if let Some(guard) = data_guard {
        guard.disarm();
    }
    if let Some(guard) = backup {
        guard.commit();
    }
    tracker.checkpoint(100);

    Ok(bundle)
}

fn precheck(ctx: &InstallerContext, path: &Path) -> Result<Prechecked> {
    let metadata = fs::metadata(path)
        .map_err(|e| Error::FileNotExists(format!("{}: {}", path.display(), e)))?;
    if !metadata.is_file() || metadata.len() == 0 {
        return Err(Error::BadFile(format!(
            "{} is empty or not a regular file",
            path.display()
        )));
    }

    let bundle_name = extract_bundle_param(path, &ctx.config)?;
    let signature = ctx.verifier.verify(path)?;

    if !signature.app_id.starts_with(&bundle_name) && !is_wildcard_app_id(&signature.app_id) {
        return Err(Error::InvalidProvisionInfo(format!(
            "appId {} does not belong to {}",
            signature.app_id, bundle_name
        )));
    }
    let app_id = reshape_app_id(&signature.app_id, &bundle_name)?;

    let source = ctx.install_source(path);
    let existing = ctx.registry.query(&bundle_name);
    let max = ctx.config.max_third_bundle_number;
    if source == InstallSource::ThirdParty
        && existing.is_none()
        && ctx.registry.third_party_count() >= max
    {
        return Err(Error::ExceedMaxBundleNumber(max));
    }

    debug!(
        "Precheck of {} passed: {} as {}",
        path.display(),
        bundle_name,
        source.as_str()
    );
    Ok(Prechecked {
        bundle_name,
        signature,
        app_id,
        source,
        existing,
    })
}

/// Reject restricted permissions the signature does not grant
fn check_permissions(
    config: &InstallerConfig,
    requested: &[Permission],
    signature: &SignatureInfo,
) -> Result<()> {
    for permission in requested {
        let restricted = config.restricted_permissions.contains(&permission.name);
        if restricted && !signature.restricted_permissions.contains(&permission.name) {
            return Err(Error::InvalidPermission(format!(
                "{} is restricted and not granted by the signature",
                permission.name
            )));
        }
    }
    Ok(())
}

/// Upgrade rules; returns the record the upgrade replaces
fn check_compatibility(
    ctx: &InstallerContext,
    existing: &BundleInfo,
    incoming: &BundleInfo,
    app_id: &str,
) -> Result<InstallRecord> {
    if incoming.version_code < existing.version_code {
        return Err(Error::VersionDowngrade {
            bundle: existing.bundle_name.clone(),
            installed: existing.version_code,
            attempted: incoming.version_code,
        });
    }

    let record = ctx
        .records
        .load(&existing.bundle_name)
        .map_err(|e| Error::IncompatibleSignature(format!("installed record unreadable: {}", e)))?
        .ok_or_else(|| {
            Error::IncompatibleSignature(format!("no install record for {}", existing.bundle_name))
        })?;

    if record.app_id != app_id {
        return Err(Error::IncompatibleSignature(format!(
            "installed appId {} differs from {}",
            record.app_id, app_id
        )));
    }
    Ok(record)
}

/// Move `<code>/assets/<module>/resources/rawfile` to `<data>/rawfile`
///
/// A previous `<data>/rawfile` is moved aside; the returned guard puts it
/// back unless committed.
fn move_raw_files(
    code_path: &Path,
    data_path: &Path,
    module_name: &str,
) -> Result<Option<BackupGuard>> {
    let source: PathBuf = code_path
        .join("assets")
        .join(module_name)
        .join("resources")
        .join(RAW_FILE_DIR);
    if module_name.is_empty() || !source.is_dir() {
        return Ok(None);
    }

    let target = data_path.join(RAW_FILE_DIR);
    let backup = if target.exists() {
        Some(BackupGuard::new(&target).map_err(|e| {
            Error::RenameDirError(format!("Failed to back up {}: {}", target.display(), e))
        })?)
    } else {
        None
    };
    fs::rename(&source, &target).map_err(|e| {
        Error::RenameDirError(format!(
            "Failed to move {} to {}: {}",
            source.display(),
            target.display(),
            e
        ))
    })?;
    debug!("Moved raw files to {}", target.display());
    Ok(backup)
}

#[allow(clippy::too_many_arguments)]
fn finish(
    ctx: &mut InstallerContext,
    staged: StagedRecord,
    bundle: &BundleInfo,
    permissions: &[Permission],
    resources: BundleRes,
    is_update: bool,
    committed: &mut Committed,
    tracker: &mut ProgressTracker<'_>,
) -> Result<()> {
    let name = bundle.bundle_name.as_str();

    staged.commit()?;
    committed.record_written = true;

    ctx.permissions
        .save(name, permissions, is_update)
        .map_err(|e| match e {
            Error::StorePermissionsError(_) => e,
            other => Error::StorePermissionsError(other.to_string()),
        })?;
    committed.permissions_saved = true;

    if ctx.platform.tracks_ownership() {
        let (owner, created) = ctx.uid_gid.assign(name)?;
        committed.uid_assigned = created;
        for dir in [&bundle.code_path, &bundle.data_path] {
            ctx.platform.set_ownership(dir, owner).map_err(|e| {
                Error::InternalError(format!("Failed to set owner of {}: {}", dir.display(), e))
            })?;
        }
    }
    tracker.checkpoint(90);

    if bundle.source == InstallSource::ThirdSystem {
        if let Err(e) = ctx.uninstalled.remove(name) {
            warn!("Failed to clear uninstalled mark of {}: {}", name, e);
        }
    }

    if is_update {
        ctx.registry.update(bundle.clone())?;
    } else {
        ctx.registry.add(bundle.clone())?;
    }
    ctx.registry.add_bundle_res(resources);
    Ok(())
}

/// Undo record and store changes after a failed finish
fn undo_stores(
    ctx: &mut InstallerContext,
    bundle_name: &str,
    previous: Option<Previous>,
    committed: &Committed,
) {
    if committed.record_written {
        let restored = match &previous {
            Some(previous) => ctx.records.store(&previous.record),
            None => ctx.records.delete(bundle_name),
        };
        if let Err(e) = restored {
            warn!("Failed to roll back record of {}: {}", bundle_name, e);
        }
    }

    if committed.permissions_saved {
        let restored = match previous.as_ref().and_then(|p| p.permissions.as_deref()) {
            Some(permissions) => ctx.permissions.save(bundle_name, permissions, true),
            None => ctx.permissions.delete(bundle_name),
        };
        if let Err(e) = restored {
            warn!("Failed to roll back permissions of {}: {}", bundle_name, e);
        }
    }

    if committed.uid_assigned {
        if let Err(e) = ctx.uid_gid.delete(bundle_name) {
            warn!("Failed to roll back uid/gid of {}: {}", bundle_name, e);
        }
    }
}
