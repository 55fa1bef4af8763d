// src/installer/uninstall.rs

//! Uninstall
//!
//! Directory removal is best effort: when it fails the record, ledgers and
//! registry entry are still removed and the failure is reported at the end.

use super::progress::{ProgressSink, ProgressTracker};
use super::InstallerContext;
use crate::error::{Error, Result};
use crate::registry::models::InstallSource;
use std::fs;
use std::io::ErrorKind;
use tracing::{debug, info, warn};

pub(crate) fn uninstall(
    ctx: &mut InstallerContext,
    bundle_name: &str,
    progress: &mut dyn ProgressSink,
) -> Result<()> {
    debug!("Uninstalling {}", bundle_name);
    let mut tracker = ProgressTracker::new(progress);
    let result = run(ctx, bundle_name, &mut tracker);
    tracker.finish(&result);

    match &result {
        Ok(()) => info!("Uninstalled {}", bundle_name),
        Err(e) => warn!("Uninstall of {} failed: {}", bundle_name, e),
    }
    result
}

fn run(ctx: &mut InstallerContext, bundle_name: &str, tracker: &mut ProgressTracker<'_>) -> Result<()> {
    let info = ctx
        .registry
        .query(bundle_name)
        .ok_or_else(|| Error::BundleNotExists(bundle_name.to_string()))?;
    if info.is_system_app {
        return Err(Error::BundleNotUninstallable(bundle_name.to_string()));
    }
    tracker.checkpoint(10);

    ctx.permissions.delete(bundle_name).map_err(|e| match e {
        Error::DeletePermissionsError(_) => e,
        other => Error::DeletePermissionsError(other.to_string()),
    })?;

    let mut dir_failure = None;
    for dir in [&info.code_path, &info.data_path] {
        match fs::remove_dir_all(dir) {
            Ok(()) => debug!("Removed {}", dir.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to remove {}: {}", dir.display(), e);
                dir_failure.get_or_insert_with(|| format!("{}: {}", dir.display(), e));
            }
        }
    }
    tracker.checkpoint(50);

    ctx.records.delete(bundle_name)?;

    if ctx.platform.tracks_ownership() {
        ctx.uid_gid.delete(bundle_name).map_err(|e| match e {
            Error::DeleteRecordInfoError(_) => e,
            other => Error::DeleteRecordInfoError(other.to_string()),
        })?;
    }

    if info.source == InstallSource::ThirdSystem {
        ctx.uninstalled.add(bundle_name).map_err(|e| {
            Error::DeleteRecordInfoError(format!("Failed to mark {} uninstalled: {}", bundle_name, e))
        })?;
    }
    tracker.checkpoint(90);

    ctx.registry.remove(bundle_name);
    ctx.registry.remove_bundle_res(bundle_name);

    if let Some(failure) = dir_failure {
        return Err(Error::DeleteDirsError(failure));
    }
    tracker.checkpoint(100);
    Ok(())
}
