// src/platform.rs

//! Platform variants
//!
//! The small-footprint variant keeps no uid/gid ledger and never changes
//! ownership; the full variant assigns every bundle its own uid/gid and
//! hands the bundle's directories over to it.

use crate::config::PlatformKind;
use crate::record::uid_gid::UidGid;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Platform-specific filesystem behavior
pub trait PlatformIo: Send {
    fn kind(&self) -> PlatformKind;

    /// Whether bundles get their own uid/gid
    fn tracks_ownership(&self) -> bool;

    /// Give `path` (recursively) to `owner`
    fn set_ownership(&self, path: &Path, owner: UidGid) -> io::Result<()>;
}

/// Small-footprint variant
#[derive(Debug, Clone, Copy, Default)]
pub struct LiteIo;

impl PlatformIo for LiteIo {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Lite
    }

    fn tracks_ownership(&self) -> bool {
        false
    }

    fn set_ownership(&self, _path: &Path, _owner: UidGid) -> io::Result<()> {
        Ok(())
    }
}

/// Full variant with per-bundle ownership
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxIo;

impl PlatformIo for LinuxIo {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Linux
    }

    fn tracks_ownership(&self) -> bool {
        true
    }

    fn set_ownership(&self, path: &Path, owner: UidGid) -> io::Result<()> {
        debug!("Setting owner of {} to {}:{}", path.display(), owner.uid, owner.gid);
        chown_recursive(path, owner)
    }
}

#[cfg(unix)]
fn chown_recursive(path: &Path, owner: UidGid) -> io::Result<()> {
    std::os::unix::fs::lchown(path, Some(owner.uid), Some(owner.gid))?;

    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        for entry in fs::read_dir(path)? {
            chown_recursive(&entry?.path(), owner)?;
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn chown_recursive(path: &Path, _owner: UidGid) -> io::Result<()> {
    fs::symlink_metadata(path).map(|_| ())
}

/// Platform implementation for a configured kind
pub fn for_kind(kind: PlatformKind) -> Box<dyn PlatformIo> {
    match kind {
        PlatformKind::Lite => Box::new(LiteIo),
        PlatformKind::Linux => Box::new(LinuxIo),
    }
}
