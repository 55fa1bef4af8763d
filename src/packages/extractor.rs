// src/packages/extractor.rs

//! HAP container extraction
//!
//! The container has no index: a header (magic + bundle name) followed by
//! length-prefixed entries until the end of the file. Every consumer walks
//! the stream from the start:
//!
//! - [`extract_bundle_param`] reads only the header
//! - [`extract_hap_profile`] pulls the root `config.json` into memory and
//!   seeks over everything else
//! - [`extract_hap`] writes every entry below a code directory

use crate::config::InstallerConfig;
use crate::error::{Error, Result};
use crate::packages::reader::HapReader;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Name of the manifest entry at the archive root
pub const PROFILE_NAME: &str = "config.json";

const COPY_BUF_SIZE: usize = 4096;

/// Decoded attributes of one entry, payload not yet consumed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryAttr {
    pub name: String,
    pub path_len: u32,
    /// `None` when the path was skipped instead of read
    pub relative_path: Option<String>,
    pub size: u64,
}

/// Open a package file for reading
///
/// Fails with `FileNotExists` if the path is missing and `BadFile` if it is
/// not a regular, non-empty file.
pub fn open_package(path: &Path) -> Result<HapReader<BufReader<File>>> {
    let metadata = fs::metadata(path)
        .map_err(|_| Error::FileNotExists(path.display().to_string()))?;

    if !metadata.is_file() {
        return Err(Error::BadFile(format!("{} is not a file", path.display())));
    }
    if metadata.len() == 0 {
        return Err(Error::BadFile(format!("{} is empty", path.display())));
    }

    let file = File::open(path)
        .map_err(|e| Error::FileNotExists(format!("{}: {}", path.display(), e)))?;

    Ok(HapReader::new(BufReader::new(file), metadata.len()))
}

/// Decode the header and return the declared bundle name
pub fn extract_file_header_info<R: Read + Seek>(reader: &mut HapReader<R>) -> Result<String> {
    reader.check_magic()?;
    let name_len = reader.read_u32()?;
    let bundle_name = reader.read_string(name_len)?;
    Ok(bundle_name)
}

/// Decode the attributes of the next entry
///
/// With `read_path == false` the relative path is skipped, which is all
/// the profile lookup needs.
pub fn extract_file_attr<R: Read + Seek>(
    reader: &mut HapReader<R>,
    read_path: bool,
) -> Result<EntryAttr> {
    let name_len = reader.read_u32()?;
    let name = reader.read_string(name_len)?;

    let path_len = reader.read_u32()?;
    let relative_path = if read_path {
        Some(reader.read_string(path_len)?)
    } else {
        reader.skip(u64::from(path_len))?;
        None
    };

    let size = reader.read_u64()?;
    reader.ensure(size)?;

    Ok(EntryAttr {
        name,
        path_len,
        relative_path,
        size,
    })
}

/// Read the bundle name from a package header and validate it
///
/// Runs before signature verification and before any directory is
/// touched.
pub fn extract_bundle_param(path: &Path, config: &InstallerConfig) -> Result<String> {
    let mut reader = open_package(path)?;
    let bundle_name = extract_file_header_info(&mut reader)?;

    let len = bundle_name.len();
    if len < config.min_bundle_name_len || len > config.max_bundle_name_len {
        return Err(Error::FileDataInvalid(format!(
            "bundle name length {} outside {}..={}",
            len, config.min_bundle_name_len, config.max_bundle_name_len
        )));
    }
    if bundle_name.contains("../") {
        return Err(Error::FileDataInvalid(format!(
            "bundle name {:?} contains a path traversal",
            bundle_name
        )));
    }

    debug!("Package {} declares bundle {}", path.display(), bundle_name);
    Ok(bundle_name)
}

/// Extract the in-memory profile (`config.json` at the archive root)
pub fn extract_hap_profile<R: Read + Seek>(
    reader: &mut HapReader<R>,
    max_size: u64,
) -> Result<Vec<u8>> {
    extract_file_header_info(reader)?;

    while reader.position() < reader.len() {
        let attr = extract_file_attr(reader, false)?;

        if attr.path_len == 0 && attr.name == PROFILE_NAME {
            if attr.size > max_size {
                return Err(Error::ParseProfileError(format!(
                    "profile is {} bytes, limit is {}",
                    attr.size, max_size
                )));
            }
            return Ok(reader.read_bytes(attr.size)?);
        }

        reader.skip(attr.size)?;
    }

    Err(Error::ParseProfileError(format!(
        "{} not found in package",
        PROFILE_NAME
    )))
}

/// Write every entry of the package below `code_path`
///
/// Stops at the first decode or I/O failure; whatever was written so far is
/// left for the caller to clean up.
pub fn extract_hap<R: Read + Seek>(
    code_path: &Path,
    bundle_name: &str,
    reader: &mut HapReader<R>,
) -> Result<()> {
    let header_name = extract_file_header_info(reader)?;
    if header_name != bundle_name {
        return Err(Error::FileDataInvalid(format!(
            "package declares {} but {} was expected",
            header_name, bundle_name
        )));
    }

    let mut buf = [0u8; COPY_BUF_SIZE];
    let mut count = 0usize;

    while reader.position() < reader.len() {
        let attr = extract_file_attr(reader, true)?;
        let target = entry_target(code_path, &attr)?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::RenameDirError(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let mut file = File::create(&target).map_err(|e| {
            Error::RenameDirError(format!("Failed to create {}: {}", target.display(), e))
        })?;

        let mut remaining = attr.size;
        while remaining > 0 {
            let n = remaining.min(COPY_BUF_SIZE as u64) as usize;
            reader.read_exact(&mut buf[..n])?;
            file.write_all(&buf[..n]).map_err(|e| {
                Error::RenameDirError(format!("Failed to write {}: {}", target.display(), e))
            })?;
            remaining -= n as u64;
        }

        count += 1;
    }

    debug!("Extracted {} entries into {}", count, code_path.display());
    Ok(())
}

/// Resolve where an entry lands, refusing anything that escapes `code_path`
fn entry_target(code_path: &Path, attr: &EntryAttr) -> Result<PathBuf> {
    let invalid = |what: &str| {
        Error::FileDataInvalid(format!(
            "entry {:?} has an invalid {}",
            attr.name, what
        ))
    };

    if attr.name.is_empty() || attr.name.contains(['/', '\\']) || attr.name == "." || attr.name == ".." {
        return Err(invalid("name"));
    }

    let mut target = code_path.to_path_buf();
    if let Some(relative) = attr.relative_path.as_deref().filter(|p| !p.is_empty()) {
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => target.push(part),
                Component::CurDir => {}
                _ => return Err(invalid("path")),
            }
        }
    }

    target.push(&attr.name);
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::builder::HapBuilder;
    use std::io::Cursor;

    fn reader(bytes: &[u8]) -> HapReader<Cursor<&[u8]>> {
        HapReader::new(Cursor::new(bytes), bytes.len() as u64)
    }

    #[test]
    fn test_header_info() {
        let bytes = HapBuilder::new("com.example.app").to_bytes();
        let mut r = reader(&bytes);
        assert_eq!(extract_file_header_info(&mut r).unwrap(), "com.example.app");
    }

    #[test]
    fn test_header_bad_magic() {
        let bytes = HapBuilder::new("com.example.app")
            .magic([0, 0, 0, 0])
            .to_bytes();
        let mut r = reader(&bytes);
        assert!(matches!(
            extract_file_header_info(&mut r),
            Err(Error::FileDataInvalid(_))
        ));
    }

    #[test]
    fn test_profile_found_and_others_skipped() {
        let bytes = HapBuilder::new("com.example.app")
            .entry("assets/js", "index.js", vec![b'x'; 10_000])
            .profile(br#"{"app":{}}"#.to_vec())
            .to_bytes();
        let mut r = reader(&bytes);
        let profile = extract_hap_profile(&mut r, 1024).unwrap();
        assert_eq!(profile, br#"{"app":{}}"#);
    }

    #[test]
    fn test_profile_in_subdirectory_is_ignored() {
        let bytes = HapBuilder::new("com.example.app")
            .entry("assets", PROFILE_NAME, b"{}".to_vec())
            .to_bytes();
        let mut r = reader(&bytes);
        assert!(matches!(
            extract_hap_profile(&mut r, 1024),
            Err(Error::ParseProfileError(_))
        ));
    }

    #[test]
    fn test_profile_too_large() {
        let bytes = HapBuilder::new("com.example.app")
            .profile(vec![b' '; 64])
            .to_bytes();
        let mut r = reader(&bytes);
        assert!(matches!(
            extract_hap_profile(&mut r, 16),
            Err(Error::ParseProfileError(_))
        ));
    }

    #[test]
    fn test_zero_size_entry_rejected() {
        let bytes = HapBuilder::new("com.example.app")
            .entry("", "empty.txt", Vec::new())
            .to_bytes();
        let mut r = reader(&bytes);
        extract_file_header_info(&mut r).unwrap();
        assert!(matches!(
            extract_file_attr(&mut r, true),
            Err(Error::FileDataInvalid(_))
        ));
    }

    #[test]
    fn test_extract_hap_writes_tree() {
        let dir = tempfile::tempdir().unwrap();
        let code = dir.path().join("code");
        let payload = vec![7u8; COPY_BUF_SIZE * 2 + 17];
        let bytes = HapBuilder::new("com.example.app")
            .profile(b"{}".to_vec())
            .entry("assets/js/default", "app.js", payload.clone())
            .to_bytes();

        let mut r = reader(&bytes);
        extract_hap(&code, "com.example.app", &mut r).unwrap();

        assert_eq!(fs::read(code.join(PROFILE_NAME)).unwrap(), b"{}");
        assert_eq!(
            fs::read(code.join("assets/js/default/app.js")).unwrap(),
            payload
        );
    }

    #[test]
    fn test_extract_hap_rejects_other_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = HapBuilder::new("com.example.app")
            .profile(b"{}".to_vec())
            .to_bytes();
        let mut r = reader(&bytes);
        let result = extract_hap(&dir.path().join("code"), "com.other.app", &mut r);
        assert!(matches!(result, Err(Error::FileDataInvalid(_))));
        assert!(!dir.path().join("code").exists());
    }

    #[test]
    fn test_extract_hap_rejects_traversal_in_entry_path() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = HapBuilder::new("com.example.app")
            .entry("../../etc", "passwd", b"root".to_vec())
            .to_bytes();
        let mut r = reader(&bytes);
        let result = extract_hap(&dir.path().join("code"), "com.example.app", &mut r);
        assert!(matches!(result, Err(Error::FileDataInvalid(_))));
        assert!(!dir.path().join("etc").exists());
    }

    #[test]
    fn test_extract_hap_truncated_payload() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = HapBuilder::new("com.example.app")
            .entry("", "big.bin", vec![1u8; 100])
            .to_bytes();
        bytes.truncate(bytes.len() - 50);

        let mut r = reader(&bytes);
        let result = extract_hap(&dir.path().join("code"), "com.example.app", &mut r);
        assert!(matches!(result, Err(Error::FileDataInvalid(_))));
        // the size check fires before the entry file is created
        assert!(!dir.path().join("code").exists());
    }

    #[test]
    fn test_bundle_param_validation() {
        let dir = tempfile::tempdir().unwrap();
        let config = InstallerConfig::with_root(dir.path());

        let ok = dir.path().join("ok.hap");
        HapBuilder::new("com.example.app").write_to(&ok).unwrap();
        assert_eq!(
            extract_bundle_param(&ok, &config).unwrap(),
            "com.example.app"
        );

        let short = dir.path().join("short.hap");
        HapBuilder::new("com.x").write_to(&short).unwrap();
        assert!(matches!(
            extract_bundle_param(&short, &config),
            Err(Error::FileDataInvalid(_))
        ));

        let traversal = dir.path().join("traversal.hap");
        HapBuilder::new("com.example/../../evil").write_to(&traversal).unwrap();
        assert!(matches!(
            extract_bundle_param(&traversal, &config),
            Err(Error::FileDataInvalid(_))
        ));
    }

    #[test]
    fn test_open_package_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            open_package(&dir.path().join("missing.hap")),
            Err(Error::FileNotExists(_))
        ));

        let empty = dir.path().join("empty.hap");
        fs::write(&empty, b"").unwrap();
        assert!(matches!(open_package(&empty), Err(Error::BadFile(_))));
        assert!(matches!(open_package(dir.path()), Err(Error::BadFile(_))));
    }
}
