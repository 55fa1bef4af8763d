// src/signature.rs

//! Signature verification interface and provisioning rules
//!
//! Cryptographic verification is done by an external library behind
//! [`SignatureVerifier`]. This module also holds the rules that relate the
//! verified provisioning info (appId, declared bundle name) to the package.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Trailing wildcard accepted in provisioning bundle names
pub const WILDCARD: &str = ".*";

/// Verified provisioning info of a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub app_id: String,
    /// Bundle name (or pattern) the signing profile was issued for
    pub bundle_name: String,
    #[serde(default)]
    pub restricted_permissions: Vec<String>,
}

/// Verifies a raw package file
pub trait SignatureVerifier {
    fn verify(&self, package: &Path) -> Result<SignatureInfo>;
}

impl<F> SignatureVerifier for F
where
    F: Fn(&Path) -> Result<SignatureInfo>,
{
    fn verify(&self, package: &Path) -> Result<SignatureInfo> {
        self(package)
    }
}

/// Whether the bundle-name part of an appId (before the first `_`) ends in
/// the wildcard
pub fn is_wildcard_app_id(app_id: &str) -> bool {
    let name_part = app_id.split_once('_').map_or(app_id, |(name, _)| name);
    name_part.ends_with(WILDCARD)
}

/// Rewrite an appId so it carries the concrete bundle name
///
/// An appId that already contains the bundle name is kept; otherwise the
/// bundle name replaces everything before the first `_`.
pub fn reshape_app_id(app_id: &str, bundle_name: &str) -> Result<String> {
    if app_id.contains(bundle_name) {
        return Ok(app_id.to_string());
    }

    let underscore = app_id.find('_').ok_or_else(|| {
        Error::InvalidProvisionInfo(format!("appId {} has no key suffix", app_id))
    })?;
    Ok(format!("{}{}", bundle_name, &app_id[underscore..]))
}

/// Match a provisioned bundle name against the manifest's bundle name
///
/// Accepts an exact match, the bare wildcard `.*`, or a common prefix
/// where the provisioned remainder after the first differing character is
/// exactly `.*`. A wildcard anywhere else is literal.
pub fn match_bundle_name(provisioned: &str, bundle_name: &str) -> bool {
    if provisioned == bundle_name || provisioned == WILDCARD {
        return true;
    }

    let common = provisioned
        .bytes()
        .zip(bundle_name.bytes())
        .take_while(|(a, b)| a == b)
        .count();

    provisioned.get(common..) == Some(WILDCARD)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SidecarDocument {
    app_id: String,
    bundle_name: String,
    #[serde(default)]
    restricted_permissions: Vec<String>,
    sha256: String,
}

/// Development verifier driven by a `<package>.sig.json` sidecar
///
/// The sidecar carries the provisioning info and the SHA-256 of the
/// package; verification succeeds when the package hashes to that value.
#[derive(Debug, Clone, Default)]
pub struct SidecarVerifier;

impl SidecarVerifier {
    pub fn sidecar_path(package: &Path) -> PathBuf {
        let mut name = package.as_os_str().to_os_string();
        name.push(".sig.json");
        PathBuf::from(name)
    }
}

/// Hex SHA-256 of a file
pub fn file_sha256(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

impl SignatureVerifier for SidecarVerifier {
    fn verify(&self, package: &Path) -> Result<SignatureInfo> {
        let sidecar = Self::sidecar_path(package);
        let content = fs::read_to_string(&sidecar).map_err(|e| {
            Error::VerifySignatureError(format!("Failed to read {}: {}", sidecar.display(), e))
        })?;
        let doc: SidecarDocument = serde_json::from_str(&content).map_err(|e| {
            Error::VerifySignatureError(format!("Failed to parse {}: {}", sidecar.display(), e))
        })?;

        let actual = file_sha256(package).map_err(|e| {
            Error::VerifySignatureError(format!("Failed to hash {}: {}", package.display(), e))
        })?;
        if !actual.eq_ignore_ascii_case(&doc.sha256) {
            return Err(Error::VerifySignatureError(format!(
                "digest mismatch for {}",
                package.display()
            )));
        }

        debug!("Verified {} for appId {}", package.display(), doc.app_id);
        Ok(SignatureInfo {
            app_id: doc.app_id,
            bundle_name: doc.bundle_name,
            restricted_permissions: doc.restricted_permissions,
        })
    }
}
