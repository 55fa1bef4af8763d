// src/error.rs

use thiserror::Error;

/// Core error types for the installer
///
/// Every variant maps to a stable numeric code (see [`Error::code`]) which is
/// what the install/uninstall callback carries back to the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// Package file does not exist
    #[error("Package file not found: {0}")]
    FileNotExists(String),

    /// Package file is empty or not a regular file
    #[error("Bad package file: {0}")]
    BadFile(String),

    /// Malformed binary container
    #[error("Invalid package data: {0}")]
    FileDataInvalid(String),

    /// Manifest (profile) missing or malformed
    #[error("Failed to parse profile: {0}")]
    ParseProfileError(String),

    /// Bundle name / appId does not match the provisioning info
    #[error("Invalid provision info: {0}")]
    InvalidProvisionInfo(String),

    /// A restricted permission is requested but not granted by the signature
    #[error("Invalid permission: {0}")]
    InvalidPermission(String),

    /// Too many third-party bundles installed
    #[error("Exceeded maximum number of third-party bundles ({0})")]
    ExceedMaxBundleNumber(u32),

    /// Upgrade would lower the version code
    #[error("Version downgrade of {bundle}: installed {installed}, package {attempted}")]
    VersionDowngrade {
        bundle: String,
        installed: u32,
        attempted: u32,
    },

    /// Upgrade signed by a different appId
    #[error("Incompatible signature: {0}")]
    IncompatibleSignature(String),

    /// Package signature could not be verified
    #[error("Signature verification failed: {0}")]
    VerifySignatureError(String),

    /// Creating, extracting into or renaming a code directory failed
    #[error("Failed to commit code directory: {0}")]
    RenameDirError(String),

    /// Creating the data directory failed
    #[error("Failed to create data directory: {0}")]
    CreateDataDirError(String),

    /// Writing the install record or uid/gid ledger failed
    #[error("Failed to record install info: {0}")]
    RecordInfoError(String),

    /// Persisting permissions failed
    #[error("Failed to store permissions: {0}")]
    StorePermissionsError(String),

    /// Bytecode transform step failed
    #[error("Bytecode transform failed: {0}")]
    TransformError(String),

    /// Anything else that aborts the current operation
    #[error("Internal error: {0}")]
    InternalError(String),

    /// Uninstall target is not installed
    #[error("Bundle not installed: {0}")]
    BundleNotExists(String),

    /// Uninstall target is a system app
    #[error("Bundle cannot be uninstalled: {0}")]
    BundleNotUninstallable(String),

    /// Removing permissions during uninstall failed
    #[error("Failed to delete permissions: {0}")]
    DeletePermissionsError(String),

    /// Removing code/data directories during uninstall failed
    #[error("Failed to delete bundle directories: {0}")]
    DeleteDirsError(String),

    /// Removing the install record during uninstall failed
    #[error("Failed to delete install record: {0}")]
    DeleteRecordInfoError(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Numeric result code reported through the progress callback
    pub fn code(&self) -> u8 {
        match self {
            Error::FileNotExists(_) => 1,
            Error::BadFile(_) => 2,
            Error::FileDataInvalid(_) => 3,
            Error::ParseProfileError(_) => 4,
            Error::InvalidProvisionInfo(_) => 5,
            Error::InvalidPermission(_) => 6,
            Error::ExceedMaxBundleNumber(_) => 7,
            Error::VersionDowngrade { .. } => 8,
            Error::IncompatibleSignature(_) => 9,
            Error::VerifySignatureError(_) => 10,
            Error::RenameDirError(_) => 11,
            Error::CreateDataDirError(_) => 12,
            Error::RecordInfoError(_) => 13,
            Error::StorePermissionsError(_) => 14,
            Error::TransformError(_) => 15,
            Error::InternalError(_) => 16,
            Error::BundleNotExists(_) => 20,
            Error::BundleNotUninstallable(_) => 21,
            Error::DeletePermissionsError(_) => 22,
            Error::DeleteDirsError(_) => 23,
            Error::DeleteRecordInfoError(_) => 24,
            Error::Config(_) => 30,
            Error::Io(_) => 31,
            Error::Json(_) => 32,
        }
    }

    /// Whether this error comes from the uninstall path
    pub fn is_uninstall(&self) -> bool {
        matches!(
            self,
            Error::BundleNotExists(_)
                | Error::BundleNotUninstallable(_)
                | Error::DeletePermissionsError(_)
                | Error::DeleteDirsError(_)
                | Error::DeleteRecordInfoError(_)
        )
    }
}

/// Result type alias using the installer's Error type
pub type Result<T> = std::result::Result<T, Error>;
