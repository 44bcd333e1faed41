//! Run configuration consumed by the engine
//!
//! This is the configuration surface of the core, independent of any
//! concrete CLI syntax: the binary maps its flags onto [`SyncConfig`] and
//! hands it to the engine. Validation happens up front and produces
//! [`SyncError::Configuration`], which is always fatal.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Policy choosing what evidence triggers re-synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckLevel {
    /// Only the locally persisted signatures are consulted
    LocalMd5,
    /// Local signatures plus the destination's stored signature
    RemoteMd5,
    /// Only the dirty (archive) flag is consulted; content signatures are
    /// ignored entirely under this level
    ArchiveFlag,
}

impl FromStr for CheckLevel {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "localmd5" | "local" => Ok(CheckLevel::LocalMd5),
            "remotemd5" | "remote" => Ok(CheckLevel::RemoteMd5),
            "archiveflag" | "archive" => Ok(CheckLevel::ArchiveFlag),
            other => Err(SyncError::configuration(format!(
                "unsupported check level '{}'",
                other
            ))),
        }
    }
}

/// Which transform the engine applies before writing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformKind {
    /// Encrypt content and metadata
    Secure,
    /// Decrypt content and metadata, verifying signatures
    Unsecure,
    /// Pass objects through untransformed
    None,
}

impl FromStr for TransformKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "secure" => Ok(TransformKind::Secure),
            "unsecure" => Ok(TransformKind::Unsecure),
            "none" => Ok(TransformKind::None),
            other => Err(SyncError::configuration(format!(
                "unsupported transform kind '{}'",
                other
            ))),
        }
    }
}

/// Kind of repository acting as source or destination
///
/// Only the local filesystem backend ships with this build; the cloud kinds
/// are recognized so configurations can name them, but constructing them
/// yields a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepositoryKind {
    /// Local filesystem directory
    Local,
    /// Google Cloud Storage bucket
    Gcs,
    /// Amazon S3 bucket
    S3,
    /// Azure Blob Storage container
    Azure,
}

impl FromStr for RepositoryKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(RepositoryKind::Local),
            "gcs" => Ok(RepositoryKind::Gcs),
            "s3" => Ok(RepositoryKind::S3),
            "azure" | "abs" => Ok(RepositoryKind::Azure),
            other => Err(SyncError::configuration(format!(
                "unsupported repository kind '{}'",
                other
            ))),
        }
    }
}

/// One endpoint of a sync run (either side)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Backend kind
    pub kind: RepositoryKind,
    /// Directory path or bucket name
    pub path: PathBuf,
    /// Credentials file for non-local backends
    pub credentials: Option<PathBuf>,
}

impl EndpointConfig {
    /// Local-filesystem endpoint
    pub fn local(path: impl Into<PathBuf>) -> Self {
        EndpointConfig {
            kind: RepositoryKind::Local,
            path: path.into(),
            credentials: None,
        }
    }
}

/// Full configuration of one engine invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Where files are read from
    pub source: EndpointConfig,
    /// Where files are written to
    pub destination: EndpointConfig,
    /// Transform applied between the two
    pub transform: TransformKind,
    /// Key file, mandatory when `transform != None`
    pub crypto_key: Option<PathBuf>,
    /// Change-detection policy
    pub check_level: CheckLevel,
    /// Skip the ghost-deletion and artifact-cleaning phases
    pub no_cleaning: bool,
    /// Log full object paths instead of truncated ones
    pub wide_display: bool,
}

impl SyncConfig {
    /// Validate mandatory settings before the engine starts
    pub fn validate(&self) -> Result<()> {
        if self.source.path.as_os_str().is_empty() {
            return Err(SyncError::configuration("source path is mandatory"));
        }
        if self.destination.path.as_os_str().is_empty() {
            return Err(SyncError::configuration("destination path is mandatory"));
        }
        if self.transform != TransformKind::None && self.crypto_key.is_none() {
            return Err(SyncError::configuration(
                "crypto key file is mandatory when a transform is configured",
            ));
        }
        if self.source.kind != RepositoryKind::Local && self.source.credentials.is_none() {
            return Err(SyncError::configuration(
                "source credentials are mandatory for non-local backends",
            ));
        }
        if self.destination.kind != RepositoryKind::Local && self.destination.credentials.is_none()
        {
            return Err(SyncError::configuration(
                "destination credentials are mandatory for non-local backends",
            ));
        }
        Ok(())
    }
}
