//! Storage abstraction traits
//!
//! This module defines the contracts every bucket and every storage must
//! implement, together with the error type shared by all of them.

use crate::StorageBackend;
use async_trait::async_trait;
use coffer_core::{BucketConfig, BucketsConfig, ConfigError};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Storage operation errors
///
/// Configuration and lookup problems surface as `Err`. Physical I/O failures of
/// mutating bucket operations are reported as `Ok(false)` instead, see [`Bucket`].
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Path is not writable: {0}")]
    PathUnwritable(String),

    #[error("Unable to resolve file sub dir: unknown placeholder '{0}'")]
    UnknownPlaceholder(String),

    #[error("Unable to determine default storage in the hub")]
    NoDefaultStorage,

    #[error("Bucket '{0}' is not attached to a live storage")]
    Detached(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<ConfigError> for StorageError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidArgument(message) => StorageError::InvalidArgument(message),
            other => StorageError::ConfigError(other.to_string()),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Reference to a file for the bucket-internal copy and move operations.
///
/// A plain name addresses a file of the bucket the operation is invoked on;
/// the two-part form addresses a file of another bucket of the same storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRef {
    Own(String),
    InBucket { bucket: String, file: String },
}

impl FileRef {
    pub fn file_name(&self) -> &str {
        match self {
            FileRef::Own(file) | FileRef::InBucket { file, .. } => file,
        }
    }
}

impl From<&str> for FileRef {
    fn from(file: &str) -> Self {
        FileRef::Own(file.to_string())
    }
}

impl From<String> for FileRef {
    fn from(file: String) -> Self {
        FileRef::Own(file)
    }
}

impl From<(&str, &str)> for FileRef {
    fn from((bucket, file): (&str, &str)) -> Self {
        FileRef::InBucket {
            bucket: bucket.to_string(),
            file: file.to_string(),
        }
    }
}

impl From<(String, String)> for FileRef {
    fn from((bucket, file): (String, String)) -> Self {
        FileRef::InBucket { bucket, file }
    }
}

impl Display for FileRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            FileRef::Own(file) => write!(f, "{}", file),
            FileRef::InBucket { bucket, file } => write!(f, "{}:{}", bucket, file),
        }
    }
}

/// Bucket abstraction trait
///
/// A bucket is a named container of files with a single physical backing
/// location. Callers address files by name only; where a file lives is the
/// bucket's business.
///
/// Mutating operations return `Ok(true)` on success and `Ok(false)` when the
/// backing medium refused the operation (the failure is logged). Contract
/// violations such as unknown buckets or unusable paths are returned as `Err`.
#[async_trait]
pub trait Bucket: Send + Sync {
    /// Name of the bucket, unique within its owning storage
    fn name(&self) -> &str;

    /// Make sure the bucket's backing location exists
    async fn create(&self) -> StorageResult<bool>;

    /// Irreversibly remove the bucket's contents and clear resolution caches.
    /// The bucket stays registered in its storage.
    async fn destroy(&self) -> StorageResult<bool>;

    /// Check whether the bucket's backing location exists
    async fn exists(&self) -> StorageResult<bool>;

    /// Write `content` as the full content of `file_name`, replacing any existing file
    async fn save_file_content(&self, file_name: &str, content: &[u8]) -> StorageResult<bool>;

    /// Read a file; fails with `NotFound` if absent
    async fn get_file_content(&self, file_name: &str) -> StorageResult<Vec<u8>>;

    /// Delete a file. Deleting a missing file is a success.
    async fn delete_file(&self, file_name: &str) -> StorageResult<bool>;

    /// Check if a file exists
    async fn file_exists(&self, file_name: &str) -> StorageResult<bool>;

    /// Copy a file from the local filesystem into the bucket
    async fn copy_file_in(&self, src_path: &Path, file_name: &str) -> StorageResult<bool>;

    /// Copy a file from the bucket onto the local filesystem
    async fn copy_file_out(&self, file_name: &str, dest_path: &Path) -> StorageResult<bool>;

    /// Copy a file inside this bucket or between buckets of the same storage
    async fn copy_file_internal(&self, src: FileRef, dest: FileRef) -> StorageResult<bool>;

    /// Move a file inside this bucket or between buckets of the same storage.
    /// The source is deleted only after a successful copy.
    async fn move_file_internal(&self, src: FileRef, dest: FileRef) -> StorageResult<bool>;

    /// Copy a local file into the bucket, then delete the local file
    async fn move_file_in(&self, src_path: &Path, file_name: &str) -> StorageResult<bool> {
        if !self.copy_file_in(src_path, file_name).await? {
            return Ok(false);
        }
        match tokio::fs::remove_file(src_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => {
                tracing::error!(
                    bucket = %self.name(),
                    path = %src_path.display(),
                    error = %e,
                    "Unable to delete source file after copying it in"
                );
                Ok(false)
            }
        }
    }

    /// Copy a bucket file onto the local filesystem, then delete it from the bucket
    async fn move_file_out(&self, file_name: &str, dest_path: &Path) -> StorageResult<bool> {
        if !self.copy_file_out(file_name, dest_path).await? {
            return Ok(false);
        }
        self.delete_file(file_name).await
    }

    /// Build the caller-facing URL of a file. Reachability is not checked.
    fn get_file_url(&self, file_name: &str) -> StorageResult<String>;
}

/// Storage abstraction trait
///
/// A storage is a registry of buckets sharing one backend and configuration.
/// Buckets are registered as configuration records and instantiated on first
/// access; every later lookup of the same name returns the same instance.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;

    /// Register every bucket of `buckets`, replacing same-named registrations
    async fn set_buckets(&self, buckets: BucketsConfig) -> StorageResult<()>;

    /// Instantiate every registered bucket and return them by name
    async fn get_buckets(&self) -> StorageResult<BTreeMap<String, Arc<dyn Bucket>>>;

    /// Get a bucket by name; fails with `NotFound` for unknown names
    async fn get_bucket(&self, name: &str) -> StorageResult<Arc<dyn Bucket>>;

    /// Register a bucket configuration under `name`
    async fn add_bucket(&self, name: &str, config: BucketConfig) -> StorageResult<()>;

    /// Check whether a bucket is registered under `name`
    async fn has_bucket(&self, name: &str) -> StorageResult<bool>;

    /// Register a bucket from untyped configuration data.
    /// Scalars and lists are rejected with `InvalidArgument`.
    async fn add_bucket_value(&self, name: &str, data: serde_json::Value) -> StorageResult<()> {
        let config = BucketConfig::from_value(data)?;
        self.add_bucket(name, config).await
    }

    /// Register buckets from untyped data: a map of records or a list of bare names
    async fn set_buckets_value(&self, data: serde_json::Value) -> StorageResult<()> {
        let buckets = BucketsConfig::from_value(data)?;
        self.set_buckets(buckets).await
    }
}
