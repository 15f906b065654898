use super::bucket::FileSystemBucket;
use crate::registry::{Registry, Slot};
use crate::traits::{Bucket, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use coffer_core::{BucketConfig, BucketsConfig, FileSystemStorageConfig};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;

/// Class name of [`FileSystemBucket`] in bucket configuration records.
pub const FILESYSTEM_BUCKET_CLASS: &str = "filesystem";

/// Storage backed by the local filesystem.
///
/// The storage itself performs no I/O: it supplies the root path, the base URL
/// and the permission mode to its buckets and keeps the bucket registry.
///
/// ```text
/// <base_path>/<bucket base sub path>/<templated sub dir>/<file name>
/// ```
pub struct FileSystemStorage {
    base_path: PathBuf,
    base_url: String,
    file_permission: u32,
    bucket_class_name: RwLock<String>,
    buckets: Registry<BucketConfig, FileSystemBucket>,
    me: Weak<FileSystemStorage>,
}

impl FileSystemStorage {
    /// Create a new FileSystemStorage instance
    ///
    /// Buckets listed in the configuration are registered unresolved and
    /// instantiated on first access.
    pub fn new(config: FileSystemStorageConfig) -> StorageResult<Arc<Self>> {
        config
            .validate()
            .map_err(|e| StorageError::InvalidArgument(e.to_string()))?;

        let FileSystemStorageConfig {
            base_path,
            base_url,
            file_permission,
            bucket_class_name,
            buckets,
        } = config;

        let entries = buckets
            .into_iter()
            .map(|(name, config)| (name, Slot::Unresolved(config)));

        let storage = Arc::new_cyclic(|me| FileSystemStorage {
            base_path,
            base_url,
            file_permission,
            bucket_class_name: RwLock::new(
                bucket_class_name.unwrap_or_else(|| FILESYSTEM_BUCKET_CLASS.to_string()),
            ),
            buckets: Registry::from_entries("Bucket", entries),
            me: me.clone(),
        });

        tracing::info!(
            base_path = %storage.base_path.display(),
            base_url = %storage.base_url,
            file_permission = %format_args!("{:o}", storage.file_permission),
            "Filesystem storage configured"
        );

        Ok(storage)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn file_permission(&self) -> u32 {
        self.file_permission
    }

    pub async fn bucket_class_name(&self) -> String {
        self.bucket_class_name.read().await.clone()
    }

    /// Set the class used for bucket records that do not name one
    pub async fn set_bucket_class_name(&self, class: impl Into<String>) -> StorageResult<()> {
        let class = class.into();
        if class.trim().is_empty() {
            return Err(StorageError::InvalidArgument(
                "Bucket class name must not be empty".to_string(),
            ));
        }
        *self.bucket_class_name.write().await = class;
        Ok(())
    }

    /// Get a bucket by name with its concrete type
    pub async fn bucket(&self, name: &str) -> StorageResult<Arc<FileSystemBucket>> {
        let default_class = self.bucket_class_name().await;
        self.buckets
            .resolve(name, |name, config| {
                self.create_bucket_instance(name, config, &default_class)
            })
            .await
    }

    /// Instantiate every registered bucket with its concrete type
    pub async fn buckets(&self) -> StorageResult<Vec<(String, Arc<FileSystemBucket>)>> {
        let default_class = self.bucket_class_name().await;
        self.buckets
            .resolve_all(|name, config| self.create_bucket_instance(name, config, &default_class))
            .await
    }

    /// Register a live bucket under `name`; the bucket is renamed and attached to this storage
    pub async fn add_bucket_instance(&self, name: &str, mut bucket: FileSystemBucket) {
        bucket.attach(name, self.me.clone());
        self.buckets
            .insert(name, Slot::Resolved(Arc::new(bucket)))
            .await;
        tracing::debug!(bucket = %name, "Bucket instance registered");
    }

    fn create_bucket_instance(
        &self,
        name: &str,
        config: BucketConfig,
        default_class: &str,
    ) -> StorageResult<Arc<FileSystemBucket>> {
        let class = config
            .class
            .clone()
            .unwrap_or_else(|| default_class.to_string());

        match class.as_str() {
            FILESYSTEM_BUCKET_CLASS => {
                let bucket = FileSystemBucket::from_config(name, config, self.me.clone())?;
                tracing::debug!(bucket = %name, class = %class, "Bucket instantiated");
                Ok(Arc::new(bucket))
            }
            other => Err(StorageError::InvalidArgument(format!(
                "Unknown bucket class '{}' for bucket '{}' of the filesystem storage",
                other, name
            ))),
        }
    }
}

#[async_trait]
impl Storage for FileSystemStorage {
    fn backend_type(&self) -> StorageBackend {
        StorageBackend::FileSystem
    }

    async fn set_buckets(&self, buckets: BucketsConfig) -> StorageResult<()> {
        for (name, config) in buckets {
            self.add_bucket(&name, config).await?;
        }
        Ok(())
    }

    async fn get_buckets(&self) -> StorageResult<BTreeMap<String, Arc<dyn Bucket>>> {
        Ok(self
            .buckets()
            .await?
            .into_iter()
            .map(|(name, bucket)| (name, bucket as Arc<dyn Bucket>))
            .collect())
    }

    async fn get_bucket(&self, name: &str) -> StorageResult<Arc<dyn Bucket>> {
        let bucket: Arc<dyn Bucket> = self.bucket(name).await?;
        Ok(bucket)
    }

    async fn add_bucket(&self, name: &str, config: BucketConfig) -> StorageResult<()> {
        if name.is_empty() {
            return Err(StorageError::InvalidArgument(
                "Name of the bucket must not be empty".to_string(),
            ));
        }
        self.buckets.insert(name, Slot::Unresolved(config)).await;
        Ok(())
    }

    async fn has_bucket(&self, name: &str) -> StorageResult<bool> {
        Ok(self.buckets.contains(name).await)
    }
}
