#[cfg(feature = "storage-filesystem")]
use crate::FileSystemStorage;
use crate::{Storage, StorageHub, StorageResult};
use coffer_core::StorageConfig;
use std::sync::Arc;

/// Create a storage from its configuration record
///
/// Buckets and hub members named in the record are registered unresolved and
/// instantiated on first access.
pub fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    tracing::debug!(backend = %config.backend(), "Creating storage");

    match config {
        #[cfg(feature = "storage-filesystem")]
        StorageConfig::FileSystem(config) => {
            let storage = FileSystemStorage::new(config.clone())?;
            Ok(storage)
        }

        #[cfg(not(feature = "storage-filesystem"))]
        StorageConfig::FileSystem(_) => Err(crate::StorageError::ConfigError(
            "Filesystem storage backend not available (storage-filesystem feature not enabled)"
                .to_string(),
        )),

        StorageConfig::Hub(config) => {
            let hub = StorageHub::from_config(config)?;
            Ok(Arc::new(hub))
        }
    }
}

/// Create a filesystem storage rooted at `base_path` for tests
#[cfg(all(test, feature = "storage-filesystem"))]
pub fn create_test_storage(base_path: &std::path::Path) -> StorageResult<Arc<dyn Storage>> {
    use coffer_core::FileSystemStorageConfig;

    create_storage(&StorageConfig::FileSystem(FileSystemStorageConfig::new(
        base_path,
        "http://localhost:3000/files",
    )))
}
