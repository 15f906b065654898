//! Storage hub
//!
//! A hub presents several storages as one bucket name-space. Bucket lookups
//! scan the member storages in configured order and the first member owning
//! the name wins. The first member is the default storage: hub-level bucket
//! registration always targets it.

use crate::factory::create_storage;
use crate::registry::{Registry, Slot};
use crate::traits::{Bucket, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use coffer_core::{BucketConfig, BucketsConfig, HubConfig, StorageConfig};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct StorageHub {
    storages: Registry<StorageConfig, dyn Storage>,
}

impl StorageHub {
    pub fn new() -> Self {
        Self {
            storages: Registry::new("Storage"),
        }
    }

    /// Create a hub from configuration. Member storages are instantiated on first access.
    pub fn from_config(config: &HubConfig) -> StorageResult<Self> {
        let mut entries = Vec::with_capacity(config.storages.len());
        for member in &config.storages {
            validate_storage_name(&member.name)?;
            entries.push((member.name.clone(), Slot::Unresolved(member.config.clone())));
        }

        tracing::info!(storages = entries.len(), "Storage hub configured");

        Ok(Self {
            storages: Registry::from_entries("Storage", entries),
        })
    }

    /// Replace all member storages with the members of `config`
    pub async fn set_storages(&self, config: HubConfig) -> StorageResult<()> {
        let mut entries = Vec::with_capacity(config.storages.len());
        for member in config.storages {
            validate_storage_name(&member.name)?;
            entries.push((member.name, Slot::Unresolved(member.config)));
        }

        tracing::debug!(storages = entries.len(), "Storage hub members replaced");
        self.storages.replace_all(entries).await;
        Ok(())
    }

    /// Register a storage configuration under `name`
    pub async fn add_storage(&self, name: &str, config: StorageConfig) -> StorageResult<()> {
        validate_storage_name(name)?;
        self.storages.insert(name, Slot::Unresolved(config)).await;
        tracing::debug!(storage = %name, "Storage registered");
        Ok(())
    }

    /// Register a live storage under `name`
    pub async fn add_storage_instance(
        &self,
        name: &str,
        storage: Arc<dyn Storage>,
    ) -> StorageResult<()> {
        validate_storage_name(name)?;
        self.storages.insert(name, Slot::Resolved(storage)).await;
        tracing::debug!(storage = %name, "Storage instance registered");
        Ok(())
    }

    /// Register a storage from untyped data. Scalars, lists and empty records
    /// are rejected with `InvalidArgument`.
    pub async fn add_storage_value(&self, name: &str, data: serde_json::Value) -> StorageResult<()> {
        let config = StorageConfig::from_value(data)?;
        self.add_storage(name, config).await
    }

    pub async fn get_storage(&self, name: &str) -> StorageResult<Arc<dyn Storage>> {
        self.storages
            .resolve(name, |_, config| create_storage(&config))
            .await
    }

    /// Instantiate every member storage, in configured order
    pub async fn get_storages(&self) -> StorageResult<Vec<(String, Arc<dyn Storage>)>> {
        self.storages
            .resolve_all(|_, config| create_storage(&config))
            .await
    }

    pub async fn has_storage(&self, name: &str) -> bool {
        self.storages.contains(name).await
    }

    /// The first configured storage
    pub async fn get_default_storage(&self) -> StorageResult<Arc<dyn Storage>> {
        let name = self
            .storages
            .first_name()
            .await
            .ok_or(StorageError::NoDefaultStorage)?;
        self.get_storage(&name).await
    }

    /// First member storage owning a bucket called `name`
    async fn find_storage_with_bucket(
        &self,
        name: &str,
    ) -> StorageResult<Option<(String, Arc<dyn Storage>)>> {
        for storage_name in self.storages.names().await {
            let storage = self.get_storage(&storage_name).await?;
            if storage.has_bucket(name).await? {
                return Ok(Some((storage_name, storage)));
            }
        }
        Ok(None)
    }
}

impl Default for StorageHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for StorageHub {
    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Hub
    }

    async fn set_buckets(&self, buckets: BucketsConfig) -> StorageResult<()> {
        self.get_default_storage().await?.set_buckets(buckets).await
    }

    /// Buckets of every member storage. On a name collision the storage
    /// configured last wins, unlike [`Storage::get_bucket`] where the first does.
    async fn get_buckets(&self) -> StorageResult<BTreeMap<String, Arc<dyn Bucket>>> {
        let mut merged = BTreeMap::new();
        for (_, storage) in self.get_storages().await? {
            merged.extend(storage.get_buckets().await?);
        }
        Ok(merged)
    }

    async fn get_bucket(&self, name: &str) -> StorageResult<Arc<dyn Bucket>> {
        match self.find_storage_with_bucket(name).await? {
            Some((storage_name, storage)) => {
                tracing::debug!(bucket = %name, storage = %storage_name, "Bucket routed");
                storage.get_bucket(name).await
            }
            None => Err(StorageError::NotFound(format!(
                "Bucket named '{}' is not registered in any storage of the hub",
                name
            ))),
        }
    }

    async fn add_bucket(&self, name: &str, config: BucketConfig) -> StorageResult<()> {
        self.get_default_storage()
            .await?
            .add_bucket(name, config)
            .await
    }

    async fn has_bucket(&self, name: &str) -> StorageResult<bool> {
        Ok(self.find_storage_with_bucket(name).await?.is_some())
    }
}

fn validate_storage_name(name: &str) -> StorageResult<()> {
    if name.trim().is_empty() {
        return Err(StorageError::InvalidArgument(
            "Name of the storage must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(all(test, feature = "storage-filesystem"))]
mod tests {
    use super::*;
    use crate::FileSystemStorage;
    use coffer_core::FileSystemStorageConfig;
    use serde_json::json;
    use std::path::Path;
    use tempfile::tempdir;

    fn fs_config(path: &Path, buckets: &[&str]) -> StorageConfig {
        StorageConfig::FileSystem(
            FileSystemStorageConfig::new(path, "http://localhost/files")
                .with_buckets(BucketsConfig::from_names(buckets.iter().copied())),
        )
    }

    fn two_storage_hub(first: &Path, second: &Path) -> StorageHub {
        StorageHub::from_config(
            &HubConfig::default()
                .with_storage("s1", fs_config(first, &["a", "shared"]))
                .with_storage("s2", fs_config(second, &["b", "shared"])),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_routes_to_owning_storage() {
        let (d1, d2) = (tempdir().unwrap(), tempdir().unwrap());
        let hub = two_storage_hub(d1.path(), d2.path());

        let a = hub.get_bucket("a").await.unwrap();
        let b = hub.get_bucket("b").await.unwrap();
        let s1 = hub.get_storage("s1").await.unwrap();
        let s2 = hub.get_storage("s2").await.unwrap();

        assert!(Arc::ptr_eq(&a, &s1.get_bucket("a").await.unwrap()));
        assert!(Arc::ptr_eq(&b, &s2.get_bucket("b").await.unwrap()));
        assert!(matches!(
            hub.get_bucket("c").await,
            Err(StorageError::NotFound(_))
        ));

        assert!(hub.has_bucket("b").await.unwrap());
        assert!(!hub.has_bucket("c").await.unwrap());
    }

    #[tokio::test]
    async fn test_lookup_and_merge_precedence_differ() {
        let (d1, d2) = (tempdir().unwrap(), tempdir().unwrap());
        let hub = two_storage_hub(d1.path(), d2.path());

        let s1_shared = hub
            .get_storage("s1")
            .await
            .unwrap()
            .get_bucket("shared")
            .await
            .unwrap();
        let s2_shared = hub
            .get_storage("s2")
            .await
            .unwrap()
            .get_bucket("shared")
            .await
            .unwrap();

        // single lookup: first storage wins
        assert!(Arc::ptr_eq(&hub.get_bucket("shared").await.unwrap(), &s1_shared));

        // merge: last storage wins
        let all = hub.get_buckets().await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(Arc::ptr_eq(&all["shared"], &s2_shared));
    }

    #[tokio::test]
    async fn test_add_bucket_targets_default_storage() {
        let (d1, d2) = (tempdir().unwrap(), tempdir().unwrap());
        let hub = two_storage_hub(d1.path(), d2.path());

        hub.add_bucket("fresh", BucketConfig::new()).await.unwrap();
        hub.set_buckets(BucketsConfig::from_names(["also"]))
            .await
            .unwrap();

        let s1 = hub.get_storage("s1").await.unwrap();
        let s2 = hub.get_storage("s2").await.unwrap();
        assert!(s1.has_bucket("fresh").await.unwrap());
        assert!(s1.has_bucket("also").await.unwrap());
        assert!(!s2.has_bucket("fresh").await.unwrap());

        let default = hub.get_default_storage().await.unwrap();
        assert!(Arc::ptr_eq(&default, &s1));
    }

    #[tokio::test]
    async fn test_set_storages_replaces_members() {
        let (d1, d2) = (tempdir().unwrap(), tempdir().unwrap());
        let hub = StorageHub::from_config(
            &HubConfig::default().with_storage("old", fs_config(d1.path(), &["a"])),
        )
        .unwrap();
        assert!(hub.has_bucket("a").await.unwrap());

        hub.set_storages(HubConfig::default().with_storage("new", fs_config(d2.path(), &["b"])))
            .await
            .unwrap();

        let names: Vec<String> = hub
            .get_storages()
            .await
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["new"]);
        assert!(!hub.has_storage("old").await);
        assert!(!hub.has_bucket("a").await.unwrap());
        assert!(hub.has_bucket("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_storages_rejects_empty_name_and_keeps_members() {
        let dir = tempdir().unwrap();
        let hub = StorageHub::from_config(
            &HubConfig::default().with_storage("kept", fs_config(dir.path(), &["a"])),
        )
        .unwrap();

        let result = hub
            .set_storages(HubConfig::default().with_storage(" ", fs_config(dir.path(), &["b"])))
            .await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));
        assert!(hub.has_storage("kept").await);
    }

    #[tokio::test]
    async fn test_empty_hub_has_no_default_storage() {
        let hub = StorageHub::new();
        assert!(matches!(
            hub.get_default_storage().await,
            Err(StorageError::NoDefaultStorage)
        ));
        assert!(matches!(
            hub.add_bucket("a", BucketConfig::new()).await,
            Err(StorageError::NoDefaultStorage)
        ));
        assert!(matches!(
            hub.get_bucket("a").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(hub.get_buckets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_slots_resolve_once() {
        let dir = tempdir().unwrap();
        let hub = StorageHub::new();
        hub.add_storage("s1", fs_config(dir.path(), &["a"]))
            .await
            .unwrap();

        let first = hub.get_storage("s1").await.unwrap();
        let second = hub.get_storage("s1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(matches!(
            hub.get_storage("missing").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_add_storage_instance_and_order() {
        let (d1, d2) = (tempdir().unwrap(), tempdir().unwrap());
        let hub = StorageHub::new();

        let live: Arc<dyn Storage> = FileSystemStorage::new(
            FileSystemStorageConfig::new(d1.path(), "http://localhost/live")
                .with_buckets(BucketsConfig::from_names(["x"])),
        )
        .unwrap();
        hub.add_storage_instance("live", live.clone()).await.unwrap();
        hub.add_storage("configured", fs_config(d2.path(), &["y"]))
            .await
            .unwrap();

        let names: Vec<String> = hub
            .get_storages()
            .await
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["live", "configured"]);
        assert!(Arc::ptr_eq(&hub.get_default_storage().await.unwrap(), &live));
        assert!(hub.has_storage("configured").await);
    }

    #[tokio::test]
    async fn test_add_storage_value_validation() {
        let hub = StorageHub::new();

        for data in [json!("scalar"), json!([1, 2]), json!({})] {
            let result = hub.add_storage_value("s", data).await;
            assert!(matches!(result, Err(StorageError::InvalidArgument(_))));
        }

        let result = hub.add_storage("", StorageConfig::Hub(HubConfig::default())).await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));
        assert!(!hub.has_storage("s").await);
    }

    #[tokio::test]
    async fn test_add_storage_value_registers_record() {
        let dir = tempdir().unwrap();
        let hub = StorageHub::new();

        hub.add_storage_value(
            "files",
            json!({
                "class": "filesystem",
                "basePath": dir.path(),
                "baseUrl": "http://localhost/files",
                "buckets": ["docs"]
            }),
        )
        .await
        .unwrap();

        let bucket = hub.get_bucket("docs").await.unwrap();
        assert_eq!(
            bucket.get_file_url("a.pdf").unwrap(),
            "http://localhost/files/docs/a.pdf"
        );
    }

    #[tokio::test]
    async fn test_nested_hub_routes_through() {
        let dir = tempdir().unwrap();
        let inner = HubConfig::default().with_storage("fs", fs_config(dir.path(), &["deep"]));
        let hub = StorageHub::from_config(
            &HubConfig::default().with_storage("inner", StorageConfig::Hub(inner)),
        )
        .unwrap();

        let bucket = hub.get_bucket("deep").await.unwrap();
        assert!(bucket.save_file_content("f.txt", b"nested").await.unwrap());
        assert!(dir.path().join("deep/f.txt").exists());

        let inner = hub.get_storage("inner").await.unwrap();
        assert_eq!(inner.backend_type(), StorageBackend::Hub);
    }

    #[tokio::test]
    async fn test_failed_storage_build_propagates() {
        let hub = StorageHub::new();
        hub.add_storage(
            "broken",
            StorageConfig::FileSystem(FileSystemStorageConfig::new("", "")),
        )
        .await
        .unwrap();

        assert!(matches!(
            hub.get_bucket("a").await,
            Err(StorageError::InvalidArgument(_))
        ));
        assert!(hub.has_storage("broken").await);
    }
}
