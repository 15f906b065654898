//! Building blocks shared by bucket implementations.
//!
//! [`BucketBase`] carries the bucket name and the non-owning reference to the
//! owning storage. [`TemplatedBucket`] adds the sub-directory template and the
//! internal resolution cache.

use crate::template::SubDirTemplate;
use crate::traits::{StorageError, StorageResult};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;

/// Name and owning storage of a bucket.
///
/// The storage owns its buckets; a bucket only holds a `Weak` reference back,
/// so the pair never forms a reference cycle.
#[derive(Debug)]
pub struct BucketBase<S> {
    name: String,
    storage: Weak<S>,
}

impl<S> BucketBase<S> {
    pub fn new(name: impl Into<String>, storage: Weak<S>) -> Self {
        Self {
            name: name.into(),
            storage,
        }
    }

    /// A base with no name and no storage, to be attached on registration.
    pub fn detached() -> Self {
        Self {
            name: String::new(),
            storage: Weak::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning storage; `Detached` if the bucket was never registered or the storage is gone.
    pub fn storage(&self) -> StorageResult<Arc<S>> {
        self.storage
            .upgrade()
            .ok_or_else(|| StorageError::Detached(self.name.clone()))
    }

    pub(crate) fn attach(&mut self, name: impl Into<String>, storage: Weak<S>) {
        self.name = name.into();
        self.storage = storage;
    }
}

/// Memoized path resolution, cleared explicitly.
#[derive(Debug, Default)]
pub struct InternalCache {
    pub resolved_base_path: Option<PathBuf>,
}

/// Bucket base with a sub-directory template.
#[derive(Debug)]
pub struct TemplatedBucket<S> {
    base: BucketBase<S>,
    template: SubDirTemplate,
    cache: Mutex<InternalCache>,
}

impl<S> TemplatedBucket<S> {
    pub fn new(base: BucketBase<S>, template: SubDirTemplate) -> Self {
        Self {
            base,
            template,
            cache: Mutex::new(InternalCache::default()),
        }
    }

    pub fn base(&self) -> &BucketBase<S> {
        &self.base
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    pub fn storage(&self) -> StorageResult<Arc<S>> {
        self.base.storage()
    }

    pub fn file_sub_dir_template(&self) -> &SubDirTemplate {
        &self.template
    }

    /// Sub directory of `file_name`, resolved from the template.
    pub fn file_sub_dir(&self, file_name: &str) -> StorageResult<String> {
        self.template.resolve(file_name)
    }

    pub fn file_name_with_sub_dir(&self, file_name: &str) -> StorageResult<String> {
        self.template.file_name_with_sub_dir(file_name)
    }

    pub fn cache(&self) -> &Mutex<InternalCache> {
        &self.cache
    }

    pub async fn clear_internal_cache(&self) {
        *self.cache.lock().await = InternalCache::default();
    }

    pub(crate) fn attach(&mut self, name: impl Into<String>, storage: Weak<S>) {
        self.base.attach(name, storage);
        *self.cache.get_mut() = InternalCache::default();
    }
}
