//! Coffer Storage Library
//!
//! This crate provides the bucket and storage abstractions of Coffer together
//! with a local filesystem backend and a hub that merges several storages
//! into one bucket name-space.
//!
//! # File layout
//!
//! A filesystem bucket stores each file under
//!
//! ```text
//! <base path>/<bucket base sub path>/<templated sub dir>/<file name>
//! ```
//!
//! where the sub dir is computed from the file name by a [`SubDirTemplate`]
//! such as `{^name}/{^^name}`. File names must not contain `..` or a leading `/`.
//!
//! # Example
//!
//! ```no_run
//! use coffer_core::HubConfig;
//! use coffer_storage::{Bucket, Storage, StorageHub};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = HubConfig::from_json_file("storages.json")?;
//! let hub = StorageHub::from_config(&config)?;
//! let bucket = hub.get_bucket("images").await?;
//! bucket.save_file_content("photo.jpg", b"...").await?;
//! # Ok(())
//! # }
//! ```

pub mod bucket;
pub mod factory;
#[cfg(feature = "storage-filesystem")]
pub mod filesystem;
pub mod hub;
pub mod registry;
pub mod template;
pub mod traits;

// Re-export commonly used types
pub use bucket::{BucketBase, InternalCache, TemplatedBucket};
pub use coffer_core::StorageBackend;
pub use factory::create_storage;
#[cfg(feature = "storage-filesystem")]
pub use filesystem::{FileSystemBucket, FileSystemStorage, FILESYSTEM_BUCKET_CLASS};
pub use hub::StorageHub;
pub use template::SubDirTemplate;
pub use traits::{Bucket, FileRef, Storage, StorageError, StorageResult};
