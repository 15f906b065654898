//! Coffer Core Library
//!
//! This crate provides the configuration records, backend types and tracing
//! setup shared by the Coffer storage crates.

pub mod config;
pub mod error;
pub mod storage_types;
pub mod telemetry;

// Re-export commonly used types
pub use config::{
    BucketConfig, BucketsConfig, FileSystemStorageConfig, HubConfig, NamedStorageConfig,
    StorageConfig, DEFAULT_FILE_PERMISSION,
};
pub use error::ConfigError;
pub use storage_types::StorageBackend;
