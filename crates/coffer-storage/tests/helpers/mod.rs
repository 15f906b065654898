use coffer_core::{BucketConfig, BucketsConfig, FileSystemStorageConfig};
use coffer_storage::FileSystemStorage;
use std::sync::Arc;
use tempfile::TempDir;

pub const BASE_URL: &str = "http://localhost:3000/files";

/// Filesystem storage rooted in a fresh temporary directory
pub struct TestStorage {
    pub dir: TempDir,
    pub storage: Arc<FileSystemStorage>,
}

impl TestStorage {
    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }
}

/// Storage with a flat `temp` bucket and a templated `image` bucket
pub fn setup_test_storage() -> TestStorage {
    coffer_core::telemetry::try_init_tracing();

    let dir = TempDir::new().expect("create temp dir");
    let buckets = BucketsConfig::new()
        .with("temp", BucketConfig::new())
        .with(
            "image",
            BucketConfig::new()
                .with_base_sub_path("img")
                .with_file_sub_dir_template("{ext}/{^name}/{^^name}"),
        );
    let storage = FileSystemStorage::new(
        FileSystemStorageConfig::new(dir.path(), BASE_URL).with_buckets(buckets),
    )
    .expect("create storage");

    TestStorage { dir, storage }
}
