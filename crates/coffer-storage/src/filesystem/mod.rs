//! Local filesystem backend

mod bucket;
mod storage;

pub use bucket::FileSystemBucket;
pub use storage::{FileSystemStorage, FILESYSTEM_BUCKET_CLASS};
