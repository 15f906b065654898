use super::storage::FileSystemStorage;
use crate::bucket::{BucketBase, TemplatedBucket};
use crate::template::SubDirTemplate;
use crate::traits::{Bucket, FileRef, StorageError, StorageResult};
use async_trait::async_trait;
use coffer_core::BucketConfig;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Bucket stored in a directory of a [`FileSystemStorage`].
///
/// Configuration example (JSON):
///
/// ```json
/// {
///     "tempFiles": { "baseSubPath": "temp", "fileSubDirTemplate": "{^name}/{^^name}" },
///     "imageFiles": { "baseSubPath": "image", "fileSubDirTemplate": "{ext}/{^name}/{^^name}" }
/// }
/// ```
///
/// With the storage rooted at `/srv/files`, `54321.tmp` in `tempFiles` lives at
/// `/srv/files/temp/5/4/54321.tmp`.
pub struct FileSystemBucket {
    inner: TemplatedBucket<FileSystemStorage>,
    base_sub_path: Option<String>,
}

impl FileSystemBucket {
    /// Create a detached bucket, to be registered with
    /// [`FileSystemStorage::add_bucket_instance`].
    pub fn new(config: BucketConfig) -> StorageResult<Self> {
        Self::build(BucketBase::detached(), config)
    }

    pub(crate) fn from_config(
        name: &str,
        config: BucketConfig,
        storage: Weak<FileSystemStorage>,
    ) -> StorageResult<Self> {
        Self::build(BucketBase::new(name, storage), config)
    }

    fn build(base: BucketBase<FileSystemStorage>, config: BucketConfig) -> StorageResult<Self> {
        if let Some(key) = config.extra.keys().next() {
            return Err(StorageError::InvalidArgument(format!(
                "Unknown option '{}' for filesystem bucket '{}'",
                key,
                base.name()
            )));
        }

        let template = SubDirTemplate::new(config.file_sub_dir_template.unwrap_or_default());
        let base_sub_path = config.base_sub_path.filter(|p| !p.is_empty());

        Ok(Self {
            inner: TemplatedBucket::new(base, template),
            base_sub_path,
        })
    }

    pub(crate) fn attach(&mut self, name: &str, storage: Weak<FileSystemStorage>) {
        self.inner.attach(name, storage);
    }

    pub fn storage(&self) -> StorageResult<Arc<FileSystemStorage>> {
        self.inner.storage()
    }

    pub fn file_sub_dir_template(&self) -> &SubDirTemplate {
        self.inner.file_sub_dir_template()
    }

    pub fn file_sub_dir(&self, file_name: &str) -> StorageResult<String> {
        self.inner.file_sub_dir(file_name)
    }

    pub fn file_name_with_sub_dir(&self, file_name: &str) -> StorageResult<String> {
        self.inner.file_name_with_sub_dir(file_name)
    }

    pub async fn clear_internal_cache(&self) {
        self.inner.clear_internal_cache().await;
    }

    /// Sub path below the storage root; the bucket name unless configured.
    pub fn base_sub_path(&self) -> &str {
        self.base_sub_path
            .as_deref()
            .unwrap_or_else(|| self.inner.name())
    }

    /// Directory holding the bucket: storage root joined with the base sub path.
    pub fn full_base_path(&self) -> StorageResult<PathBuf> {
        let storage = self.storage()?;
        let sub_path = self.base_sub_path().trim_matches('/');
        Ok(storage.base_path().join(sub_path))
    }

    /// Full filesystem path of `file_name`. Nothing is created.
    pub fn full_file_name(&self, file_name: &str) -> StorageResult<PathBuf> {
        validate_file_name(file_name)?;
        Ok(self
            .full_base_path()?
            .join(self.file_name_with_sub_dir(file_name)?))
    }

    /// Bucket base path, created on first use and cached until destroy.
    async fn resolve_full_base_path(&self) -> StorageResult<PathBuf> {
        let mut cache = self.inner.cache().lock().await;
        if let Some(path) = &cache.resolved_base_path {
            return Ok(path.clone());
        }

        let path = self.full_base_path()?;
        self.resolve_path(&path).await?;
        cache.resolved_base_path = Some(path.clone());
        Ok(path)
    }

    /// Full path of `file_name` with its containing directory created.
    async fn resolve_full_file_name(&self, file_name: &str) -> StorageResult<PathBuf> {
        validate_file_name(file_name)?;
        let full_file_name = self
            .resolve_full_base_path()
            .await?
            .join(self.file_name_with_sub_dir(file_name)?);
        if let Some(parent) = full_file_name.parent() {
            self.resolve_path(parent).await?;
        }
        Ok(full_file_name)
    }

    /// Make sure `path` exists as a writable directory, creating it with the
    /// storage's permission mode if needed.
    async fn resolve_path(&self, path: &Path) -> StorageResult<()> {
        let permission = self.storage()?.file_permission();

        if !fs::try_exists(path).await.unwrap_or(false) {
            tracing::debug!(bucket = %self.name(), path = %path.display(), "Creating file path");
            create_dir_all_with_permission(path, permission).await?;
        }

        let metadata = fs::metadata(path).await.map_err(|e| {
            StorageError::PathUnwritable(format!("Unable to inspect path {}: {}", path.display(), e))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::PathUnwritable(format!(
                "Path {} is not a directory",
                path.display()
            )));
        }
        if metadata.permissions().readonly() {
            return Err(StorageError::PathUnwritable(format!(
                "Path {} should be writable",
                path.display()
            )));
        }
        Ok(())
    }

    /// Full path of a file of this bucket or of another bucket of the same
    /// storage; the other bucket resolves its own layout.
    async fn full_file_name_by_reference(&self, file: &FileRef) -> StorageResult<PathBuf> {
        match file {
            FileRef::Own(file_name) => self.full_file_name(file_name),
            FileRef::InBucket { bucket, file } => {
                let storage = self.storage()?;
                storage.bucket(bucket).await?.full_file_name(file)
            }
        }
    }
}

#[async_trait]
impl Bucket for FileSystemBucket {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn create(&self) -> StorageResult<bool> {
        let path = self.resolve_full_base_path().await?;
        tracing::debug!(bucket = %self.name(), path = %path.display(), "Bucket created");
        Ok(true)
    }

    async fn destroy(&self) -> StorageResult<bool> {
        let path = self.full_base_path()?;
        let result = fs::remove_dir_all(&path).await;
        self.clear_internal_cache().await;

        match result {
            Ok(()) => {
                tracing::info!(
                    bucket = %self.name(),
                    path = %path.display(),
                    "Bucket has been destroyed"
                );
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(
                    bucket = %self.name(),
                    path = %path.display(),
                    "Bucket destroy skipped: base path does not exist"
                );
                Ok(true)
            }
            Err(e) => {
                tracing::error!(
                    bucket = %self.name(),
                    path = %path.display(),
                    error = %e,
                    "Unable to destroy bucket"
                );
                Ok(false)
            }
        }
    }

    async fn exists(&self) -> StorageResult<bool> {
        let path = self.full_base_path()?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn save_file_content(&self, file_name: &str, content: &[u8]) -> StorageResult<bool> {
        let path = self.resolve_full_file_name(file_name).await?;
        let permission = self.storage()?.file_permission();
        let start = Instant::now();

        // written next to the target and renamed, so readers never see a partial file
        let temp_path = temp_sibling(&path);
        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(content).await?;
            file.sync_all().await?;
            drop(file);
            set_permission(&temp_path, permission).await?;
            fs::rename(&temp_path, &path).await
        }
        .await;

        match written {
            Ok(()) => {
                tracing::info!(
                    bucket = %self.name(),
                    path = %path.display(),
                    size_bytes = content.len(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "File has been saved"
                );
                Ok(true)
            }
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                tracing::error!(
                    bucket = %self.name(),
                    path = %path.display(),
                    error = %e,
                    "Unable to save file"
                );
                Ok(false)
            }
        }
    }

    async fn get_file_content(&self, file_name: &str) -> StorageResult<Vec<u8>> {
        let path = self.full_file_name(file_name)?;
        let start = Instant::now();

        let data = fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(format!(
                "File '{}' does not exist in bucket '{}'",
                file_name,
                self.name()
            )),
            _ => StorageError::IoError(e),
        })?;

        tracing::info!(
            bucket = %self.name(),
            path = %path.display(),
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "File content has been returned"
        );

        Ok(data)
    }

    async fn delete_file(&self, file_name: &str) -> StorageResult<bool> {
        let path = self.full_file_name(file_name)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(bucket = %self.name(), path = %path.display(), "File has been deleted");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(
                    bucket = %self.name(),
                    path = %path.display(),
                    "File delete skipped: file does not exist"
                );
                Ok(true)
            }
            Err(e) => {
                tracing::error!(
                    bucket = %self.name(),
                    path = %path.display(),
                    error = %e,
                    "Unable to delete file"
                );
                Ok(false)
            }
        }
    }

    async fn file_exists(&self, file_name: &str) -> StorageResult<bool> {
        let path = self.full_file_name(file_name)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn copy_file_in(&self, src_path: &Path, file_name: &str) -> StorageResult<bool> {
        let path = self.resolve_full_file_name(file_name).await?;
        let copied = copy_with_permission(src_path, &path, self.storage()?.file_permission()).await;
        Ok(self.log_copy(src_path, &path, copied))
    }

    async fn copy_file_out(&self, file_name: &str, dest_path: &Path) -> StorageResult<bool> {
        let path = self.full_file_name(file_name)?;
        let copied = fs::copy(&path, dest_path).await.map(|_| ());
        Ok(self.log_copy(&path, dest_path, copied))
    }

    async fn copy_file_internal(&self, src: FileRef, dest: FileRef) -> StorageResult<bool> {
        let src_path = self.full_file_name_by_reference(&src).await?;
        let dest_path = self.full_file_name_by_reference(&dest).await?;
        if is_same_file(&src_path, &dest_path).await {
            tracing::error!(
                bucket = %self.name(),
                from_path = %src_path.display(),
                to_path = %dest_path.display(),
                "Unable to copy file onto itself"
            );
            return Ok(false);
        }
        if let Some(parent) = dest_path.parent() {
            self.resolve_path(parent).await?;
        }

        let copied =
            copy_with_permission(&src_path, &dest_path, self.storage()?.file_permission()).await;
        Ok(self.log_copy(&src_path, &dest_path, copied))
    }

    async fn move_file_internal(&self, src: FileRef, dest: FileRef) -> StorageResult<bool> {
        if !self.copy_file_internal(src.clone(), dest).await? {
            return Ok(false);
        }

        let src_path = self.full_file_name_by_reference(&src).await?;
        match fs::remove_file(&src_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => {
                tracing::error!(
                    bucket = %self.name(),
                    path = %src_path.display(),
                    error = %e,
                    "Unable to delete source file after copy"
                );
                Ok(false)
            }
        }
    }

    fn get_file_url(&self, file_name: &str) -> StorageResult<String> {
        let storage = self.storage()?;
        let mut url = format!(
            "{}/{}",
            storage.base_url().trim_end_matches('/'),
            self.base_sub_path().trim_matches('/')
        );
        let sub_dir = self.file_sub_dir(file_name)?;
        if !sub_dir.is_empty() {
            url.push('/');
            url.push_str(&sub_dir);
        }
        url.push('/');
        url.push_str(file_name);
        Ok(url)
    }
}

impl FileSystemBucket {
    fn log_copy(&self, from: &Path, to: &Path, result: std::io::Result<()>) -> bool {
        match result {
            Ok(()) => {
                tracing::info!(
                    bucket = %self.name(),
                    from_path = %from.display(),
                    to_path = %to.display(),
                    "File has been copied"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    bucket = %self.name(),
                    from_path = %from.display(),
                    to_path = %to.display(),
                    error = %e,
                    "Unable to copy file"
                );
                false
            }
        }
    }
}

/// Reject names that would escape the bucket directory.
fn validate_file_name(file_name: &str) -> StorageResult<()> {
    if file_name.is_empty() {
        return Err(StorageError::InvalidArgument(
            "File name must not be empty".to_string(),
        ));
    }
    let escapes = Path::new(file_name)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(StorageError::InvalidArgument(format!(
            "File name '{}' must stay inside the bucket",
            file_name
        )));
    }
    Ok(())
}

/// Whether both paths name the same file, through symlinks and hard links too.
async fn is_same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if let (Ok(a), Ok(b)) = (fs::metadata(a).await, fs::metadata(b).await) {
            return a.dev() == b.dev() && a.ino() == b.ino();
        }
    }

    match (fs::canonicalize(a).await, fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()))
}

async fn copy_with_permission(from: &Path, to: &Path, permission: u32) -> std::io::Result<()> {
    fs::copy(from, to).await?;
    set_permission(to, permission).await
}

/// Create `path` and its missing ancestors, applying `permission` to each
/// directory created. The mode is set explicitly so the umask does not apply.
async fn create_dir_all_with_permission(path: &Path, permission: u32) -> StorageResult<()> {
    let mut missing = Vec::new();
    let mut current = Some(path);
    while let Some(dir) = current {
        if dir.as_os_str().is_empty() {
            break;
        }
        if let Ok(metadata) = fs::metadata(dir).await {
            if !metadata.is_dir() {
                return Err(StorageError::AlreadyExists(format!(
                    "Unable to create path {}: {} exists and is not a directory",
                    path.display(),
                    dir.display()
                )));
            }
            break;
        }
        missing.push(dir.to_path_buf());
        current = dir.parent();
    }

    for dir in missing.iter().rev() {
        let created = match fs::create_dir(dir).await {
            Ok(()) => set_permission(dir, permission).await,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e),
        };
        created.map_err(|e| {
            StorageError::PathUnwritable(format!(
                "Unable to create path {}: {}",
                dir.display(),
                e
            ))
        })?;
    }
    Ok(())
}

#[cfg(unix)]
async fn set_permission(path: &Path, permission: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(permission)).await
}

#[cfg(not(unix))]
async fn set_permission(_path: &Path, _permission: u32) -> std::io::Result<()> {
    Ok(())
}
