// src/platform/storage.rs
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use anyhow::{bail, Context, Result};
use tokio::io::AsyncRead;
use tracing::{debug, info};

use crate::engine::{ErrorAggregator, Task};
use crate::error::{FlowError, FlowResult};

pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Remote object storage addressed by `/`-separated keys.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the file at `local` under `key`.
    async fn put(&self, local: &Path, key: &str) -> Result<()>;

    /// Open the object stored under `key` for reading.
    async fn get(&self, key: &str) -> Result<ObjectReader>;

    /// Keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Joins a key prefix and a name the way object keys are written.
pub fn join_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let name = name.trim_start_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Object store kept in a local directory; keys map to relative paths.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));
        if relative.as_os_str().is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("invalid object key: {}", key);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait::async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, local: &Path, key: &str) -> Result<()> {
        let target = self.object_path(key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        tokio::fs::copy(local, &target)
            .await
            .with_context(|| format!("Failed to copy {} to {}", local.display(), target.display()))?;
        debug!("Stored {} as {}", local.display(), key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<ObjectReader> {
        let path = self.object_path(key)?;
        let file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        Ok(Box::new(file))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = prefix.trim_start_matches('/');
        let mut keys = Vec::new();
        if !tokio::fs::try_exists(&self.root).await? {
            return Ok(keys);
        }

        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .with_context(|| format!("Failed to read {}", dir.display()))?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

/// Uploads every regular file of a directory under a key prefix.
///
/// One upload runs per file, all at once; every failed upload is reported
/// in the resulting aggregate error.
pub struct BulkUploadTask {
    store: Arc<dyn ObjectStore>,
    src_dir: PathBuf,
    dst_prefix: String,
}

impl BulkUploadTask {
    pub fn new(store: Arc<dyn ObjectStore>, src_dir: impl Into<PathBuf>, dst_prefix: impl Into<String>) -> Self {
        Self {
            store,
            src_dir: src_dir.into(),
            dst_prefix: dst_prefix.into(),
        }
    }

    async fn files(&self) -> FlowResult<Vec<PathBuf>> {
        let io_error = |source: std::io::Error| FlowError::Io {
            path: self.src_dir.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.src_dir).await.map_err(io_error)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            if entry.file_type().await.map_err(io_error)?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait::async_trait]
impl Task for BulkUploadTask {
    async fn execute(&self) -> FlowResult<()> {
        let files = self.files().await?;
        info!(
            "Uploading {} files from {} to {}",
            files.len(),
            self.src_dir.display(),
            self.dst_prefix
        );

        let mut aggregator = ErrorAggregator::new();
        for path in files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let key = join_key(&self.dst_prefix, &name);
            let store = Arc::clone(&self.store);
            aggregator.spawn(key.clone(), async move {
                let result = store.put(&path, &key).await;
                result.map_err(|source| FlowError::Storage { key, source })
            });
        }

        aggregator.finish().await.map_err(FlowError::from)
    }

    fn kind(&self) -> &str {
        "BulkUploadTask"
    }
}

/// Downloads every object under a key prefix into a local directory.
pub struct BulkDownloadTask {
    store: Arc<dyn ObjectStore>,
    src_prefix: String,
    dst_dir: PathBuf,
}

impl BulkDownloadTask {
    pub fn new(store: Arc<dyn ObjectStore>, src_prefix: impl Into<String>, dst_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            src_prefix: src_prefix.into(),
            dst_dir: dst_dir.into(),
        }
    }

    /// Local destination for `key`, relative to the download directory.
    ///
    /// The prefix is only stripped at a `/` boundary, so `reports2/x` listed
    /// under `reports` keeps its full key.
    fn destination(&self, key: &str) -> PathBuf {
        let prefix = self.src_prefix.trim_matches('/');
        let relative = match key.strip_prefix(prefix) {
            Some(rest) if prefix.is_empty() || rest.is_empty() || rest.starts_with('/') => rest,
            _ => key,
        }
        .trim_start_matches('/');
        let relative = if relative.is_empty() {
            key.rsplit('/').next().unwrap_or(key)
        } else {
            relative
        };
        relative
            .split('/')
            .filter(|part| !part.is_empty() && *part != "." && *part != "..")
            .fold(self.dst_dir.clone(), |path, part| path.join(part))
    }
}

async fn download(store: &dyn ObjectStore, key: &str, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut reader = store.get(key).await?;
    let mut file = tokio::fs::File::create(target)
        .await
        .with_context(|| format!("Failed to create {}", target.display()))?;
    let bytes = tokio::io::copy(&mut reader, &mut file).await?;
    debug!("Downloaded {} ({} bytes) to {}", key, bytes, target.display());
    Ok(())
}

#[async_trait::async_trait]
impl Task for BulkDownloadTask {
    async fn execute(&self) -> FlowResult<()> {
        let keys = self
            .store
            .list(&self.src_prefix)
            .await
            .map_err(|source| FlowError::Storage {
                key: self.src_prefix.clone(),
                source,
            })?;
        info!(
            "Downloading {} objects from {} to {}",
            keys.len(),
            self.src_prefix,
            self.dst_dir.display()
        );

        let mut aggregator = ErrorAggregator::new();
        for key in keys {
            let target = self.destination(&key);
            let store = Arc::clone(&self.store);
            aggregator.spawn(key.clone(), async move {
                let result = download(store.as_ref(), &key, &target).await;
                result.map_err(|source| FlowError::Storage { key, source })
            });
        }

        aggregator.finish().await.map_err(FlowError::from)
    }

    fn kind(&self) -> &str {
        "BulkDownloadTask"
    }
}
