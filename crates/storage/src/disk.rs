//! File storage service.
//!
//! Files live on named disks. A disk maps relative paths to a root directory
//! and a public base URL, so a stored path can be turned into a link.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::debug;
use url::Url;
use uuid::Uuid;

pub const PUBLIC_DISK: &str = "public";

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Writes `bytes` at `path` on `disk` and returns the stored path. The file
    /// is either fully written or absent.
    async fn put(&self, disk: &str, path: &str, bytes: &[u8]) -> Result<String>;

    async fn exists(&self, disk: &str, path: &str) -> Result<bool>;

    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, disk: &str, path: &str) -> Result<bool>;

    fn url(&self, disk: &str, path: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
struct LocalDisk {
    root: PathBuf,
    base_url: Url,
}

/// Disks backed by directories on the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct LocalDisks {
    disks: HashMap<String, LocalDisk>,
}

impl LocalDisks {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding only the `public` disk.
    pub fn public(root: impl Into<PathBuf>, base_url: &str) -> Result<Self> {
        Self::new().with_disk(PUBLIC_DISK, root, base_url)
    }

    pub fn with_disk(
        mut self,
        name: &str,
        root: impl Into<PathBuf>,
        base_url: &str,
    ) -> Result<Self> {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&base_url)
            .with_context(|| format!("invalid base url '{base_url}' for disk '{name}'"))?;
        self.disks.insert(
            name.to_string(),
            LocalDisk {
                root: root.into(),
                base_url,
            },
        );
        Ok(self)
    }

    fn resolve(&self, disk: &str, path: &str) -> Result<(&LocalDisk, PathBuf)> {
        let Some(local) = self.disks.get(disk) else {
            bail!("unknown disk '{disk}'");
        };
        validate_relative_path(path)?;
        Ok((local, local.root.join(path)))
    }
}

#[async_trait]
impl FileStore for LocalDisks {
    async fn put(&self, disk: &str, path: &str, bytes: &[u8]) -> Result<String> {
        let (_, target) = self.resolve(disk, path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
        }

        let partial = target.with_file_name(format!(
            ".{}.{}.part",
            target
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("upload"),
            Uuid::new_v4().simple()
        ));
        if let Err(err) = tokio::fs::write(&partial, bytes).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err).with_context(|| format!("failed to write '{}'", partial.display()));
        }
        if let Err(err) = tokio::fs::rename(&partial, &target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err)
                .with_context(|| format!("failed to move upload into '{}'", target.display()));
        }

        debug!(disk, path, size = bytes.len(), "stored file");
        Ok(path.to_string())
    }

    async fn exists(&self, disk: &str, path: &str) -> Result<bool> {
        let (_, target) = self.resolve(disk, path)?;
        tokio::fs::try_exists(&target)
            .await
            .with_context(|| format!("failed to stat '{}'", target.display()))
    }

    async fn delete(&self, disk: &str, path: &str) -> Result<bool> {
        let (_, target) = self.resolve(disk, path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => {
                debug!(disk, path, "deleted file");
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("failed to delete '{}'", target.display())),
        }
    }

    fn url(&self, disk: &str, path: &str) -> Result<String> {
        let (local, _) = self.resolve(disk, path)?;
        let url = local
            .base_url
            .join(path)
            .with_context(|| format!("failed to build url for '{path}' on disk '{disk}'"))?;
        Ok(url.to_string())
    }
}

fn validate_relative_path(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        bail!("storage path must not be empty");
    }
    if path.contains('\\') {
        bail!("storage path '{path}' must use forward slashes");
    }
    let relative = Path::new(path);
    if !relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        bail!("storage path '{path}' must be relative and must not traverse directories");
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/disk_tests.rs"]
mod tests;
