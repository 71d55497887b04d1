use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use shared::domain::UserId;
use storage::{FileStore, LocalDisks, Storage};
use tempfile::TempDir;

use crate::{ApiContext, Upload};

/// Local disks whose writes and deletes can be made to fail on demand.
pub(crate) struct FlakyFiles {
    inner: LocalDisks,
    pub(crate) fail_puts: AtomicBool,
    pub(crate) fail_deletes: AtomicBool,
}

impl FlakyFiles {
    pub(crate) fn new(inner: LocalDisks) -> Self {
        Self {
            inner,
            fail_puts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl FileStore for FlakyFiles {
    async fn put(&self, disk: &str, path: &str, bytes: &[u8]) -> Result<String> {
        if self.fail_puts.load(Ordering::SeqCst) {
            bail!("disk full");
        }
        self.inner.put(disk, path, bytes).await
    }

    async fn exists(&self, disk: &str, path: &str) -> Result<bool> {
        self.inner.exists(disk, path).await
    }

    async fn delete(&self, disk: &str, path: &str) -> Result<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            bail!("permission denied");
        }
        self.inner.delete(disk, path).await
    }

    fn url(&self, disk: &str, path: &str) -> Result<String> {
        self.inner.url(disk, path)
    }
}

pub(crate) struct Harness {
    pub(crate) ctx: ApiContext,
    pub(crate) files: Arc<FlakyFiles>,
    pub(crate) user: UserId,
    dir: TempDir,
}

impl Harness {
    pub(crate) async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let disks = LocalDisks::public(dir.path(), "http://localhost/storage").expect("disks");
        let files = Arc::new(FlakyFiles::new(disks));
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        let user = storage.create_user("editor").await.expect("user");
        let ctx = ApiContext::new(storage, files.clone(), Duration::from_secs(3600));
        Self {
            ctx,
            files,
            user,
            dir,
        }
    }

    pub(crate) fn root(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) async fn stored(&self, path: &str) -> bool {
        self.files
            .exists(storage::PUBLIC_DISK, path)
            .await
            .expect("exists")
    }

    pub(crate) fn fail_puts(&self, fail: bool) {
        self.files.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_deletes(&self, fail: bool) {
        self.files.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

pub(crate) fn png(name: &str) -> Upload {
    Upload::new(name, Some("image/png".to_string()), b"\x89PNG fake".to_vec())
}

pub(crate) fn pdf(name: &str) -> Upload {
    Upload::new(name, Some("application/pdf".to_string()), b"%PDF-1.4".to_vec())
}
