//! Coordinates file storage with the database rows that reference the files.
//!
//! Storage and database are independent systems, so each flow orders its
//! side effects and runs an explicit compensating delete when a later step
//! fails:
//!
//! * create: store the file, then write the row; a failed write deletes the
//!   stored file.
//! * replace: store the new file, then update the row, then delete the old
//!   file; a failed update deletes the new file and leaves the old one alone.
//! * delete: delete the file, then the row; whether a failed file delete
//!   blocks the row delete is chosen per resource with [`FileDeletePolicy`].
//!
//! Validation always runs before the first side effect.

use std::future::Future;

use chrono::Utc;
use shared::error::{ApiError, ErrorCode, Violations};
use storage::FileStore;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A file received from a client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub original_name: String,
    /// MIME type declared by the client, if any. Only logged.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(original_name: impl Into<String>, content_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            original_name: original_name.into(),
            content_type,
            bytes,
        }
    }

    /// Lowercased extension of the original file name.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.original_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// MIME type implied by the file name's extension. The declared type is
    /// never trusted for classification.
    pub fn mime_type(&self) -> String {
        mime_guess::from_path(&self.original_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

/// Size and type constraints for one kind of upload.
#[derive(Debug, Clone, Copy)]
pub struct UploadRules {
    /// Request field the upload arrived in, used to key validation errors.
    pub field: &'static str,
    pub max_bytes: usize,
    pub extensions: &'static [&'static str],
    pub images_only: bool,
}

pub const MEDIA_RULES: UploadRules = UploadRules {
    field: "file",
    max_bytes: 100 * 1024 * 1024,
    extensions: &["jpeg", "png", "jpg", "gif", "mp4", "pdf", "doc", "docx"],
    images_only: false,
};

pub const PROFILE_PICTURE_RULES: UploadRules = UploadRules {
    field: "profile_picture",
    max_bytes: 2 * 1024 * 1024,
    extensions: &["jpeg", "png", "jpg"],
    images_only: true,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileNaming {
    /// `<unix-seconds>_<uuid>.<ext>`
    Timestamped,
    /// `<uuid>.<ext>`
    Uuid,
}

/// Where a new file goes: disk, directory on that disk, and how it is named.
#[derive(Debug, Clone)]
pub struct Placement {
    pub disk: String,
    pub directory: String,
    pub naming: FileNaming,
}

impl Placement {
    pub fn new(disk: &str, directory: impl Into<String>, naming: FileNaming) -> Self {
        Self {
            disk: disk.to_string(),
            directory: directory.into(),
            naming,
        }
    }

    fn file_name(&self, extension: &str) -> String {
        let id = Uuid::new_v4().simple();
        match self.naming {
            FileNaming::Timestamped => format!("{}_{id}.{extension}", Utc::now().timestamp()),
            FileNaming::Uuid => format!("{id}.{extension}"),
        }
    }
}

/// A file that has been durably written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub disk: String,
    pub path: String,
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
}

/// Whether a failed file delete aborts the row delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDeletePolicy {
    /// The row is kept when its file cannot be removed.
    Required,
    /// The failure is logged and the row is removed anyway.
    BestEffort,
}

struct Accepted {
    extension: String,
    mime_type: String,
}

/// Records every rule `upload` breaks under `rules.field`.
pub fn check_upload(upload: &Upload, rules: &UploadRules, violations: &mut Violations) {
    let field = rules.field;
    if upload.bytes.is_empty() {
        violations.add(field, format!("The {field} must not be empty."));
    }
    if upload.bytes.len() > rules.max_bytes {
        violations.add(
            field,
            format!(
                "The {field} must not be greater than {} kilobytes.",
                rules.max_bytes / 1024
            ),
        );
    }
    let allowed = upload
        .extension()
        .is_some_and(|ext| rules.extensions.contains(&ext.as_str()));
    if !allowed {
        violations.add(
            field,
            format!(
                "The {field} must be a file of type: {}.",
                rules.extensions.join(", ")
            ),
        );
    }
    if rules.images_only && !upload.mime_type().starts_with("image/") {
        violations.add(field, format!("The {field} must be an image."));
    }
}

fn validate_upload(upload: &Upload, rules: &UploadRules) -> Result<Accepted, ApiError> {
    let mut violations = Violations::new();
    check_upload(upload, rules, &mut violations);
    violations.into_result()?;
    let mime_type = upload.mime_type();
    if let Some(declared) = upload.content_type.as_deref() {
        if !declared.trim().eq_ignore_ascii_case(&mime_type) {
            debug!(
                file = %upload.original_name,
                declared,
                detected = %mime_type,
                "declared content type ignored"
            );
        }
    }
    Ok(Accepted {
        extension: upload.extension().unwrap_or_default(),
        mime_type,
    })
}

async fn store(
    files: &dyn FileStore,
    placement: &Placement,
    accepted: Accepted,
    upload: &Upload,
) -> Result<StoredFile, ApiError> {
    let file_name = placement.file_name(&accepted.extension);
    let target = format!("{}/{file_name}", placement.directory.trim_end_matches('/'));
    let path = files
        .put(&placement.disk, &target, &upload.bytes)
        .await
        .map_err(|err| {
            ApiError::new(
                ErrorCode::Storage,
                format!("failed to store {}: {err:#}", upload.original_name),
            )
        })?;
    Ok(StoredFile {
        disk: placement.disk.clone(),
        path,
        file_name,
        mime_type: accepted.mime_type,
        size: upload.bytes.len() as u64,
    })
}

/// Compensating delete for a file whose row was never written.
async fn discard(files: &dyn FileStore, stored: &StoredFile) {
    match files.delete(&stored.disk, &stored.path).await {
        Ok(_) => info!(disk = %stored.disk, path = %stored.path, "removed file after failed write"),
        Err(err) => warn!(
            disk = %stored.disk,
            path = %stored.path,
            error = %format!("{err:#}"),
            "failed to remove file after failed write; file is orphaned"
        ),
    }
}

/// Stores `upload`, then runs `persist` with the stored file. If `persist`
/// fails the file is deleted again and the persist error is returned.
pub async fn handle_file_create<T, F, Fut>(
    files: &dyn FileStore,
    placement: &Placement,
    rules: &UploadRules,
    upload: &Upload,
    persist: F,
) -> Result<T, ApiError>
where
    F: FnOnce(StoredFile) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let accepted = validate_upload(upload, rules)?;
    let stored = store(files, placement, accepted, upload).await?;

    match persist(stored.clone()).await {
        Ok(value) => Ok(value),
        Err(err) => {
            discard(files, &stored).await;
            Err(err)
        }
    }
}

/// Stores `upload` and runs `persist` to point the row at it. Only after the
/// row update succeeds is `previous` deleted; a failed update deletes the new
/// file and leaves `previous` in place.
pub async fn handle_file_replace<T, F, Fut>(
    files: &dyn FileStore,
    placement: &Placement,
    rules: &UploadRules,
    upload: &Upload,
    previous: Option<&str>,
    persist: F,
) -> Result<T, ApiError>
where
    F: FnOnce(StoredFile) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let accepted = validate_upload(upload, rules)?;
    let stored = store(files, placement, accepted, upload).await?;

    let value = match persist(stored.clone()).await {
        Ok(value) => value,
        Err(err) => {
            discard(files, &stored).await;
            return Err(err);
        }
    };

    if let Some(previous) = previous.filter(|previous| *previous != stored.path) {
        // The row already points at the new file; a leftover old file is
        // logged rather than failing the request.
        if let Err(err) = remove_file(files, &placement.disk, previous).await {
            warn!(
                disk = %placement.disk,
                path = previous,
                error = %err.message,
                "failed to delete replaced file; file is orphaned"
            );
        }
    }
    Ok(value)
}

/// Deletes the file at `path` (if any) and then runs `remove_row`.
pub async fn handle_file_delete<T, F, Fut>(
    files: &dyn FileStore,
    disk: &str,
    path: Option<&str>,
    policy: FileDeletePolicy,
    remove_row: F,
) -> Result<T, ApiError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    if let Some(path) = path {
        if let Err(err) = remove_file(files, disk, path).await {
            match policy {
                FileDeletePolicy::Required => return Err(err),
                FileDeletePolicy::BestEffort => warn!(
                    disk,
                    path,
                    error = %err.message,
                    "failed to delete file; removing record anyway"
                ),
            }
        }
    }
    remove_row().await
}

async fn remove_file(files: &dyn FileStore, disk: &str, path: &str) -> Result<(), ApiError> {
    let storage_error = |err: anyhow::Error| {
        ApiError::new(
            ErrorCode::Storage,
            format!("failed to delete {path} from disk {disk}: {err:#}"),
        )
    };

    if !files.exists(disk, path).await.map_err(storage_error)? {
        debug!(disk, path, "file already absent");
        return Ok(());
    }
    if !files.delete(disk, path).await.map_err(storage_error)? {
        debug!(disk, path, "file vanished before delete");
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/upload_tests.rs"]
mod tests;
