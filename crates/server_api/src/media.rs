use shared::{
    domain::{MediaId, MediaType, UserId},
    error::{ApiError, Violations},
    protocol::MediaPayload,
};
use storage::{FileStore, NewMedia, StoredMedia, PUBLIC_DISK};
use tracing::info;

use crate::{
    internal, persistence,
    upload::{self, FileDeletePolicy, FileNaming, Placement, Upload, MEDIA_RULES},
    ApiContext,
};

const MAX_NAME_CHARS: usize = 255;

pub async fn list_media(
    ctx: &ApiContext,
    media_type: Option<&str>,
) -> Result<Vec<MediaPayload>, ApiError> {
    let filter = match media_type.map(str::trim).filter(|raw| !raw.is_empty()) {
        // No stored media can carry a type outside the enum.
        Some(raw) => match MediaType::parse(raw) {
            Some(media_type) => Some(media_type),
            None => return Ok(Vec::new()),
        },
        None => None,
    };
    let media = ctx.storage.list_media(filter).await.map_err(internal)?;
    media
        .into_iter()
        .map(|media| media_payload(ctx.files.as_ref(), media))
        .collect()
}

pub async fn get_media(ctx: &ApiContext, media_id: MediaId) -> Result<MediaPayload, ApiError> {
    ctx.media_cache
        .get_or_try_insert_with(media_id, || async {
            let media = ctx
                .storage
                .load_media(media_id)
                .await
                .map_err(internal)?
                .ok_or_else(|| not_found(media_id))?;
            media_payload(ctx.files.as_ref(), media)
        })
        .await
}

pub async fn create_media(
    ctx: &ApiContext,
    uploader: UserId,
    name: Option<&str>,
    file: Option<Upload>,
) -> Result<MediaPayload, ApiError> {
    let mut violations = Violations::new();
    let name = name.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        violations.add("name", "The name field is required.");
    } else if name.chars().count() > MAX_NAME_CHARS {
        violations.add("name", "The name must not be greater than 255 characters.");
    }
    match &file {
        Some(file) => upload::check_upload(file, &MEDIA_RULES, &mut violations),
        None => violations.add("file", "The file field is required."),
    }
    violations.into_result()?;
    let Some(file) = file else {
        return Err(ApiError::field("file", "The file field is required."));
    };

    let media_type = MediaType::from_mime(&file.mime_type());
    let placement = Placement::new(
        PUBLIC_DISK,
        format!("media/{}s", media_type.as_str()),
        FileNaming::Timestamped,
    );

    let media = upload::handle_file_create(
        ctx.files.as_ref(),
        &placement,
        &MEDIA_RULES,
        &file,
        |stored| async move {
            ctx.storage
                .insert_media(&NewMedia {
                    name: name.to_string(),
                    file_name: stored.file_name,
                    mime_type: stored.mime_type,
                    media_type,
                    path: stored.path,
                    disk: stored.disk,
                    size: stored.size,
                    uploaded_by: uploader,
                })
                .await
                .map_err(persistence)
        },
    )
    .await?;

    info!(media_id = %media.media_id, path = %media.path, "media uploaded");
    media_payload(ctx.files.as_ref(), media)
}

pub async fn delete_media(ctx: &ApiContext, media_id: MediaId) -> Result<(), ApiError> {
    let media = ctx
        .storage
        .load_media(media_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(media_id))?;

    upload::handle_file_delete(
        ctx.files.as_ref(),
        &media.disk,
        Some(&media.path),
        FileDeletePolicy::Required,
        || async {
            let deleted = ctx
                .storage
                .delete_media(media_id)
                .await
                .map_err(persistence)?;
            if deleted {
                Ok(())
            } else {
                Err(not_found(media_id))
            }
        },
    )
    .await?;

    ctx.media_cache.invalidate(&media_id).await;
    info!(%media_id, path = %media.path, "media deleted");
    Ok(())
}

pub(crate) fn media_payload(
    files: &dyn FileStore,
    media: StoredMedia,
) -> Result<MediaPayload, ApiError> {
    let url = files.url(&media.disk, &media.path).map_err(internal)?;
    Ok(MediaPayload {
        id: media.media_id,
        name: media.name,
        file_name: media.file_name,
        mime_type: media.mime_type,
        media_type: media.media_type,
        path: media.path,
        disk: media.disk,
        size: media.size,
        url,
        uploaded_by: media.uploaded_by,
        created_at: media.created_at,
        updated_at: media.updated_at,
    })
}

fn not_found(media_id: MediaId) -> ApiError {
    ApiError::not_found(format!("Media with ID {media_id} not found"))
}

#[cfg(test)]
#[path = "tests/media_tests.rs"]
mod tests;
