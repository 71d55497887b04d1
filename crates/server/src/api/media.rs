use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::Extension;
use serde::Deserialize;
use shared::{domain::MediaId, error::ApiError, protocol::MediaPayload};

use super::{ApiFailure, Form, Reply};
use crate::{app_state::AppState, auth::AuthUser};

const NOT_FOUND: &str = "Media not found";

fn failed(action: &'static str) -> impl FnOnce(ApiError) -> ApiFailure {
    move |error| ApiFailure::new(error, NOT_FOUND, action)
}

#[derive(Debug, Deserialize)]
pub(crate) struct MediaQuery {
    #[serde(rename = "type")]
    media_type: Option<String>,
}

pub(crate) async fn index(
    State(state): State<Arc<AppState>>,
    Query(q): Query<MediaQuery>,
) -> Result<Reply<Vec<MediaPayload>>, ApiFailure> {
    let media = server_api::list_media(&state.api, q.media_type.as_deref())
        .await
        .map_err(failed("Failed to fetch media"))?;
    Ok(Reply::list("Media fetched successfully", media))
}

pub(crate) async fn store(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<Reply<MediaPayload>, ApiFailure> {
    let mut form = Form::read(multipart)
        .await
        .map_err(failed("Failed to upload media"))?;
    let name = form.text("name");
    let file = form.take_file("file");
    let media = server_api::create_media(&state.api, user.user_id, name.as_deref(), file)
        .await
        .map_err(failed("Failed to upload media"))?;
    Ok(Reply::created("Media uploaded successfully", media))
}

pub(crate) async fn show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Reply<MediaPayload>, ApiFailure> {
    let media = server_api::get_media(&state.api, MediaId(id))
        .await
        .map_err(failed("Failed to retrieve media"))?;
    Ok(Reply::ok("Media retrieved successfully", media))
}

pub(crate) async fn destroy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Reply<()>, ApiFailure> {
    server_api::delete_media(&state.api, MediaId(id))
        .await
        .map_err(failed("Failed to delete media"))?;
    Ok(Reply::done("Media deleted successfully"))
}
