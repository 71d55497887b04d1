use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{Extension, Json};
use shared::{
    domain::PageId,
    error::ApiError,
    protocol::{PagePayload, PageRequest},
};

use super::{ApiFailure, Reply};
use crate::{app_state::AppState, auth::AuthUser};

const NOT_FOUND: &str = "Page not found";

fn failed(action: &'static str) -> impl FnOnce(ApiError) -> ApiFailure {
    move |error| ApiFailure::new(error, NOT_FOUND, action)
}

pub(crate) async fn index(
    State(state): State<Arc<AppState>>,
) -> Result<Reply<Vec<PagePayload>>, ApiFailure> {
    let pages = server_api::list_pages(&state.api)
        .await
        .map_err(failed("Failed to fetch pages"))?;
    Ok(Reply::list("Pages fetched successfully", pages))
}

pub(crate) async fn store(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(input): Json<PageRequest>,
) -> Result<Reply<PagePayload>, ApiFailure> {
    let page = server_api::create_page(&state.api, user.user_id, input)
        .await
        .map_err(failed("Failed to create page"))?;
    Ok(Reply::created("Page created successfully", page))
}

pub(crate) async fn show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Reply<PagePayload>, ApiFailure> {
    let page = server_api::get_page(&state.api, PageId(id))
        .await
        .map_err(failed("Failed to retrieve page"))?;
    Ok(Reply::ok("Page retrieved successfully", page))
}

pub(crate) async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(input): Json<PageRequest>,
) -> Result<Reply<PagePayload>, ApiFailure> {
    let page = server_api::update_page(&state.api, PageId(id), input)
        .await
        .map_err(failed("Failed to update page"))?;
    Ok(Reply::ok("Page updated successfully", page))
}

pub(crate) async fn destroy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Reply<()>, ApiFailure> {
    server_api::delete_page(&state.api, PageId(id))
        .await
        .map_err(failed("Failed to delete page"))?;
    Ok(Reply::done("Page deleted successfully"))
}
