use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::Extension;
use server_api::Upload;
use shared::{
    domain::TeamMemberId,
    error::{ApiError, Violations},
    protocol::{TeamMemberPayload, TeamMemberRequest},
};

use super::{ApiFailure, Form, Reply};
use crate::{app_state::AppState, auth::AuthUser};

const NOT_FOUND: &str = "Team member not found";

fn failed(action: &'static str) -> impl FnOnce(ApiError) -> ApiFailure {
    move |error| ApiFailure::new(error, NOT_FOUND, action)
}

pub(crate) async fn index(
    State(state): State<Arc<AppState>>,
) -> Result<Reply<Vec<TeamMemberPayload>>, ApiFailure> {
    let members = server_api::list_team_members(&state.api)
        .await
        .map_err(failed("Failed to fetch team members"))?;
    Ok(Reply::list("Team members fetched successfully", members))
}

pub(crate) async fn store(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<Reply<TeamMemberPayload>, ApiFailure> {
    let (input, picture) = read_member(multipart)
        .await
        .map_err(failed("Failed to create team member"))?;
    let member = server_api::create_team_member(&state.api, user.user_id, input, picture)
        .await
        .map_err(failed("Failed to create team member"))?;
    Ok(Reply::created("Team member created successfully", member))
}

pub(crate) async fn show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Reply<TeamMemberPayload>, ApiFailure> {
    let member = server_api::get_team_member(&state.api, TeamMemberId(id))
        .await
        .map_err(failed("Failed to retrieve team member"))?;
    Ok(Reply::ok("Team member retrieved successfully", member))
}

pub(crate) async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Reply<TeamMemberPayload>, ApiFailure> {
    let (input, picture) = read_member(multipart)
        .await
        .map_err(failed("Failed to update team member"))?;
    let member = server_api::update_team_member(&state.api, TeamMemberId(id), input, picture)
        .await
        .map_err(failed("Failed to update team member"))?;
    Ok(Reply::ok("Team member updated successfully", member))
}

pub(crate) async fn destroy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Reply<()>, ApiFailure> {
    server_api::delete_team_member(&state.api, TeamMemberId(id))
        .await
        .map_err(failed("Failed to delete team member"))?;
    Ok(Reply::done("Team member deleted successfully"))
}

async fn read_member(
    multipart: Multipart,
) -> Result<(TeamMemberRequest, Option<Upload>), ApiError> {
    let mut form = Form::read(multipart).await?;
    let mut violations = Violations::new();

    let order = match form.text("order").filter(|raw| !raw.trim().is_empty()) {
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(order) => Some(order),
            Err(_) => {
                violations.add("order", "The order must be an integer.");
                None
            }
        },
        None => None,
    };
    let is_active = match form.text("is_active").filter(|raw| !raw.trim().is_empty()) {
        Some(raw) => {
            let parsed = parse_flag(&raw);
            if parsed.is_none() {
                violations.add("is_active", "The is active field must be true or false.");
            }
            parsed
        }
        None => None,
    };
    violations.into_result()?;

    let input = TeamMemberRequest {
        name: form.text("name"),
        role: form.text("role"),
        bio: form.text("bio"),
        email: form.text("email"),
        order,
        is_active,
    };
    Ok((input, form.take_file("profile_picture")))
}

/// Accepts the usual form encodings of a checkbox.
fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
