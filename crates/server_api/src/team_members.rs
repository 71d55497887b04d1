use shared::{
    domain::{TeamMemberId, UserId},
    error::{ApiError, Violations},
    protocol::{TeamMemberPayload, TeamMemberRequest},
};
use storage::{FileStore, StoredTeamMember, TeamMemberFields, PUBLIC_DISK};
use tracing::info;

use crate::{
    internal, persistence,
    upload::{self, FileDeletePolicy, FileNaming, Placement, Upload, PROFILE_PICTURE_RULES},
    ApiContext,
};

const MAX_TEXT_CHARS: usize = 255;
const PICTURE_DIRECTORY: &str = "team-members";

pub async fn list_team_members(ctx: &ApiContext) -> Result<Vec<TeamMemberPayload>, ApiError> {
    let members = ctx.storage.list_team_members().await.map_err(internal)?;
    members
        .into_iter()
        .map(|member| team_member_payload(ctx.files.as_ref(), member))
        .collect()
}

pub async fn get_team_member(
    ctx: &ApiContext,
    team_member_id: TeamMemberId,
) -> Result<TeamMemberPayload, ApiError> {
    ctx.team_cache
        .get_or_try_insert_with(team_member_id, || async {
            let member = load(ctx, team_member_id).await?;
            team_member_payload(ctx.files.as_ref(), member)
        })
        .await
}

pub async fn create_team_member(
    ctx: &ApiContext,
    creator: UserId,
    input: TeamMemberRequest,
    picture: Option<Upload>,
) -> Result<TeamMemberPayload, ApiError> {
    let mut violations = Violations::new();
    let name = check_text("name", input.name.as_deref(), true, &mut violations);
    let role = check_text("role", input.role.as_deref(), true, &mut violations);
    let email = check_email(ctx, input.email.as_deref(), true, None, &mut violations).await?;
    let sort_order = check_order(input.order, &mut violations);
    if let Some(picture) = &picture {
        upload::check_upload(picture, &PROFILE_PICTURE_RULES, &mut violations);
    }
    violations.into_result()?;

    let fields = TeamMemberFields {
        name: name.unwrap_or_default(),
        role: role.unwrap_or_default(),
        bio: normalize_bio(input.bio),
        profile_picture: None,
        email: email.unwrap_or_default(),
        sort_order: sort_order.unwrap_or(0),
        is_active: input.is_active.unwrap_or(true),
    };

    let member = match &picture {
        Some(picture) => {
            upload::handle_file_create(
                ctx.files.as_ref(),
                &picture_placement(),
                &PROFILE_PICTURE_RULES,
                picture,
                |stored| async move {
                    let fields = TeamMemberFields {
                        profile_picture: Some(stored.path),
                        ..fields
                    };
                    ctx.storage
                        .insert_team_member(&fields, creator)
                        .await
                        .map_err(persistence)
                },
            )
            .await?
        }
        None => ctx
            .storage
            .insert_team_member(&fields, creator)
            .await
            .map_err(persistence)?,
    };

    info!(
        team_member_id = %member.team_member_id,
        picture = member.fields.profile_picture.as_deref().unwrap_or("-"),
        "team member created"
    );
    team_member_payload(ctx.files.as_ref(), member)
}

pub async fn update_team_member(
    ctx: &ApiContext,
    team_member_id: TeamMemberId,
    input: TeamMemberRequest,
    picture: Option<Upload>,
) -> Result<TeamMemberPayload, ApiError> {
    let current = load(ctx, team_member_id).await?;

    let mut violations = Violations::new();
    let name = check_text("name", input.name.as_deref(), false, &mut violations);
    let role = check_text("role", input.role.as_deref(), false, &mut violations);
    let email = check_email(
        ctx,
        input.email.as_deref(),
        false,
        Some(team_member_id),
        &mut violations,
    )
    .await?;
    let sort_order = check_order(input.order, &mut violations);
    if let Some(picture) = &picture {
        upload::check_upload(picture, &PROFILE_PICTURE_RULES, &mut violations);
    }
    violations.into_result()?;

    let previous_picture = current.fields.profile_picture.clone();
    let mut fields = current.fields;
    if let Some(name) = name {
        fields.name = name;
    }
    if let Some(role) = role {
        fields.role = role;
    }
    if input.bio.is_some() {
        fields.bio = normalize_bio(input.bio);
    }
    if let Some(email) = email {
        fields.email = email;
    }
    if let Some(sort_order) = sort_order {
        fields.sort_order = sort_order;
    }
    if let Some(is_active) = input.is_active {
        fields.is_active = is_active;
    }

    let write = |fields: TeamMemberFields| async move {
        let updated = ctx
            .storage
            .update_team_member(team_member_id, &fields)
            .await
            .map_err(persistence)?;
        if updated {
            Ok(())
        } else {
            Err(not_found(team_member_id))
        }
    };

    match &picture {
        Some(picture) => {
            upload::handle_file_replace(
                ctx.files.as_ref(),
                &picture_placement(),
                &PROFILE_PICTURE_RULES,
                picture,
                previous_picture.as_deref(),
                |stored| {
                    write(TeamMemberFields {
                        profile_picture: Some(stored.path),
                        ..fields
                    })
                },
            )
            .await?
        }
        None => write(fields).await?,
    }

    ctx.team_cache.invalidate(&team_member_id).await;
    info!(%team_member_id, "team member updated");
    let member = load(ctx, team_member_id).await?;
    team_member_payload(ctx.files.as_ref(), member)
}

pub async fn delete_team_member(
    ctx: &ApiContext,
    team_member_id: TeamMemberId,
) -> Result<(), ApiError> {
    let member = load(ctx, team_member_id).await?;

    upload::handle_file_delete(
        ctx.files.as_ref(),
        PUBLIC_DISK,
        member.fields.profile_picture.as_deref(),
        FileDeletePolicy::BestEffort,
        || async {
            let deleted = ctx
                .storage
                .delete_team_member(team_member_id)
                .await
                .map_err(persistence)?;
            if deleted {
                Ok(())
            } else {
                Err(not_found(team_member_id))
            }
        },
    )
    .await?;

    ctx.team_cache.invalidate(&team_member_id).await;
    info!(%team_member_id, "team member deleted");
    Ok(())
}

fn picture_placement() -> Placement {
    Placement::new(PUBLIC_DISK, PICTURE_DIRECTORY, FileNaming::Uuid)
}

async fn load(
    ctx: &ApiContext,
    team_member_id: TeamMemberId,
) -> Result<StoredTeamMember, ApiError> {
    ctx.storage
        .load_team_member(team_member_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(team_member_id))
}

pub(crate) fn team_member_payload(
    files: &dyn FileStore,
    member: StoredTeamMember,
) -> Result<TeamMemberPayload, ApiError> {
    let StoredTeamMember {
        team_member_id,
        fields,
        created_by,
        created_at,
        updated_at,
    } = member;
    let profile_picture_url = fields
        .profile_picture
        .as_deref()
        .map(|path| files.url(PUBLIC_DISK, path))
        .transpose()
        .map_err(internal)?;
    Ok(TeamMemberPayload {
        id: team_member_id,
        name: fields.name,
        role: fields.role,
        bio: fields.bio,
        email: fields.email,
        profile_picture: fields.profile_picture,
        profile_picture_url,
        order: fields.sort_order,
        is_active: fields.is_active,
        created_by,
        created_at,
        updated_at,
    })
}

fn check_text(
    field: &str,
    raw: Option<&str>,
    required: bool,
    violations: &mut Violations,
) -> Option<String> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) if value.chars().count() > MAX_TEXT_CHARS => {
            violations.add(
                field,
                format!("The {field} must not be greater than 255 characters."),
            );
            None
        }
        Some(value) => Some(value.to_string()),
        None => {
            if required || raw.is_some() {
                violations.add(field, format!("The {field} field is required."));
            }
            None
        }
    }
}

async fn check_email(
    ctx: &ApiContext,
    raw: Option<&str>,
    required: bool,
    exclude: Option<TeamMemberId>,
    violations: &mut Violations,
) -> Result<Option<String>, ApiError> {
    let Some(email) = check_text("email", raw, required, violations) else {
        return Ok(None);
    };
    if !is_valid_email(&email) {
        violations.add("email", "The email must be a valid email address.");
        return Ok(None);
    }
    if ctx
        .storage
        .email_taken(&email, exclude)
        .await
        .map_err(internal)?
    {
        violations.add("email", "The email has already been taken.");
        return Ok(None);
    }
    Ok(Some(email))
}

fn check_order(order: Option<i64>, violations: &mut Violations) -> Option<i64> {
    match order {
        Some(order) if order < 0 => {
            violations.add("order", "The order must be at least 0.");
            None
        }
        other => other,
    }
}

fn normalize_bio(bio: Option<String>) -> Option<String> {
    bio.map(|bio| bio.trim().to_string())
        .filter(|bio| !bio.is_empty())
}

/// `local@domain.tld` with no whitespace and a dotted domain.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_alphanumeric() || c == '-')
        })
}

fn not_found(team_member_id: TeamMemberId) -> ApiError {
    ApiError::not_found(format!("Team member with ID {team_member_id} not found"))
}

#[cfg(test)]
#[path = "tests/team_members_tests.rs"]
mod tests;
