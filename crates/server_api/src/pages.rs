use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use shared::{
    domain::{MediaId, PageId, PageStatus, UserId, UserSummary},
    error::{ApiError, Violations},
    protocol::{MediaPayload, PagePayload, PageRequest},
};
use storage::{PageFields, StoredPage};
use tracing::{info, warn};

use crate::{internal, media::media_payload, persistence, slug::generate_unique_slug, ApiContext};

const MAX_TITLE_CHARS: usize = 255;
/// Inserts or updates that lose a slug race are retried this many times in total.
const SLUG_ATTEMPTS: u32 = 3;
const PUBLISHED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub async fn list_pages(ctx: &ApiContext) -> Result<Vec<PagePayload>, ApiError> {
    let pages = ctx.storage.list_pages().await.map_err(internal)?;
    let mut authors: HashMap<UserId, Option<UserSummary>> = HashMap::new();
    let mut payloads = Vec::with_capacity(pages.len());

    for page in pages {
        let author = match authors.get(&page.author_id) {
            Some(author) => author.clone(),
            None => {
                let author = ctx
                    .storage
                    .user_summary(page.author_id)
                    .await
                    .map_err(internal)?;
                authors.insert(page.author_id, author.clone());
                author
            }
        };
        let banner = banner_media(ctx, page.fields.banner_media_id).await?;
        payloads.push(page_payload(page, banner, author));
    }
    Ok(payloads)
}

pub async fn get_page(ctx: &ApiContext, page_id: PageId) -> Result<PagePayload, ApiError> {
    let page = load(ctx, page_id).await?;
    with_relations(ctx, page).await
}

pub async fn create_page(
    ctx: &ApiContext,
    author: UserId,
    input: PageRequest,
) -> Result<PagePayload, ApiError> {
    let mut violations = Violations::new();
    let title = check_title(input.title.as_deref(), true, &mut violations);
    let content = check_content(input.content.as_deref(), true, &mut violations);
    let status = check_status(input.status.as_deref(), true, &mut violations);
    let banner_media_id = check_banner(ctx, input.banner_media_id.flatten(), &mut violations).await?;
    let published_at = check_published_at(
        input.published_at.flatten().as_deref(),
        Some(Utc::now()),
        &mut violations,
    );
    violations.into_result()?;

    let mut fields = PageFields {
        title: title.unwrap_or_default(),
        slug: String::new(),
        content: content.unwrap_or_default(),
        banner_media_id,
        status: status.unwrap_or_default(),
        published_at,
    };

    let mut attempt = 1;
    let page = loop {
        fields.slug = generate_unique_slug(ctx.slugs.as_ref(), &fields.title, None).await?;
        match ctx.storage.insert_page(&fields, author).await {
            Ok(page) => break page,
            Err(err) if storage::is_unique_violation(&err) && attempt < SLUG_ATTEMPTS => {
                warn!(slug = %fields.slug, attempt, "slug claimed concurrently; regenerating");
                attempt += 1;
            }
            Err(err) => return Err(persistence(err)),
        }
    };

    info!(page_id = %page.page_id, slug = %page.fields.slug, "page created");
    with_relations(ctx, page).await
}

pub async fn update_page(
    ctx: &ApiContext,
    page_id: PageId,
    input: PageRequest,
) -> Result<PagePayload, ApiError> {
    let current = load(ctx, page_id).await?;

    let mut violations = Violations::new();
    let title = check_title(input.title.as_deref(), false, &mut violations);
    let content = check_content(input.content.as_deref(), false, &mut violations);
    let status = check_status(input.status.as_deref(), false, &mut violations);
    let banner_media_id = match input.banner_media_id {
        Some(requested) => Some(check_banner(ctx, requested, &mut violations).await?),
        None => None,
    };
    let published_at = input
        .published_at
        .map(|requested| check_published_at(requested.as_deref(), None, &mut violations));
    violations.into_result()?;

    let mut fields = current.fields;
    let retitled = title.as_ref().is_some_and(|title| *title != fields.title);
    if let Some(title) = title {
        fields.title = title;
    }
    if let Some(content) = content {
        fields.content = content;
    }
    if let Some(status) = status {
        fields.status = status;
    }
    if let Some(banner_media_id) = banner_media_id {
        fields.banner_media_id = banner_media_id;
    }
    if let Some(published_at) = published_at {
        fields.published_at = published_at;
    }

    let mut attempt = 1;
    loop {
        if retitled {
            fields.slug =
                generate_unique_slug(ctx.slugs.as_ref(), &fields.title, Some(page_id)).await?;
        }
        match ctx.storage.update_page(page_id, &fields).await {
            Ok(true) => break,
            Ok(false) => return Err(not_found(page_id)),
            Err(err) if retitled && storage::is_unique_violation(&err) && attempt < SLUG_ATTEMPTS => {
                warn!(%page_id, slug = %fields.slug, attempt, "slug claimed concurrently; regenerating");
                attempt += 1;
            }
            Err(err) => return Err(persistence(err)),
        }
    }

    info!(%page_id, slug = %fields.slug, "page updated");
    let page = load(ctx, page_id).await?;
    with_relations(ctx, page).await
}

pub async fn delete_page(ctx: &ApiContext, page_id: PageId) -> Result<(), ApiError> {
    let deleted = ctx.storage.delete_page(page_id).await.map_err(persistence)?;
    if !deleted {
        return Err(not_found(page_id));
    }
    info!(%page_id, "page deleted");
    Ok(())
}

async fn load(ctx: &ApiContext, page_id: PageId) -> Result<StoredPage, ApiError> {
    ctx.storage
        .load_page(page_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(page_id))
}

async fn with_relations(ctx: &ApiContext, page: StoredPage) -> Result<PagePayload, ApiError> {
    let banner = banner_media(ctx, page.fields.banner_media_id).await?;
    let author = ctx
        .storage
        .user_summary(page.author_id)
        .await
        .map_err(internal)?;
    Ok(page_payload(page, banner, author))
}

async fn banner_media(
    ctx: &ApiContext,
    media_id: Option<MediaId>,
) -> Result<Option<MediaPayload>, ApiError> {
    let Some(media_id) = media_id else {
        return Ok(None);
    };
    match ctx.storage.load_media(media_id).await.map_err(internal)? {
        Some(media) => media_payload(ctx.files.as_ref(), media).map(Some),
        None => Ok(None),
    }
}

fn page_payload(
    page: StoredPage,
    banner_media: Option<MediaPayload>,
    author: Option<UserSummary>,
) -> PagePayload {
    let StoredPage {
        page_id,
        fields,
        author_id,
        created_at,
        updated_at,
    } = page;
    PagePayload {
        id: page_id,
        title: fields.title,
        slug: fields.slug,
        content: fields.content,
        banner_media_id: fields.banner_media_id,
        status: fields.status,
        published_at: fields.published_at,
        author_id,
        created_at,
        updated_at,
        banner_media,
        author,
    }
}

fn check_title(raw: Option<&str>, required: bool, violations: &mut Violations) -> Option<String> {
    match raw.map(str::trim).filter(|title| !title.is_empty()) {
        Some(title) if title.chars().count() > MAX_TITLE_CHARS => {
            violations.add("title", "The title must not be greater than 255 characters.");
            None
        }
        Some(title) => Some(title.to_string()),
        None => {
            if required || raw.is_some() {
                violations.add("title", "The title field is required.");
            }
            None
        }
    }
}

fn check_content(raw: Option<&str>, required: bool, violations: &mut Violations) -> Option<String> {
    match raw.filter(|content| !content.trim().is_empty()) {
        Some(content) => Some(content.to_string()),
        None => {
            if required || raw.is_some() {
                violations.add("content", "The content field is required.");
            }
            None
        }
    }
}

fn check_status(
    raw: Option<&str>,
    required: bool,
    violations: &mut Violations,
) -> Option<PageStatus> {
    let Some(trimmed) = raw.map(str::trim).filter(|status| !status.is_empty()) else {
        if required || raw.is_some() {
            violations.add("status", "The status field is required.");
        }
        return None;
    };
    let status = PageStatus::parse(trimmed);
    if status.is_none() {
        violations.add("status", "The selected status is invalid.");
    }
    status
}

async fn check_banner(
    ctx: &ApiContext,
    requested: Option<i64>,
    violations: &mut Violations,
) -> Result<Option<MediaId>, ApiError> {
    let Some(raw) = requested else {
        return Ok(None);
    };
    let media_id = MediaId(raw);
    if ctx.storage.media_exists(media_id).await.map_err(internal)? {
        Ok(Some(media_id))
    } else {
        violations.add("banner_media_id", "The selected banner media id is invalid.");
        Ok(None)
    }
}

/// Parses `YYYY-MM-DD HH:MM:SS` as UTC. With `not_before`, earlier times are
/// rejected.
fn check_published_at(
    raw: Option<&str>,
    not_before: Option<DateTime<Utc>>,
    violations: &mut Violations,
) -> Option<DateTime<Utc>> {
    let raw = raw.map(str::trim).filter(|raw| !raw.is_empty())?;
    let Ok(parsed) = NaiveDateTime::parse_from_str(raw, PUBLISHED_AT_FORMAT) else {
        violations.add(
            "published_at",
            "The published at does not match the format Y-m-d H:i:s.",
        );
        return None;
    };
    let published_at = parsed.and_utc();
    // Second precision on both sides, so "now" itself is accepted.
    if let Some(floor) = not_before {
        if published_at.timestamp() < floor.timestamp() {
            violations.add(
                "published_at",
                "The published at must be a date after or equal to now.",
            );
            return None;
        }
    }
    Some(published_at)
}

fn not_found(page_id: PageId) -> ApiError {
    ApiError::not_found(format!("Page with ID {page_id} not found"))
}

#[cfg(test)]
#[path = "tests/pages_tests.rs"]
mod tests;
