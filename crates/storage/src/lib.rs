use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{MediaId, MediaType, PageId, PageStatus, TeamMemberId, UserId, UserSummary};

pub mod disk;

pub use disk::{FileStore, LocalDisks, PUBLIC_DISK};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct NewMedia {
    pub name: String,
    pub file_name: String,
    pub mime_type: String,
    pub media_type: MediaType,
    pub path: String,
    pub disk: String,
    pub size: u64,
    pub uploaded_by: UserId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredMedia {
    pub media_id: MediaId,
    pub name: String,
    pub file_name: String,
    pub mime_type: String,
    pub media_type: MediaType,
    pub path: String,
    pub disk: String,
    pub size: u64,
    pub uploaded_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Writable columns of a page row.
#[derive(Debug, Clone, PartialEq)]
pub struct PageFields {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub banner_media_id: Option<MediaId>,
    pub status: PageStatus,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredPage {
    pub page_id: PageId,
    pub fields: PageFields,
    pub author_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Writable columns of a team member row.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamMemberFields {
    pub name: String,
    pub role: String,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
    pub email: String,
    pub sort_order: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredTeamMember {
    pub team_member_id: TeamMemberId,
    pub fields: TeamMemberFields,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const MEDIA_COLUMNS: &str =
    "id, name, file_name, mime_type, type, path, disk, size, uploaded_by, created_at, updated_at";
const PAGE_COLUMNS: &str = "id, title, slug, content, banner_media_id, status, published_at, author_id, created_at, updated_at";
const TEAM_MEMBER_COLUMNS: &str = "id, name, role, bio, profile_picture, email, sort_order, is_active, created_by, created_at, updated_at";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        // Every connection to an in-memory url opens its own empty database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_user(&self, username: &str) -> Result<UserId> {
        let rec = sqlx::query(
            "INSERT INTO users (username) VALUES (?)
             ON CONFLICT(username) DO UPDATE SET username=excluded.username
             RETURNING id",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(UserId(rec.get::<i64, _>(0)))
    }

    pub async fn user_summary(&self, user_id: UserId) -> Result<Option<UserSummary>> {
        let row = sqlx::query("SELECT id, username FROM users WHERE id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| UserSummary {
            id: UserId(r.get::<i64, _>(0)),
            username: r.get::<String, _>(1),
        }))
    }

    pub async fn insert_media(&self, media: &NewMedia) -> Result<StoredMedia> {
        let now = Utc::now();
        let rec = sqlx::query(
            "INSERT INTO media (name, file_name, mime_type, type, path, disk, size, uploaded_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&media.name)
        .bind(&media.file_name)
        .bind(&media.mime_type)
        .bind(media.media_type.as_str())
        .bind(&media.path)
        .bind(&media.disk)
        .bind(i64::try_from(media.size).context("media size exceeds i64")?)
        .bind(media.uploaded_by.0)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        let media_id = MediaId(rec.get::<i64, _>(0));
        self.load_media(media_id)
            .await?
            .with_context(|| format!("media {media_id} vanished after insert"))
    }

    pub async fn load_media(&self, media_id: MediaId) -> Result<Option<StoredMedia>> {
        let row = sqlx::query(&format!("SELECT {MEDIA_COLUMNS} FROM media WHERE id = ?"))
            .bind(media_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(media_from_row).transpose()
    }

    pub async fn media_exists(&self, media_id: MediaId) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM media WHERE id = ?")
            .bind(media_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Newest first, optionally restricted to one media type.
    pub async fn list_media(&self, media_type: Option<MediaType>) -> Result<Vec<StoredMedia>> {
        let rows = match media_type {
            Some(media_type) => {
                sqlx::query(&format!(
                    "SELECT {MEDIA_COLUMNS} FROM media WHERE type = ? ORDER BY created_at DESC, id DESC"
                ))
                .bind(media_type.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {MEDIA_COLUMNS} FROM media ORDER BY created_at DESC, id DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(media_from_row).collect()
    }

    pub async fn delete_media(&self, media_id: MediaId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM media WHERE id = ?")
            .bind(media_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn insert_page(&self, fields: &PageFields, author_id: UserId) -> Result<StoredPage> {
        let now = Utc::now();
        let rec = sqlx::query(
            "INSERT INTO pages (title, slug, content, banner_media_id, status, published_at, author_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&fields.title)
        .bind(&fields.slug)
        .bind(&fields.content)
        .bind(fields.banner_media_id.map(|id| id.0))
        .bind(fields.status.as_str())
        .bind(fields.published_at)
        .bind(author_id.0)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        let page_id = PageId(rec.get::<i64, _>(0));
        self.load_page(page_id)
            .await?
            .with_context(|| format!("page {page_id} vanished after insert"))
    }

    pub async fn load_page(&self, page_id: PageId) -> Result<Option<StoredPage>> {
        let row = sqlx::query(&format!("SELECT {PAGE_COLUMNS} FROM pages WHERE id = ?"))
            .bind(page_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(page_from_row).transpose()
    }

    pub async fn list_pages(&self) -> Result<Vec<StoredPage>> {
        let rows = sqlx::query(&format!(
            "SELECT {PAGE_COLUMNS} FROM pages ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(page_from_row).collect()
    }

    /// Returns `false` when the page no longer exists.
    pub async fn update_page(&self, page_id: PageId, fields: &PageFields) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE pages
             SET title = ?, slug = ?, content = ?, banner_media_id = ?, status = ?, published_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&fields.title)
        .bind(&fields.slug)
        .bind(&fields.content)
        .bind(fields.banner_media_id.map(|id| id.0))
        .bind(fields.status.as_str())
        .bind(fields.published_at)
        .bind(Utc::now())
        .bind(page_id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM pages WHERE id = ?")
            .bind(page_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether a page other than `exclude` already uses `slug`.
    pub async fn slug_taken(&self, slug: &str, exclude: Option<PageId>) -> Result<bool> {
        let found: Option<i64> = match exclude {
            Some(page_id) => {
                sqlx::query_scalar("SELECT id FROM pages WHERE slug = ? AND id != ? LIMIT 1")
                    .bind(slug)
                    .bind(page_id.0)
                    .fetch_optional(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT id FROM pages WHERE slug = ? LIMIT 1")
                    .bind(slug)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        Ok(found.is_some())
    }

    pub async fn insert_team_member(
        &self,
        fields: &TeamMemberFields,
        created_by: UserId,
    ) -> Result<StoredTeamMember> {
        let now = Utc::now();
        let rec = sqlx::query(
            "INSERT INTO team_members (name, role, bio, profile_picture, email, sort_order, is_active, created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&fields.name)
        .bind(&fields.role)
        .bind(&fields.bio)
        .bind(&fields.profile_picture)
        .bind(&fields.email)
        .bind(fields.sort_order)
        .bind(fields.is_active)
        .bind(created_by.0)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        let team_member_id = TeamMemberId(rec.get::<i64, _>(0));
        self.load_team_member(team_member_id)
            .await?
            .with_context(|| format!("team member {team_member_id} vanished after insert"))
    }

    pub async fn load_team_member(
        &self,
        team_member_id: TeamMemberId,
    ) -> Result<Option<StoredTeamMember>> {
        let row = sqlx::query(&format!(
            "SELECT {TEAM_MEMBER_COLUMNS} FROM team_members WHERE id = ?"
        ))
        .bind(team_member_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(team_member_from_row))
    }

    pub async fn list_team_members(&self) -> Result<Vec<StoredTeamMember>> {
        let rows = sqlx::query(&format!(
            "SELECT {TEAM_MEMBER_COLUMNS} FROM team_members ORDER BY sort_order ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(team_member_from_row).collect())
    }

    /// Returns `false` when the team member no longer exists.
    pub async fn update_team_member(
        &self,
        team_member_id: TeamMemberId,
        fields: &TeamMemberFields,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE team_members
             SET name = ?, role = ?, bio = ?, profile_picture = ?, email = ?, sort_order = ?, is_active = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&fields.name)
        .bind(&fields.role)
        .bind(&fields.bio)
        .bind(&fields.profile_picture)
        .bind(&fields.email)
        .bind(fields.sort_order)
        .bind(fields.is_active)
        .bind(Utc::now())
        .bind(team_member_id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_team_member(&self, team_member_id: TeamMemberId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM team_members WHERE id = ?")
            .bind(team_member_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether a team member other than `exclude` already uses `email`.
    pub async fn email_taken(&self, email: &str, exclude: Option<TeamMemberId>) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM team_members WHERE email = ? AND (? IS NULL OR id != ?) LIMIT 1",
        )
        .bind(email)
        .bind(exclude.map(|id| id.0))
        .bind(exclude.map(|id| id.0))
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }
}

/// True when `err` came from a UNIQUE index rejecting a write.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|err| err.as_database_error())
        .is_some_and(|db_err| db_err.is_unique_violation())
}

fn media_from_row(r: &SqliteRow) -> Result<StoredMedia> {
    let raw_type = r.get::<String, _>("type");
    let media_type = MediaType::parse(&raw_type)
        .with_context(|| format!("unknown media type '{raw_type}' in media row"))?;
    Ok(StoredMedia {
        media_id: MediaId(r.get::<i64, _>("id")),
        name: r.get::<String, _>("name"),
        file_name: r.get::<String, _>("file_name"),
        mime_type: r.get::<String, _>("mime_type"),
        media_type,
        path: r.get::<String, _>("path"),
        disk: r.get::<String, _>("disk"),
        size: u64::try_from(r.get::<i64, _>("size")).unwrap_or_default(),
        uploaded_by: UserId(r.get::<i64, _>("uploaded_by")),
        created_at: r.get::<DateTime<Utc>, _>("created_at"),
        updated_at: r.get::<DateTime<Utc>, _>("updated_at"),
    })
}

fn page_from_row(r: &SqliteRow) -> Result<StoredPage> {
    let raw_status = r.get::<String, _>("status");
    let status = PageStatus::parse(&raw_status)
        .with_context(|| format!("unknown page status '{raw_status}' in pages row"))?;
    Ok(StoredPage {
        page_id: PageId(r.get::<i64, _>("id")),
        fields: PageFields {
            title: r.get::<String, _>("title"),
            slug: r.get::<String, _>("slug"),
            content: r.get::<String, _>("content"),
            banner_media_id: r.get::<Option<i64>, _>("banner_media_id").map(MediaId),
            status,
            published_at: r.get::<Option<DateTime<Utc>>, _>("published_at"),
        },
        author_id: UserId(r.get::<i64, _>("author_id")),
        created_at: r.get::<DateTime<Utc>, _>("created_at"),
        updated_at: r.get::<DateTime<Utc>, _>("updated_at"),
    })
}

fn team_member_from_row(r: &SqliteRow) -> StoredTeamMember {
    StoredTeamMember {
        team_member_id: TeamMemberId(r.get::<i64, _>("id")),
        fields: TeamMemberFields {
            name: r.get::<String, _>("name"),
            role: r.get::<String, _>("role"),
            bio: r.get::<Option<String>, _>("bio"),
            profile_picture: r.get::<Option<String>, _>("profile_picture"),
            email: r.get::<String, _>("email"),
            sort_order: r.get::<i64, _>("sort_order"),
            is_active: r.get::<bool, _>("is_active"),
        },
        created_by: UserId(r.get::<i64, _>("created_by")),
        created_at: r.get::<DateTime<Utc>, _>("created_at"),
        updated_at: r.get::<DateTime<Utc>, _>("updated_at"),
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
