use std::{sync::Arc, time::Duration};

use shared::{
    domain::{MediaId, TeamMemberId},
    error::{ApiError, ErrorCode},
    protocol::{MediaPayload, TeamMemberPayload},
};
use storage::{FileStore, Storage};

pub mod cache;
pub mod media;
pub mod pages;
pub mod slug;
pub mod team_members;
pub mod upload;

pub use cache::TtlCache;
pub use media::{create_media, delete_media, get_media, list_media};
pub use pages::{create_page, delete_page, get_page, list_pages, update_page};
pub use slug::{generate_unique_slug, slugify, SlugIndex};
pub use team_members::{
    create_team_member, delete_team_member, get_team_member, list_team_members,
    update_team_member,
};
pub use upload::{
    handle_file_create, handle_file_delete, handle_file_replace, FileDeletePolicy, Placement,
    StoredFile, Upload, UploadRules,
};

/// Collaborators every operation runs against.
#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub files: Arc<dyn FileStore>,
    /// Answers whether a page slug is already taken.
    pub slugs: Arc<dyn SlugIndex>,
    pub media_cache: TtlCache<MediaId, MediaPayload>,
    pub team_cache: TtlCache<TeamMemberId, TeamMemberPayload>,
}

impl ApiContext {
    pub fn new(storage: Storage, files: Arc<dyn FileStore>, cache_ttl: Duration) -> Self {
        Self {
            slugs: Arc::new(storage.clone()),
            storage,
            files,
            media_cache: TtlCache::new(cache_ttl),
            team_cache: TtlCache::new(cache_ttl),
        }
    }

    pub fn with_slug_index(mut self, slugs: Arc<dyn SlugIndex>) -> Self {
        self.slugs = slugs;
        self
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

/// Maps a failed database write; unique-index violations become conflicts.
fn persistence(err: anyhow::Error) -> ApiError {
    if storage::is_unique_violation(&err) {
        ApiError::new(ErrorCode::Conflict, err.to_string())
    } else {
        ApiError::new(ErrorCode::Persistence, err.to_string())
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
