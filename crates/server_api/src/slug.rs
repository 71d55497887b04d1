//! Unique, URL-safe page slugs derived from titles.
//!
//! A slug is the transliterated, lowercase ASCII form of the title with words
//! joined by single hyphens. When the base slug is taken, `-1`, `-2`, ... are appended until an
//! unused candidate turns up. The database's unique index on `pages.slug` has
//! the final say; callers retry when an insert still loses a race.

use async_trait::async_trait;
use shared::{domain::PageId, error::ApiError};
use storage::Storage;

/// Base used when a title has no sluggable characters.
pub const FALLBACK_SLUG: &str = "untitled";

const MAX_BASE_LEN: usize = 200;

#[async_trait]
pub trait SlugIndex: Send + Sync {
    /// Whether a record other than `exclude` already owns `slug`.
    async fn slug_taken(&self, slug: &str, exclude: Option<PageId>) -> anyhow::Result<bool>;
}

#[async_trait]
impl SlugIndex for Storage {
    async fn slug_taken(&self, slug: &str, exclude: Option<PageId>) -> anyhow::Result<bool> {
        Storage::slug_taken(self, slug, exclude).await
    }
}

/// Transliterates `title` to ASCII and joins its words with single hyphens.
/// Punctuation inside a word is dropped rather than split on, and `@` reads
/// as "at".
pub fn slugify(title: &str) -> String {
    let mut cleaned = String::with_capacity(title.len());
    for ch in title.chars() {
        match ch {
            '@' => cleaned.push_str(" at "),
            '_' => cleaned.push(' '),
            ch if ch.is_alphanumeric() || ch.is_whitespace() || ch == '-' => cleaned.push(ch),
            _ => {}
        }
    }

    let mut slug = ::slug::slugify(cleaned);
    if slug.len() > MAX_BASE_LEN {
        slug.truncate(MAX_BASE_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// Returns the first unused slug for `title`, ignoring the record `exclude`.
pub async fn generate_unique_slug<I>(
    index: &I,
    title: &str,
    exclude: Option<PageId>,
) -> Result<String, ApiError>
where
    I: SlugIndex + ?Sized,
{
    let mut base = slugify(title);
    if base.is_empty() {
        base = FALLBACK_SLUG.to_string();
    }

    let mut candidate = base.clone();
    let mut counter: u64 = 1;
    while index
        .slug_taken(&candidate, exclude)
        .await
        .map_err(crate::internal)?
    {
        candidate = format!("{base}-{counter}");
        counter += 1;
    }
    Ok(candidate)
}

#[cfg(test)]
#[path = "tests/slug_tests.rs"]
mod tests;
