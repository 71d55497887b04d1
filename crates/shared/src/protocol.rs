use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    domain::{MediaId, MediaType, PageId, PageStatus, TeamMemberId, UserId, UserSummary},
    error::FieldErrors,
};

/// Response body shared by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

impl<T> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            errors: None,
        }
    }

    pub fn failed(message: impl Into<String>, errors: FieldErrors) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            errors: Some(errors),
        }
    }
}

impl Envelope<()> {
    pub fn empty(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            errors: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPayload {
    pub id: MediaId,
    pub name: String,
    pub file_name: String,
    pub mime_type: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub path: String,
    pub disk: String,
    pub size: u64,
    pub url: String,
    pub uploaded_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagePayload {
    pub id: PageId,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub banner_media_id: Option<MediaId>,
    pub status: PageStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub author_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub banner_media: Option<MediaPayload>,
    pub author: Option<UserSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMemberPayload {
    pub id: TeamMemberId,
    pub name: String,
    pub role: String,
    pub bio: Option<String>,
    pub email: String,
    pub profile_picture: Option<String>,
    pub profile_picture_url: Option<String>,
    pub order: i64,
    pub is_active: bool,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Page fields as submitted. Everything is optional so that missing fields
/// surface as validation errors instead of body rejections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    /// `Some(None)` clears the banner; absent leaves it untouched.
    #[serde(default, deserialize_with = "present")]
    pub banner_media_id: Option<Option<i64>>,
    #[serde(default)]
    pub status: Option<String>,
    /// `YYYY-MM-DD HH:MM:SS`, UTC.
    #[serde(default, deserialize_with = "present")]
    pub published_at: Option<Option<String>>,
}

/// Team member fields as submitted; the picture travels separately.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamMemberRequest {
    pub name: Option<String>,
    pub role: Option<String>,
    pub bio: Option<String>,
    pub email: Option<String>,
    pub order: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserSummary,
}

// Distinguishes an explicit `null` from an absent key.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_distinguishes_null_from_absent() {
        let cleared: PageRequest =
            serde_json::from_str(r#"{"banner_media_id": null}"#).expect("json");
        assert_eq!(cleared.banner_media_id, Some(None));

        let untouched: PageRequest = serde_json::from_str(r#"{"title": "x"}"#).expect("json");
        assert_eq!(untouched.banner_media_id, None);
        assert_eq!(untouched.published_at, None);
    }

    #[test]
    fn failed_envelope_has_null_data() {
        let envelope: Envelope<()> = Envelope::failed("Validation failed", FieldErrors::new());
        let value = serde_json::to_value(&envelope).expect("json");
        assert_eq!(value["success"], false);
        assert!(value["data"].is_null());
    }
}
