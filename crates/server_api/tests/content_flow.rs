use std::{sync::Arc, time::Duration};

use server_api::{
    create_media, create_page, create_team_member, delete_media, delete_team_member, get_page,
    update_page, ApiContext, Upload,
};
use shared::protocol::{PageRequest, TeamMemberRequest};
use storage::{FileStore, LocalDisks, Storage, PUBLIC_DISK};

async fn context(root: &std::path::Path) -> (ApiContext, shared::domain::UserId) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let user = storage.create_user("editor").await.expect("user");
    let disks = LocalDisks::public(root, "https://cdn.example.com/storage").expect("disks");
    let ctx = ApiContext::new(storage, Arc::new(disks), Duration::from_secs(60));
    (ctx, user)
}

fn draft(title: &str) -> PageRequest {
    PageRequest {
        title: Some(title.to_string()),
        content: Some("Body".to_string()),
        status: Some("draft".to_string()),
        ..PageRequest::default()
    }
}

#[tokio::test]
async fn pages_keep_unique_slugs_across_creates_and_updates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (ctx, user) = context(dir.path()).await;

    let first = create_page(&ctx, user, draft("My First Post")).await.expect("first");
    let second = create_page(&ctx, user, draft("My First Post")).await.expect("second");
    assert_eq!(first.slug, "my-first-post");
    assert_eq!(second.slug, "my-first-post-1");

    // Taking the first page's title again must not steal its slug.
    let renamed = update_page(&ctx, second.id, draft("My First Post!"))
        .await
        .expect("rename");
    assert_eq!(renamed.slug, "my-first-post-1");

    let renamed = update_page(&ctx, second.id, draft("Something New"))
        .await
        .expect("rename");
    assert_eq!(renamed.slug, "something-new");
    assert_eq!(get_page(&ctx, first.id).await.expect("first").slug, "my-first-post");
}

#[tokio::test]
async fn media_banner_is_cleared_when_media_is_deleted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (ctx, user) = context(dir.path()).await;

    let upload = Upload::new("hero.jpg", Some("image/jpeg".to_string()), b"jpeg".to_vec());
    let media = create_media(&ctx, user, Some("Hero"), Some(upload))
        .await
        .expect("media");
    assert!(media.url.starts_with("https://cdn.example.com/storage/media/images/"));

    let mut request = draft("Landing");
    request.banner_media_id = Some(Some(media.id.0));
    let page = create_page(&ctx, user, request).await.expect("page");
    assert!(page.banner_media.is_some());

    delete_media(&ctx, media.id).await.expect("delete media");
    assert!(!ctx.files.exists(PUBLIC_DISK, &media.path).await.expect("exists"));

    let page = get_page(&ctx, page.id).await.expect("page");
    assert_eq!(page.banner_media_id, None);
    assert!(page.banner_media.is_none());
}

#[tokio::test]
async fn team_member_picture_lives_and_dies_with_the_member() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (ctx, user) = context(dir.path()).await;

    let member = create_team_member(
        &ctx,
        user,
        TeamMemberRequest {
            name: Some("Grace".to_string()),
            role: Some("Admiral".to_string()),
            email: Some("grace@example.com".to_string()),
            ..TeamMemberRequest::default()
        },
        Some(Upload::new("grace.png", None, b"png".to_vec())),
    )
    .await
    .expect("member");
    let picture = member.profile_picture.clone().expect("picture");
    assert!(ctx.files.exists(PUBLIC_DISK, &picture).await.expect("exists"));

    delete_team_member(&ctx, member.id).await.expect("delete");
    assert!(!ctx.files.exists(PUBLIC_DISK, &picture).await.expect("exists"));
}
