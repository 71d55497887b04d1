use super::*;

fn disks() -> (tempfile::TempDir, LocalDisks) {
    let dir = tempfile::tempdir().expect("tempdir");
    let disks = LocalDisks::public(dir.path(), "http://localhost:8080/storage").expect("disks");
    (dir, disks)
}

#[tokio::test]
async fn put_then_delete_round_trip() {
    let (dir, disks) = disks();
    let stored = disks
        .put(PUBLIC_DISK, "media/images/a.png", b"png")
        .await
        .expect("put");
    assert_eq!(stored, "media/images/a.png");
    assert!(dir.path().join("media/images/a.png").exists());
    assert!(disks.exists(PUBLIC_DISK, &stored).await.expect("exists"));

    assert!(disks.delete(PUBLIC_DISK, &stored).await.expect("delete"));
    assert!(!disks.exists(PUBLIC_DISK, &stored).await.expect("exists"));
    assert!(!disks.delete(PUBLIC_DISK, &stored).await.expect("second delete"));
}

#[tokio::test]
async fn put_leaves_no_partial_files_behind() {
    let (dir, disks) = disks();
    disks
        .put(PUBLIC_DISK, "team-members/p.jpg", b"jpg")
        .await
        .expect("put");

    let names: Vec<String> = std::fs::read_dir(dir.path().join("team-members"))
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["p.jpg".to_string()]);
}

#[tokio::test]
async fn rejects_traversal_and_unknown_disks() {
    let (_dir, disks) = disks();
    assert!(disks.put(PUBLIC_DISK, "../escape.txt", b"x").await.is_err());
    assert!(disks.put(PUBLIC_DISK, "/etc/passwd", b"x").await.is_err());
    assert!(disks.put(PUBLIC_DISK, "a\\b.txt", b"x").await.is_err());
    assert!(disks.exists("private", "a.txt").await.is_err());
}

#[test]
fn url_joins_base_and_path() {
    let (_dir, disks) = disks();
    assert_eq!(
        disks.url(PUBLIC_DISK, "media/documents/x.pdf").expect("url"),
        "http://localhost:8080/storage/media/documents/x.pdf"
    );
}
