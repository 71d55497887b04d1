use super::*;
use axum::{
    body::{self, Body},
    http::{header, Request, Response},
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "cms-test-boundary";

struct TestApp {
    router: Router,
    token: String,
    _dir: TempDir,
}

async fn test_app() -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let disks = LocalDisks::public(dir.path(), "http://localhost/storage").expect("disks");
    let api = ApiContext::new(storage, Arc::new(disks), Duration::from_secs(60));
    let auth = AuthConfig {
        jwt_secret: "test-secret".into(),
        ttl_seconds: 300,
    };

    let user_id = api.storage.create_user("editor").await.expect("user");
    let token = auth::mint_token(
        &auth,
        &shared::domain::UserSummary {
            id: user_id,
            username: "editor".into(),
        },
    )
    .expect("token");

    let router = build_router(Arc::new(AppState { api, auth }), dir.path().to_path_buf());
    TestApp {
        router,
        token,
        _dir: dir,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.expect("response");
        read_json(response).await
    }

    fn authed(&self, method: &str, uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
    }

    fn json(&self, method: &str, uri: &str, body: Value) -> Request<Body> {
        self.authed(method, uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn multipart(&self, method: &str, uri: &str, parts: &[Part<'_>]) -> Request<Body> {
        self.authed(method, uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .expect("request")
    }
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a str, &'a [u8]),
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File(name, file_name, content_type, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn read_json(response: Response<Body>) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let app = test_app().await;
    let request = Request::get("/healthz").body(Body::empty()).expect("request");
    let response = app.router.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn protected_routes_require_a_valid_bearer_token() {
    let app = test_app().await;

    let (status, body) = app
        .send(Request::get("/pages").body(Body::empty()).expect("request"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Authorization token not found");

    let (status, body) = app
        .send(
            Request::get("/pages")
                .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Token is invalid");
}

#[tokio::test]
async fn login_issues_token_accepted_by_me() {
    let app = test_app().await;
    let (status, body) = app
        .send(
            Request::post("/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "username": "writer" }).to_string()))
                .expect("request"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["token_type"], "bearer");
    assert_eq!(body["data"]["expires_in"], 300);
    let token = body["data"]["token"].as_str().expect("token").to_string();

    let (status, body) = app
        .send(
            Request::get("/auth/me")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "writer");
}

#[tokio::test]
async fn media_upload_serve_and_delete() {
    let app = test_app().await;

    let (status, body) = app
        .send(app.multipart(
            "POST",
            "/media",
            &[
                Part::Text("name", "Logo"),
                Part::File("file", "logo.png", "image/png", b"\x89PNG fake"),
            ],
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Media uploaded successfully");
    assert_eq!(body["data"]["type"], "image");
    let id = body["data"]["id"].as_i64().expect("id");
    let path = body["data"]["path"].as_str().expect("path").to_string();
    assert!(path.starts_with("media/images/"));

    let served = app
        .router
        .clone()
        .oneshot(
            Request::get(format!("/storage/{path}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(served.status(), StatusCode::OK);
    let bytes = body::to_bytes(served.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(bytes.as_ref(), b"\x89PNG fake");

    let (status, body) = app
        .send(app.authed("GET", "/media?type=image").body(Body::empty()).expect("request"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    let (status, _) = app
        .send(
            app.authed("DELETE", &format!("/media/{id}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(
            app.authed("GET", &format!("/media/{id}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Media not found");
    assert_eq!(body["errors"]["id"][0], format!("Media with ID {id} not found"));
}

#[tokio::test]
async fn media_upload_validation_uses_envelope() {
    let app = test_app().await;
    let (status, body) = app
        .send(app.multipart(
            "POST",
            "/media",
            &[Part::File("file", "virus.exe", "application/octet-stream", b"MZ")],
        ))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Validation failed");
    assert!(body["data"].is_null());
    assert!(body["errors"]["name"].is_array());
    assert!(body["errors"]["file"].is_array());
}

#[tokio::test]
async fn page_slugs_follow_titles() {
    let app = test_app().await;

    let (status, body) = app
        .send(app.authed("GET", "/pages").body(Body::empty()).expect("request"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "No data");

    let post = json!({ "title": "My First Post", "content": "Hi", "status": "draft" });
    let (status, first) = app.send(app.json("POST", "/pages", post.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["data"]["slug"], "my-first-post");
    assert_eq!(first["data"]["author"]["username"], "editor");

    let (_, second) = app.send(app.json("POST", "/pages", post)).await;
    assert_eq!(second["data"]["slug"], "my-first-post-1");
    let id = second["data"]["id"].as_i64().expect("id");

    let (status, updated) = app
        .send(app.json("PUT", &format!("/pages/{id}"), json!({ "title": "Fresh Start" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["slug"], "fresh-start");
    assert_eq!(updated["message"], "Page updated successfully");
}

#[tokio::test]
async fn team_member_form_is_validated() {
    let app = test_app().await;
    let (status, body) = app
        .send(app.multipart(
            "POST",
            "/team-members",
            &[
                Part::Text("name", "Ada"),
                Part::Text("role", "Engineer"),
                Part::Text("email", "ada@example.com"),
                Part::Text("order", "first"),
            ],
        ))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["order"].is_array());

    let (status, body) = app
        .send(app.multipart(
            "POST",
            "/team-members",
            &[
                Part::Text("name", "Ada"),
                Part::Text("role", "Engineer"),
                Part::Text("email", "ada@example.com"),
                Part::Text("is_active", "0"),
                Part::File("profile_picture", "ada.jpg", "image/jpeg", b"\xff\xd8jpeg"),
            ],
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["is_active"], false);
    assert_eq!(body["data"]["order"], 0);
    let url = body["data"]["profile_picture_url"].as_str().expect("url");
    assert!(url.starts_with("http://localhost/storage/team-members/"));
}
