use super::*;
use axum::body;
use serde_json::Value;

async fn render(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, serde_json::from_slice(&bytes).expect("json"))
}

fn failure(error: ApiError) -> Response {
    ApiFailure::new(error, "Widget not found", "Failed to save widget").into_response()
}

#[test]
fn error_codes_map_to_http_statuses() {
    assert_eq!(status_for(ErrorCode::Unauthorized), StatusCode::UNAUTHORIZED);
    assert_eq!(status_for(ErrorCode::NotFound), StatusCode::NOT_FOUND);
    assert_eq!(status_for(ErrorCode::Validation), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(status_for(ErrorCode::Conflict), StatusCode::CONFLICT);
    for code in [ErrorCode::Storage, ErrorCode::Persistence, ErrorCode::Internal] {
        assert_eq!(status_for(code), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

#[tokio::test]
async fn validation_failures_carry_field_errors() {
    let error = ApiError::field("title", "The title field is required.");
    let (status, body) = render(failure(error)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "Validation failed");
    assert_eq!(body["errors"]["title"][0], "The title field is required.");
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn server_failures_hide_details() {
    let (status, body) = render(failure(ApiError::new(
        ErrorCode::Storage,
        "failed to store a.png: disk full",
    )))
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Failed to save widget");
    assert_eq!(body["errors"]["server"][0], "An unexpected error occurred");
}

#[tokio::test]
async fn not_found_names_the_resource() {
    let error = ApiError::not_found("Widget with ID 3 not found");
    let (status, body) = render(failure(error)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Widget not found");
    assert_eq!(body["errors"]["id"][0], "Widget with ID 3 not found");
}

#[tokio::test]
async fn empty_lists_say_no_data() {
    let empty = Reply::list("Widgets fetched successfully", Vec::<u8>::new());
    let (status, body) = render(empty.into_response()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "No data");
    assert_eq!(body["data"], Value::Array(Vec::new()));

    let created = Reply::created("Widget created successfully", 1);
    let (status, body) = render(created.into_response()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
}
