//! HTTP handlers. Each one unpacks the request, calls into `server_api` and
//! wraps the outcome in the standard [`Envelope`].

use std::collections::HashMap;

use axum::{
    extract::{multipart::MultipartError, Multipart},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use server_api::Upload;
use shared::{
    error::{ApiError, ErrorCode, FieldErrors},
    protocol::Envelope,
};
use tracing::{error, warn};

pub(crate) mod media;
pub(crate) mod pages;
pub(crate) mod team_members;

/// A successful envelope and its status code.
pub(crate) struct Reply<T> {
    status: StatusCode,
    envelope: Envelope<T>,
}

impl<T> Reply<T> {
    pub(crate) fn ok(message: &str, data: T) -> Self {
        Self {
            status: StatusCode::OK,
            envelope: Envelope::ok(message, data),
        }
    }

    pub(crate) fn created(message: &str, data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            envelope: Envelope::ok(message, data),
        }
    }
}

impl<T> Reply<Vec<T>> {
    /// Lists answer "No data" instead of their usual message when empty.
    pub(crate) fn list(message: &str, data: Vec<T>) -> Self {
        let message = if data.is_empty() { "No data" } else { message };
        Self::ok(message, data)
    }
}

impl Reply<()> {
    pub(crate) fn done(message: &str) -> Self {
        Self {
            status: StatusCode::OK,
            envelope: Envelope::empty(message),
        }
    }
}

impl<T: Serialize> IntoResponse for Reply<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}

/// A failed operation, with the wording used when it is reported.
#[derive(Debug)]
pub(crate) struct ApiFailure {
    error: ApiError,
    not_found: &'static str,
    failed: &'static str,
}

impl ApiFailure {
    pub(crate) fn new(error: ApiError, not_found: &'static str, failed: &'static str) -> Self {
        Self {
            error,
            not_found,
            failed,
        }
    }

    pub(crate) fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(
            ApiError::new(ErrorCode::Unauthorized, message),
            "Not found",
            "Unauthorized",
        )
    }
}

pub(crate) fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Storage | ErrorCode::Persistence | ErrorCode::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn single(field: &str, message: impl Into<String>) -> FieldErrors {
    let mut errors = FieldErrors::new();
    errors.insert(field.to_string(), vec![message.into()]);
    errors
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let ApiFailure {
            error,
            not_found,
            failed,
        } = self;
        let status = status_for(error.code);
        let envelope: Envelope<()> = match error.code {
            ErrorCode::Validation => Envelope::failed("Validation failed", error.errors),
            ErrorCode::NotFound => Envelope::failed(not_found, single("id", error.message)),
            ErrorCode::Unauthorized => {
                Envelope::failed(error.message.clone(), single("auth", error.message))
            }
            ErrorCode::Conflict => {
                warn!(detail = %error.message, "{failed}");
                Envelope::failed(failed, single("conflict", error.message))
            }
            ErrorCode::Storage | ErrorCode::Persistence | ErrorCode::Internal => {
                error!(code = ?error.code, detail = %error.message, "{failed}");
                Envelope::failed(failed, single("server", "An unexpected error occurred"))
            }
        };
        (status, Json(envelope)).into_response()
    }
}

/// Text fields and files of a multipart body.
#[derive(Debug, Default)]
pub(crate) struct Form {
    pub(crate) fields: HashMap<String, String>,
    pub(crate) files: HashMap<String, Upload>,
}

impl Form {
    pub(crate) async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Form::default();
        while let Some(field) = multipart.next_field().await.map_err(malformed)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await.map_err(malformed)?;
                    if file_name.is_empty() && bytes.is_empty() {
                        // Browsers send an empty part for an untouched file input.
                        continue;
                    }
                    form.files
                        .insert(name, Upload::new(file_name, content_type, bytes.to_vec()));
                }
                None => {
                    let text = field.text().await.map_err(malformed)?;
                    form.fields.insert(name, text);
                }
            }
        }
        Ok(form)
    }

    pub(crate) fn text(&self, name: &str) -> Option<String> {
        self.fields.get(name).cloned()
    }

    pub(crate) fn take_file(&mut self, name: &str) -> Option<Upload> {
        self.files.remove(name)
    }
}

fn malformed(err: MultipartError) -> ApiError {
    ApiError::field("body", err.body_text())
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
