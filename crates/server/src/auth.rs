//! Bearer-token authentication.
//!
//! Tokens are HS256 JWTs whose subject is `user:<id>`. [`require_auth`] puts
//! the verified [`AuthUser`] into request extensions for the handlers behind it.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
    Extension, Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{UserId, UserSummary},
    error::{ApiError, ErrorCode},
    protocol::{LoginRequest, LoginResponse},
};
use tracing::{debug, info};

use crate::{
    api::{ApiFailure, Reply},
    app_state::AppState,
};

const MAX_USERNAME_CHARS: usize = 64;

#[derive(Debug, Clone)]
pub(crate) struct AuthConfig {
    pub(crate) jwt_secret: String,
    pub(crate) ttl_seconds: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    username: String,
    iat: i64,
    exp: i64,
}

/// The caller a request was authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AuthUser {
    pub(crate) user_id: UserId,
    pub(crate) username: String,
}

pub(crate) fn mint_token(
    cfg: &AuthConfig,
    user: &UserSummary,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::seconds(cfg.ttl_seconds);
    let claims = Claims {
        sub: format!("user:{}", user.id.0),
        username: user.username.clone(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(cfg.jwt_secret.as_bytes()),
    )
}

pub(crate) fn verify_token(cfg: &AuthConfig, token: &str) -> Result<AuthUser, ApiError> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(cfg.jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|err| match err.kind() {
        ErrorKind::ExpiredSignature => {
            ApiError::new(ErrorCode::Unauthorized, "Token has expired")
        }
        _ => ApiError::new(ErrorCode::Unauthorized, "Token is invalid"),
    })?
    .claims;

    let user_id = claims
        .sub
        .strip_prefix("user:")
        .and_then(|id| id.parse::<i64>().ok())
        .map(UserId)
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "Token is invalid"))?;

    Ok(AuthUser {
        user_id,
        username: claims.username,
    })
}

fn bearer_token(request: &Request) -> Result<&str, ApiError> {
    let missing = || ApiError::new(ErrorCode::Unauthorized, "Authorization token not found");
    let value = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(missing)?
        .to_str()
        .map_err(|_| missing())?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(missing)
}

pub(crate) async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiFailure> {
    let user = bearer_token(&request)
        .and_then(|token| verify_token(&state.auth, token))
        .map_err(|err| {
            debug!(reason = %err.message, "rejected request");
            ApiFailure::unauthorized(err.message)
        })?;

    debug!(user_id = %user.user_id, username = %user.username, "authenticated request");
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Issues a token for `username`, creating the user on first login.
pub(crate) async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Reply<LoginResponse>, ApiFailure> {
    let failed = |error| ApiFailure::new(error, "User not found", "Login failed");

    let username = req.username.trim();
    if username.is_empty() {
        return Err(failed(ApiError::field("username", "The username field is required.")));
    }
    if username.chars().count() > MAX_USERNAME_CHARS {
        return Err(failed(ApiError::field(
            "username",
            "The username must not be greater than 64 characters.",
        )));
    }

    let user_id = state
        .api
        .storage
        .create_user(username)
        .await
        .map_err(|e| failed(ApiError::new(ErrorCode::Internal, e.to_string())))?;
    let user = UserSummary {
        id: user_id,
        username: username.to_string(),
    };
    let token = mint_token(&state.auth, &user)
        .map_err(|e| failed(ApiError::new(ErrorCode::Internal, e.to_string())))?;

    info!(user_id = %user.id, "user logged in");
    Ok(Reply::ok(
        "Login successful",
        LoginResponse {
            token,
            token_type: "bearer".to_string(),
            expires_in: state.auth.ttl_seconds,
            user,
        },
    ))
}

pub(crate) async fn me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Reply<UserSummary>, ApiFailure> {
    let failed = |error| ApiFailure::new(error, "User not found", "Failed to load user");
    let summary = state
        .api
        .storage
        .user_summary(user.user_id)
        .await
        .map_err(|e| failed(ApiError::new(ErrorCode::Internal, e.to_string())))?
        .ok_or_else(|| {
            failed(ApiError::not_found(format!(
                "User with ID {} not found",
                user.user_id
            )))
        })?;
    Ok(Reply::ok("User retrieved successfully", summary))
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
