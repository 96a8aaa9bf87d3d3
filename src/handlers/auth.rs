//! Registration, login, and refresh-token rotation (SPEC_FULL §7 [AMBIENT]).

use axum::{extract::State, http::StatusCode, Json};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::{
    auth::{
        create_access_token, create_refresh_token, hash_password, hash_refresh_token,
        validate_token, verify_password, TokenType,
    },
    error::{AppError, AppResult},
    models::Id,
    state::AppState,
};

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Id,
    username: String,
    email: String,
    password_hash: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 32))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
}

impl From<UserRow> for UserResponse {
    fn from(u: UserRow) -> Self {
        UserResponse {
            id: u.id.to_string(),
            username: u.username,
            email: u.email,
        }
    }
}

fn validation_error(e: validator::ValidationErrors) -> AppError {
    AppError::InvalidParam(
        e.field_errors()
            .values()
            .flat_map(|v| v.iter())
            .filter_map(|e| e.message.as_ref())
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(", "),
    )
}

/// Issues an access/refresh pair for `user` and records the refresh token's
/// hash in `refresh_tokens` so [`refresh`] can validate and rotate it later.
async fn issue_tokens(state: &AppState, user: &UserRow) -> AppResult<(String, String)> {
    let access = create_access_token(user.id, user.username.clone(), &state.config.jwt_secret)?;
    let refresh = create_refresh_token(user.id, user.username.clone(), &state.config.jwt_secret)?;

    sqlx::query(
        "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(Id::new())
    .bind(user.id)
    .bind(hash_refresh_token(&refresh))
    .bind(Utc::now() + Duration::days(7))
    .execute(&state.pool)
    .await?;

    Ok((access, refresh))
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    req.validate().map_err(validation_error)?;
    info!("registering new user: {}", req.username);

    let password_hash = hash_password(&req.password)?;
    let user = sqlx::query_as::<_, UserRow>(
        "INSERT INTO users (id, username, email, password_hash)
         VALUES ($1, $2, $3, $4)
         RETURNING id, username, email, password_hash",
    )
    .bind(Id::new())
    .bind(&req.username)
    .bind(&req.email)
    .bind(&password_hash)
    .fetch_one(&state.pool)
    .await?;

    let (access_token, refresh_token) = issue_tokens(&state, &user).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            access_token,
            refresh_token,
            user: user.into(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    req.validate().map_err(validation_error)?;
    info!("login attempt for user: {}", req.username);

    let user = sqlx::query_as::<_, UserRow>(
        "SELECT id, username, email, password_hash FROM users WHERE username = $1 AND delete_at = 0",
    )
    .bind(&req.username)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::Forbidden("invalid username or password".into()))?;

    if !verify_password(&req.password, &user.password_hash)? {
        return Err(AppError::Forbidden("invalid username or password".into()));
    }

    let (access_token, refresh_token) = issue_tokens(&state, &user).await?;
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: user.into(),
    }))
}

/// Validates the refresh token's signature, expiry, and revocation status,
/// then rotates it: the old hash is marked revoked and a new pair is issued.
/// A refresh token can only ever be redeemed once.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let claims = validate_token(&req.refresh_token, &state.config.jwt_secret)?;
    if claims.token_type != TokenType::Refresh {
        return Err(AppError::Forbidden("refresh token required".into()));
    }
    let user_id = claims.user_id()?;
    let token_hash = hash_refresh_token(&req.refresh_token);

    let rotated: Option<Id> = sqlx::query_scalar(
        "UPDATE refresh_tokens SET revoked = true
         WHERE token_hash = $1 AND user_id = $2 AND revoked = false AND expires_at > now()
         RETURNING user_id",
    )
    .bind(&token_hash)
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?;

    if rotated.is_none() {
        return Err(AppError::Forbidden("refresh token is invalid or expired".into()));
    }

    let user = sqlx::query_as::<_, UserRow>(
        "SELECT id, username, email, password_hash FROM users WHERE id = $1 AND delete_at = 0",
    )
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::Forbidden("user no longer exists".into()))?;

    let (access_token, refresh_token) = issue_tokens(&state, &user).await?;
    Ok(Json(TokenResponse {
        access_token,
        refresh_token,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<StatusCode> {
    let token_hash = hash_refresh_token(&req.refresh_token);
    sqlx::query("UPDATE refresh_tokens SET revoked = true WHERE token_hash = $1")
        .bind(&token_hash)
        .execute(&state.pool)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
