//! Post HTTP surface (spec §6.1). Every route takes `{t}` (team) and, where
//! relevant, `{c}` (channel) as path segments; authorisation is delegated to
//! `PostService`, which already knows how to turn a missing membership into
//! the right `AppError`.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::{CreatePostRequest, FileInfo, Id, Post, PostList, UpdatePostRequest};
use crate::posts::CreatePostContext;
use crate::state::AppState;
use crate::store::SearchParams;

const ETAG_HEADER: &str = "X-Etag-Server";

/// Attaches the `X-Etag-Server` header to a successful body. Callers check
/// `conditional_hit` first, so by the time this runs the etag is known not
/// to match `If-None-Match` (spec §6.1 conditional GET).
fn etag_response(etag: &str, body: impl serde::Serialize) -> Response {
    let mut response = Json(body).into_response();
    if let Ok(value) = etag.parse() {
        response.headers_mut().insert(ETAG_HEADER, value);
    }
    response
}

/// Short-circuits to a bodyless 304 when the caller's `If-None-Match`
/// already matches the current etag (spec §6.1 conditional GET).
fn conditional_hit(headers: &HeaderMap, etag: &str) -> Option<Response> {
    headers
        .get("if-none-match")
        .and_then(|v| v.to_str().ok())
        .filter(|v| v == etag)
        .map(|_| StatusCode::NOT_MODIFIED.into_response())
}

// ============================================================================
// Create / Update / Delete
// ============================================================================

pub async fn create(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((_team_id, channel_id)): Path<(Id, Id)>,
    Json(mut req): Json<CreatePostRequest>,
) -> AppResult<Json<Post>> {
    if req.channel_id != channel_id {
        return Err(AppError::InvalidParam(
            "channel_id in body must match the path".into(),
        ));
    }
    req.channel_id = channel_id;
    let ctx = CreatePostContext::new(auth_user.user_id());
    let post = state.posts.create(&ctx, req).await?;
    Ok(Json(post))
}

pub async fn update(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((_team_id, _channel_id)): Path<(Id, Id)>,
    Json(req): Json<UpdatePostRequest>,
) -> AppResult<Json<Post>> {
    let post = state.posts.update(auth_user.user_id(), req).await?;
    Ok(Json(post))
}

pub async fn delete(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((_team_id, channel_id, post_id)): Path<(Id, Id, Id)>,
) -> AppResult<StatusCode> {
    state
        .posts
        .delete(auth_user.user_id(), post_id, channel_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Reads
// ============================================================================

pub async fn page(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((_team_id, channel_id, offset, limit)): Path<(Id, Id, i64, i64)>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let etag = state.posts.etag(auth_user.user_id(), channel_id).await?;
    if let Some(response) = conditional_hit(&headers, &etag) {
        return Ok(response);
    }
    let list = state
        .posts
        .get(auth_user.user_id(), channel_id, offset, limit)
        .await?;
    Ok(etag_response(&etag, list))
}

pub async fn since(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((_team_id, channel_id, time_ms)): Path<(Id, Id, i64)>,
) -> AppResult<Json<PostList>> {
    let list = state
        .posts
        .get_since(auth_user.user_id(), channel_id, time_ms)
        .await?;
    Ok(Json(list))
}

pub async fn get(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((_team_id, channel_id, post_id)): Path<(Id, Id, Id)>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let etag = state.posts.etag(auth_user.user_id(), channel_id).await?;
    if let Some(response) = conditional_hit(&headers, &etag) {
        return Ok(response);
    }
    let post = state
        .posts
        .get_by_id(auth_user.user_id(), channel_id, post_id)
        .await?;
    Ok(etag_response(&etag, post))
}

pub async fn before(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((_team_id, channel_id, post_id, offset, limit)): Path<(Id, Id, Id, i64, i64)>,
) -> AppResult<Json<PostList>> {
    let list = state
        .posts
        .get_before(auth_user.user_id(), channel_id, post_id, offset, limit)
        .await?;
    Ok(Json(list))
}

pub async fn after(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((_team_id, channel_id, post_id, offset, limit)): Path<(Id, Id, Id, i64, i64)>,
) -> AppResult<Json<PostList>> {
    let list = state
        .posts
        .get_after(auth_user.user_id(), channel_id, post_id, offset, limit)
        .await?;
    Ok(Json(list))
}

/// 30-day public cache (spec §6.1) — `FileInfo` rows never change once
/// attached, so a long max-age is safe even without per-request validation.
pub async fn file_infos(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((_team_id, channel_id, post_id)): Path<(Id, Id, Id)>,
) -> AppResult<Response> {
    state
        .posts
        .get_by_id(auth_user.user_id(), channel_id, post_id)
        .await?;
    let infos: Vec<FileInfo> = state.store.get_file_infos_for_post(post_id).await?;
    let mut response = Json(infos).into_response();
    response.headers_mut().insert(
        axum::http::header::CACHE_CONTROL,
        "public, max-age=2592000".parse().unwrap(),
    );
    Ok(response)
}

pub async fn flagged(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((team_id, offset, limit)): Path<(Id, i64, i64)>,
) -> AppResult<Json<PostList>> {
    if !state.store.is_team_member(team_id, auth_user.user_id()).await? {
        return Err(AppError::Forbidden("not a member of this team".into()));
    }
    let list = state.posts.get_flagged(auth_user.user_id(), offset, limit).await?;
    Ok(Json(list))
}

pub async fn get_in_team(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((team_id, post_id)): Path<(Id, Id)>,
) -> AppResult<Json<Post>> {
    let post = state
        .posts
        .get_by_id_in_team(auth_user.user_id(), team_id, post_id)
        .await?;
    Ok(Json(post))
}

pub async fn permalink(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((team_id, post_id)): Path<(Id, Id)>,
) -> AppResult<Json<Post>> {
    let post = state
        .posts
        .get_permalink(auth_user.user_id(), team_id, post_id)
        .await?;
    Ok(Json(post))
}

// ============================================================================
// Search
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub terms: String,
    #[serde(default)]
    pub is_or_search: bool,
}

pub async fn search(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(team_id): Path<Id>,
    Json(req): Json<SearchRequest>,
) -> AppResult<Json<PostList>> {
    if req.terms.trim().is_empty() {
        return Err(AppError::InvalidParam("terms must not be empty".into()));
    }
    let params = parse_search_params(&req.terms, req.is_or_search);
    let list = state.posts.search(auth_user.user_id(), team_id, vec![params]).await?;
    Ok(Json(list))
}

/// Splits `in:`/`from:`/`on:` modifiers out of a raw search string into a
/// single [`SearchParams`] group, leaving the remaining words as `terms`.
/// Mirrors the shape `model.ParseSearchParams` builds upstream, simplified
/// to the single-group case the HTTP body actually sends (spec §6.1).
fn parse_search_params(raw: &str, is_or: bool) -> SearchParams {
    let mut params = SearchParams {
        is_or,
        ..Default::default()
    };
    let mut terms = Vec::new();

    for word in raw.split_whitespace() {
        if let Some(channel) = word.strip_prefix("in:") {
            params.in_channel = channel.parse().ok();
        } else if let Some(user) = word.strip_prefix("from:") {
            params.from_user = user.parse().ok();
        } else if let Some(date) = word.strip_prefix("on:") {
            params.on_date = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok();
        } else {
            terms.push(word);
        }
    }

    params.terms = terms.join(" ");
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_search_params_extracts_channel_and_user_modifiers() {
        let params = parse_search_params("in:general from:alice release notes", false);
        assert_eq!(params.terms, "release notes");
        assert!(params.in_channel.is_some());
        assert!(params.from_user.is_some());
        assert!(!params.is_or);
    }

    #[test]
    fn parse_search_params_keeps_plain_terms_untouched() {
        let params = parse_search_params("hello world", true);
        assert_eq!(params.terms, "hello world");
        assert!(params.in_channel.is_none());
        assert!(params.is_or);
    }
}
