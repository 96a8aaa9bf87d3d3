mod common;

use axum::http::StatusCode;
use common::*;

#[tokio::test]
async fn register_then_login_succeeds() {
    let pool = test_pool().await;
    let username = unique_username();

    let body = register_user(create_test_app(pool.clone()), &username, "correct horse battery").await;
    assert!(body["access_token"].as_str().is_some());
    assert!(body["refresh_token"].as_str().is_some());
    assert_eq!(body["user"]["username"], username);

    let (status, login_body) = post_json(
        create_test_app(pool.clone()),
        "/auth/login",
        serde_json::json!({ "username": username, "password": "correct horse battery" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{login_body}");
    assert!(login_body["access_token"].as_str().is_some());
}

#[tokio::test]
async fn login_with_wrong_password_is_forbidden() {
    let pool = test_pool().await;
    let username = unique_username();
    register_user(create_test_app(pool.clone()), &username, "correct horse battery").await;

    let (status, body) = post_json(
        create_test_app(pool.clone()),
        "/auth/login",
        serde_json::json!({ "username": username, "password": "wrong password" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
}

#[tokio::test]
async fn register_rejects_duplicate_username() {
    let pool = test_pool().await;
    let username = unique_username();
    register_user(create_test_app(pool.clone()), &username, "correct horse battery").await;

    let (status, body) = post_json(
        create_test_app(pool.clone()),
        "/auth/register",
        serde_json::json!({
            "username": username,
            "email": format!("other-{username}@postflow.test"),
            "password": "another password",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
}

#[tokio::test]
async fn register_rejects_short_password() {
    let pool = test_pool().await;
    let username = unique_username();

    let (status, body) = post_json(
        create_test_app(pool.clone()),
        "/auth/register",
        serde_json::json!({
            "username": username,
            "email": format!("{username}@postflow.test"),
            "password": "short",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
}

#[tokio::test]
async fn refresh_rotates_token_and_old_one_cannot_be_reused() {
    let pool = test_pool().await;
    let username = unique_username();
    let body = register_user(create_test_app(pool.clone()), &username, "correct horse battery").await;
    let refresh_token = body["refresh_token"].as_str().unwrap().to_string();

    let (status, rotated) = post_json(
        create_test_app(pool.clone()),
        "/auth/refresh",
        serde_json::json!({ "refresh_token": refresh_token }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{rotated}");
    assert!(rotated["access_token"].as_str().is_some());
    assert_ne!(rotated["refresh_token"].as_str().unwrap(), refresh_token);

    let (replay_status, replay_body) = post_json(
        create_test_app(pool.clone()),
        "/auth/refresh",
        serde_json::json!({ "refresh_token": refresh_token }),
    )
    .await;
    assert_eq!(replay_status, StatusCode::FORBIDDEN, "{replay_body}");
}

#[tokio::test]
async fn logout_revokes_the_refresh_token() {
    let pool = test_pool().await;
    let username = unique_username();
    let body = register_user(create_test_app(pool.clone()), &username, "correct horse battery").await;
    let refresh_token = body["refresh_token"].as_str().unwrap().to_string();

    let (status, _) = post_json(
        create_test_app(pool.clone()),
        "/auth/logout",
        serde_json::json!({ "refresh_token": refresh_token }),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = post_json(
        create_test_app(pool.clone()),
        "/auth/refresh",
        serde_json::json!({ "refresh_token": refresh_token }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
}
