//! Authentication & Account Tests
//!
//! Covers signup, login, token checks, role guards, and account edits.

mod common;

use axum::http::StatusCode;
use common::{app, DEFAULT_PASSWORD};
use serde_json::json;

// ===========================================================================
// Signup
// ===========================================================================

#[tokio::test]
async fn signup_creates_visitor_and_returns_token() {
    let app = app().await;

    let resp = app
        .post_json(
            "/auth/signup",
            json!({
                "email": "  Signup_Fresh@Example.com ",
                "name": "Fresh Visitor",
                "password": "secret123"
            }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::CREATED);
    let body = resp.json();
    assert!(body["access_token"].is_string());
    assert!(body["expires_at"].is_string());
    assert_eq!(body["user"]["email"], "signup_fresh@example.com");
    assert_eq!(body["user"]["role"], "visitor");
    assert!(body["user"].get("password_hash").is_none());

    let token = body["access_token"].as_str().unwrap();
    let me = app.get("/auth/me", Some(token)).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.json()["name"], "Fresh Visitor");
}

#[tokio::test]
async fn signup_duplicate_email_conflicts() {
    let app = app().await;
    let user = app.create_user("signup_dup").await;

    let resp = app
        .post_json(
            "/auth/signup",
            json!({ "email": user.email, "name": "Someone Else", "password": "secret123" }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn signup_reports_every_invalid_field() {
    let app = app().await;

    let resp = app
        .post_json(
            "/auth/signup",
            json!({ "email": "not-an-email", "name": "A", "password": "123" }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(resp.field_error("email").as_deref(), Some("invalid email address"));
    assert!(resp.field_error("name").is_some());
    assert_eq!(
        resp.field_error("password").as_deref(),
        Some("password must be at least 6 characters")
    );
}

// ===========================================================================
// Login
// ===========================================================================

#[tokio::test]
async fn login_valid_credentials() {
    let app = app().await;
    let user = app.create_user("login_valid").await;

    let resp = app
        .post_json(
            "/auth/login",
            json!({ "email": user.email, "password": DEFAULT_PASSWORD }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert!(body["access_token"].is_string());
    assert!(body["expires_at"].is_string());
    assert_eq!(body["user"]["id"], user.id.to_string());
}

#[tokio::test]
async fn login_invalid_password() {
    let app = app().await;
    let user = app.create_user("login_badpw").await;

    let resp = app
        .post_json(
            "/auth/login",
            json!({ "email": user.email, "password": "wrong_password" }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "invalid credentials");
}

#[tokio::test]
async fn login_nonexistent_user() {
    let app = app().await;

    let resp = app
        .post_json(
            "/auth/login",
            json!({ "email": "nobody@example.com", "password": "whatever123" }),
            None,
        )
        .await;

    // Same message as a wrong password
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "invalid credentials");
}

#[tokio::test]
async fn login_empty_password() {
    let app = app().await;

    let resp = app
        .post_json(
            "/auth/login",
            json!({ "email": "someone@example.com", "password": "" }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "email and password are required");
}

#[tokio::test]
async fn login_password_too_long() {
    let app = app().await;
    let long_pw: String = "a".repeat(150);

    let resp = app
        .post_json(
            "/auth/login",
            json!({ "email": "someone@example.com", "password": long_pw }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.error_message(),
        "password must be at most 128 characters"
    );
}

#[tokio::test]
async fn login_blocked_account_is_rejected() {
    let app = app().await;
    let user = app.create_user("login_blocked").await;
    sqlx::query("UPDATE users SET is_active = FALSE WHERE id = $1")
        .bind(user.id)
        .execute(app.pool())
        .await
        .unwrap();

    let resp = app
        .post_json(
            "/auth/login",
            json!({ "email": user.email, "password": DEFAULT_PASSWORD }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

// ===========================================================================
// Protected routes
// ===========================================================================

#[tokio::test]
async fn me_requires_token() {
    let app = app().await;

    let resp = app.get("/auth/me", None).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "missing Authorization header");
}

#[tokio::test]
async fn me_rejects_garbage_token() {
    let app = app().await;

    let resp = app.get("/auth/me", Some("v4.local.garbage")).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "invalid token");
}

#[tokio::test]
async fn blocked_user_token_stops_working() {
    let app = app().await;
    let user = app.create_user("token_blocked").await;

    let before = app.get("/auth/me", Some(&user.access_token)).await;
    assert_eq!(before.status, StatusCode::OK);

    sqlx::query("UPDATE users SET is_active = FALSE WHERE id = $1")
        .bind(user.id)
        .execute(app.pool())
        .await
        .unwrap();

    let after = app.get("/auth/me", Some(&user.access_token)).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn role_guards_reject_visitors() {
    let app = app().await;
    let user = app.create_user("role_guard").await;

    let creator = app.get("/creator/masterclasses", Some(&user.access_token)).await;
    assert_eq!(creator.status, StatusCode::FORBIDDEN);
    assert_eq!(creator.error_message(), "creator role required");

    let admin = app.get("/admin/users", Some(&user.access_token)).await;
    assert_eq!(admin.status, StatusCode::FORBIDDEN);
    assert_eq!(admin.error_message(), "admin role required");
}

#[tokio::test]
async fn role_change_applies_to_existing_token() {
    let app = app().await;
    let user = app.create_user("role_promoted").await;

    sqlx::query("UPDATE users SET role = 'creator' WHERE id = $1")
        .bind(user.id)
        .execute(app.pool())
        .await
        .unwrap();

    let resp = app.get("/creator/masterclasses", Some(&user.access_token)).await;
    assert_eq!(resp.status, StatusCode::OK);
}

// ===========================================================================
// Account
// ===========================================================================

#[tokio::test]
async fn update_account_changes_name_and_password() {
    let app = app().await;
    let user = app.create_user("account_edit").await;

    let resp = app
        .patch_json(
            "/account",
            json!({ "name": "Renamed Person", "phone": "+1 555 0100", "password": "newsecret1" }),
            Some(&user.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["name"], "Renamed Person");
    assert_eq!(resp.json()["phone"], "+1 555 0100");

    let old = app
        .post_json(
            "/auth/login",
            json!({ "email": user.email, "password": DEFAULT_PASSWORD }),
            None,
        )
        .await;
    assert_eq!(old.status, StatusCode::UNAUTHORIZED);

    let new = app
        .post_json(
            "/auth/login",
            json!({ "email": user.email, "password": "newsecret1" }),
            None,
        )
        .await;
    assert_eq!(new.status, StatusCode::OK);
}

#[tokio::test]
async fn update_account_rejects_bad_phone() {
    let app = app().await;
    let user = app.create_user("account_badphone").await;

    let resp = app
        .patch_json(
            "/account",
            json!({ "phone": "call me maybe" }),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(resp.field_error("phone").is_some());
}
