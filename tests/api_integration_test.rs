// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use grant_portal::app::{create_router, AppState};
use grant_portal::models::auth::{RegisterRequest, TokenPurpose};
use grant_portal::services::auth::{AuthConfig, AuthService};
use grant_portal::services::auth_db::{AuthDbClient, CreateVerificationTokenParams};
use grant_portal::services::email::{EmailConfig, EmailService};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

// Integration tests for the HTTP API
// These tests require a running Postgres instance
// Run with: DATABASE_URL=postgres://... cargo test --test api_integration_test -- --ignored

const PASSWORD: &str = "correct-horse-battery";

struct TestApp {
    router: Router,
    state: AppState,
    auth_db: AuthDbClient,
}

async fn create_test_app() -> TestApp {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool: PgPool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("Failed to connect to Postgres");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let auth_config = AuthConfig {
        jwt_secret: "integration-test-secret-with-32-plus-chars".to_string(),
        session_max_age_hours: 1,
        otp_expiry_minutes: 10,
        otp_max_attempts: 3,
        email_verification_expiry_hours: 24,
        password_reset_expiry_minutes: 60,
        cookie_secure: false,
    };
    let email = EmailService::new(EmailConfig::log_only("http://localhost:3000"))
        .expect("Failed to build mailer");
    let state = AppState::new(pool.clone(), email, auth_config).expect("Failed to build state");

    TestApp {
        router: create_router(state.clone()),
        state,
        auth_db: AuthDbClient::new(pool),
    }
}

fn unique_name(prefix: &str) -> String {
    let id = Uuid::now_v7().simple().to_string();
    format!("{prefix}_{}", &id[id.len() - 12..])
}

impl TestApp {
    async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Register an applicant and return (username, email).
    async fn register(&self) -> (String, String) {
        let username = unique_name("applicant");
        let email = format!("{username}@example.com");
        let (status, body) = self
            .call(
                "POST",
                "/auth/register",
                None,
                Some(json!({"username": username, "email": email, "password": PASSWORD})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["email_verified"], false);
        (username, email)
    }

    async fn login(&self, identifier: &str) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/auth/login",
                None,
                Some(json!({"identifier": identifier, "password": PASSWORD})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    async fn user_id(&self, email: &str) -> Uuid {
        self.auth_db
            .get_user_by_email(email)
            .await
            .unwrap()
            .unwrap()
            .id
    }

    /// Store a token with a known raw value for the given user.
    async fn plant_token(&self, user_id: Uuid, purpose: TokenPurpose, ttl: Duration) -> String {
        let (raw, hash) = AuthService::generate_token();
        self.auth_db
            .create_verification_token(&CreateVerificationTokenParams {
                token_hash: &hash,
                user_id,
                purpose,
                expires_at: Utc::now() + ttl,
            })
            .await
            .unwrap();
        raw
    }

    async fn create_admin(&self) -> String {
        let username = unique_name("admin");
        let email = format!("{username}@example.com");
        self.state
            .auth_service
            .create_admin(&RegisterRequest {
                username,
                email: email.clone(),
                password: PASSWORD.to_string(),
                full_name: "Review Team".to_string(),
            })
            .await
            .unwrap();
        self.login(&email).await
    }
}

fn draft() -> Value {
    json!({
        "title": "Community garden",
        "summary": "Raised beds for the neighbourhood",
        "description": "Materials, soil and a water tank.",
        "category": "environment",
        "requested_amount": 1500
    })
}

#[tokio::test]
#[ignore]
async fn test_duplicate_registration_conflicts() {
    let app = create_test_app().await;
    let (username, email) = app.register().await;

    let (status, _) = app
        .call(
            "POST",
            "/auth/register",
            None,
            Some(json!({
                "username": unique_name("other"),
                "email": email.to_uppercase(),
                "password": PASSWORD
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .call(
            "POST",
            "/auth/register",
            None,
            Some(json!({"username": username, "email": "fresh@example.com", "password": PASSWORD})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore]
async fn test_wrong_password_is_unauthorized() {
    let app = create_test_app().await;
    let (username, _) = app.register().await;

    let (status, body) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({"identifier": username, "password": "not-the-password"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
#[ignore]
async fn test_email_verification_token_is_single_use() {
    let app = create_test_app().await;
    let (_, email) = app.register().await;
    let user_id = app.user_id(&email).await;

    let raw = app
        .plant_token(user_id, TokenPurpose::EmailVerification, Duration::hours(1))
        .await;

    let uri = format!("/auth/verify-email/{raw}");
    let (status, _) = app.call("GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.call("GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let token = app.login(&email).await;
    let (_, me) = app.call("GET", "/auth/me", Some(&token), None).await;
    assert_eq!(me["email_verified"], true);
}

#[tokio::test]
#[ignore]
async fn test_expired_verification_token_is_rejected() {
    let app = create_test_app().await;
    let (_, email) = app.register().await;
    let user_id = app.user_id(&email).await;

    let raw = app
        .plant_token(user_id, TokenPurpose::EmailVerification, Duration::hours(-1))
        .await;

    let (status, _) = app
        .call("GET", &format!("/auth/verify-email/{raw}"), None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_password_reset_revokes_sessions() {
    let app = create_test_app().await;
    let (_, email) = app.register().await;
    let old_token = app.login(&email).await;
    let user_id = app.user_id(&email).await;

    let raw = app
        .plant_token(user_id, TokenPurpose::PasswordReset, Duration::minutes(30))
        .await;
    let (status, _) = app
        .call(
            "POST",
            "/auth/reset-password",
            None,
            Some(json!({"token": raw, "new_password": "a-brand-new-password"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.call("GET", "/auth/me", Some(&old_token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({"identifier": email, "password": "a-brand-new-password"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
#[ignore]
async fn test_logout_revokes_token() {
    let app = create_test_app().await;
    let (username, _) = app.register().await;
    let token = app.login(&username).await;

    let (status, _) = app.call("POST", "/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.call("GET", "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_two_factor_login_requires_code() {
    let app = create_test_app().await;
    let (username, _) = app.register().await;
    let token = app.login(&username).await;

    let (status, body) = app
        .call(
            "PUT",
            "/auth/two-factor",
            Some(&token),
            Some(json!({"enabled": true, "password": PASSWORD})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["two_factor_enabled"], true);

    let (status, body) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({"identifier": username, "password": PASSWORD})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["two_factor_required"], true);
    assert!(body["token"].is_null());

    for _ in 0..3 {
        let (status, _) = app
            .call(
                "POST",
                "/auth/verify-otp",
                None,
                Some(json!({"identifier": username, "code": "000000"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

/// Register a user with emailed login codes turned on and return (username, user_id).
async fn two_factor_user(app: &TestApp) -> (String, Uuid) {
    let (username, email) = app.register().await;
    let token = app.login(&username).await;
    let (status, _) = app
        .call(
            "PUT",
            "/auth/two-factor",
            Some(&token),
            Some(json!({"enabled": true, "password": PASSWORD})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    (username, app.user_id(&email).await)
}

async fn submit_code(app: &TestApp, username: &str, code: &str) -> (StatusCode, Value) {
    app.call(
        "POST",
        "/auth/verify-otp",
        None,
        Some(json!({"identifier": username, "code": code})),
    )
    .await
}

#[tokio::test]
#[ignore]
async fn test_correct_login_code_opens_session() {
    let app = create_test_app().await;
    let (username, user_id) = two_factor_user(&app).await;
    app.auth_db
        .replace_otp(
            user_id,
            &AuthService::hash_token("123456"),
            Utc::now() + Duration::minutes(5),
        )
        .await
        .unwrap();

    let (status, body) = submit_code(&app, &username, "123456").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let token = body["token"].as_str().unwrap().to_string();

    let (status, me) = app.call("GET", "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], username);

    // Codes are single use
    assert!(app.auth_db.get_otp(user_id).await.unwrap().is_none());
    let (status, _) = submit_code(&app, &username, "123456").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_login_code_is_discarded_after_max_attempts() {
    let app = create_test_app().await;
    let (username, user_id) = two_factor_user(&app).await;
    app.auth_db
        .replace_otp(
            user_id,
            &AuthService::hash_token("123456"),
            Utc::now() + Duration::minutes(5),
        )
        .await
        .unwrap();

    // otp_max_attempts is 3 in the test config
    for _ in 0..3 {
        let (status, _) = submit_code(&app, &username, "654321").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    assert_eq!(app.auth_db.get_otp(user_id).await.unwrap().unwrap().attempts, 3);

    let (status, body) = submit_code(&app, &username, "123456").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["token"].is_null());
    assert!(app.auth_db.get_otp(user_id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_expired_login_code_is_rejected() {
    let app = create_test_app().await;
    let (username, user_id) = two_factor_user(&app).await;
    app.auth_db
        .replace_otp(
            user_id,
            &AuthService::hash_token("123456"),
            Utc::now() - Duration::minutes(1),
        )
        .await
        .unwrap();

    let (status, _) = submit_code(&app, &username, "123456").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(app.auth_db.get_otp(user_id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_unverified_applicant_cannot_submit() {
    let app = create_test_app().await;
    let (username, _) = app.register().await;
    let token = app.login(&username).await;

    let (status, created) = app
        .call("POST", "/applications", Some(&token), Some(draft()))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let uri = format!("/applications/{}/submit", created["id"].as_str().unwrap());
    let (status, _) = app.call("POST", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore]
async fn test_applications_are_private_to_owner() {
    let app = create_test_app().await;
    let (owner, _) = app.register().await;
    let (other, _) = app.register().await;
    let owner_token = app.login(&owner).await;
    let other_token = app.login(&other).await;

    let (_, created) = app
        .call("POST", "/applications", Some(&owner_token), Some(draft()))
        .await;
    let uri = format!("/applications/{}", created["id"].as_str().unwrap());

    let (status, _) = app.call("GET", &uri, Some(&other_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.call("DELETE", &uri, Some(&other_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.call("GET", "/admin/users", Some(&owner_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore]
async fn test_full_review_flow() {
    let app = create_test_app().await;
    let (username, email) = app.register().await;
    let user_id = app.user_id(&email).await;
    app.auth_db.set_user_email_verified(user_id).await.unwrap();
    let token = app.login(&username).await;
    let admin = app.create_admin().await;

    // Draft, edit, submit
    let (_, created) = app
        .call("POST", "/applications", Some(&token), Some(draft()))
        .await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["status"], "draft");

    let mut edited = draft();
    edited["requested_amount"] = json!(900);
    let (status, updated) = app
        .call("PUT", &format!("/applications/{id}"), Some(&token), Some(edited))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["requested_amount"], 900);

    let (status, submitted) = app
        .call("POST", &format!("/applications/{id}/submit"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{submitted}");
    assert_eq!(submitted["status"], "submitted");

    // Submitted applications are frozen for the applicant
    let (status, _) = app
        .call("PUT", &format!("/applications/{id}"), Some(&token), Some(draft()))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Admin scores, then accepts
    let (status, scored) = app
        .call(
            "PUT",
            &format!("/admin/applications/{id}/score"),
            Some(&admin),
            Some(json!({"score": 87, "reviewer_notes": "Strong local support"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{scored}");
    assert_eq!(scored["status"], "under_review");
    assert_eq!(scored["score"], 87);
    assert!(scored["reviewed_at"].is_null());

    let (status, _) = app
        .call(
            "PUT",
            &format!("/admin/applications/{id}/score"),
            Some(&admin),
            Some(json!({"score": 101})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, accepted) = app
        .call(
            "PUT",
            &format!("/admin/applications/{id}/status"),
            Some(&admin),
            Some(json!({"status": "accepted"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["status"], "accepted");
    assert!(accepted["reviewed_at"].is_string());

    let (status, _) = app
        .call(
            "PUT",
            &format!("/admin/applications/{id}/status"),
            Some(&admin),
            Some(json!({"status": "draft"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Notify lands in the applicant's inbox
    let (status, _) = app
        .call(
            "POST",
            &format!("/admin/applications/{id}/notify"),
            Some(&admin),
            Some(json!({"subject": "Decision", "body": "Congratulations!"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, inbox) = app.call("GET", "/messages", Some(&token), None).await;
    assert_eq!(inbox["count"], 1);
    assert_eq!(inbox["unread"], 1);

    let message_id = inbox["messages"][0]["id"].as_str().unwrap().to_string();
    let (status, _) = app
        .call("POST", &format!("/messages/{message_id}/read"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, inbox) = app.call("GET", "/messages", Some(&token), None).await;
    assert_eq!(inbox["unread"], 0);
}

#[tokio::test]
#[ignore]
async fn test_admin_cannot_demote_self() {
    let app = create_test_app().await;
    let admin = app.create_admin().await;

    let (_, me) = app.call("GET", "/auth/me", Some(&admin), None).await;
    let uri = format!("/admin/users/{}/role", me["id"].as_str().unwrap());

    let (status, _) = app
        .call("PUT", &uri, Some(&admin), Some(json!({"role": "applicant"})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .call("PUT", &uri, Some(&admin), Some(json!({"role": "overlord"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_suspended_user_loses_access() {
    let app = create_test_app().await;
    let admin = app.create_admin().await;
    let (username, email) = app.register().await;
    let token = app.login(&username).await;
    let user_id = app.user_id(&email).await;

    let (status, body) = app
        .call(
            "PUT",
            &format!("/admin/users/{user_id}/status"),
            Some(&admin),
            Some(json!({"status": "suspended"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, _) = app.call("GET", "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({"identifier": username, "password": PASSWORD})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
