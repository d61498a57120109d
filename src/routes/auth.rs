// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Authentication route handlers.

use crate::app::AppState;
use crate::error::ApiError;
use crate::models::auth::{
    AuthUser, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, LoginResponse,
    MessageResponse, RegisterRequest, ResetPasswordRequest, TwoFactorRequest, UserResponse,
    VerifyOtpRequest,
};
use crate::services::auth::{LoginOutcome, SignedSession};
use crate::services::auth_middleware::{
    clear_session_cookie, client_info, create_session_cookie, session_token,
};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use tower_cookies::Cookies;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        register_handler,
        login_handler,
        verify_otp_handler,
        logout_handler,
        me_handler,
        verify_email_handler,
        resend_verification_handler,
        forgot_password_handler,
        reset_password_handler,
        change_password_handler,
        two_factor_handler,
    ),
    components(schemas(
        RegisterRequest,
        LoginRequest,
        VerifyOtpRequest,
        ForgotPasswordRequest,
        ResetPasswordRequest,
        ChangePasswordRequest,
        TwoFactorRequest,
        UserResponse,
        LoginResponse,
        MessageResponse,
    )),
    tags((name = "auth", description = "Accounts, sessions and credentials"))
)]
pub struct AuthApiDoc;

/// Create auth router with all authentication routes.
pub fn auth_router() -> Router<AppState> {
    Router::new()
        // Public routes (no auth required)
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/verify-otp", post(verify_otp_handler))
        .route("/logout", post(logout_handler))
        .route("/verify-email/{token}", get(verify_email_handler))
        .route("/forgot-password", post(forgot_password_handler))
        .route("/reset-password", post(reset_password_handler))
        // Protected routes (auth required)
        .route("/me", get(me_handler))
        .route("/resend-verification", post(resend_verification_handler))
        .route("/password", put(change_password_handler))
        .route("/two-factor", put(two_factor_handler))
}

/// Set the session cookie and build the login response.
fn session_response(state: &AppState, cookies: &Cookies, session: SignedSession) -> LoginResponse {
    let config = state.auth_service.config();
    cookies.add(create_session_cookie(
        &session.token,
        config.session_max_age_seconds(),
        config.cookie_secure,
    ));

    LoginResponse {
        success: true,
        message: "Signed in".to_string(),
        two_factor_required: false,
        token: Some(session.token),
        user: Some(UserResponse::from(&session.user)),
    }
}

// ============================================================================
// Public Route Handlers
// ============================================================================

/// Create an applicant account. A verification link is emailed.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 400, description = "Invalid input", body = MessageResponse),
        (status = 409, description = "Email or username taken", body = MessageResponse)
    ),
    tag = "auth"
)]
async fn register_handler(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let user = state.auth_service.register(&payload).await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

/// Sign in with email or username and password.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (
            status = 200,
            description = "Signed in, or a login code was emailed",
            body = LoginResponse
        ),
        (status = 401, description = "Invalid credentials", body = MessageResponse),
        (status = 403, description = "Account suspended", body = MessageResponse)
    ),
    tag = "auth"
)]
async fn login_handler(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let outcome = state
        .auth_service
        .login(&payload.identifier, &payload.password, &client_info(&headers))
        .await?;

    let response = match outcome {
        LoginOutcome::Session(session) => session_response(&state, &cookies, session),
        LoginOutcome::TwoFactorRequired => LoginResponse {
            success: true,
            message: "A sign-in code has been sent to your email".to_string(),
            two_factor_required: true,
            token: None,
            user: None,
        },
    };

    Ok(Json(response))
}

/// Complete a two-factor login with the emailed code.
#[utoipa::path(
    post,
    path = "/auth/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 400, description = "Malformed code", body = MessageResponse),
        (status = 401, description = "Invalid or expired code", body = MessageResponse)
    ),
    tag = "auth"
)]
async fn verify_otp_handler(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let session = state
        .auth_service
        .verify_otp(&payload, &client_info(&headers))
        .await?;

    Ok(Json(session_response(&state, &cookies, session)))
}

/// Sign out and clear the session cookie.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 200, description = "Signed out", body = MessageResponse)),
    tag = "auth"
)]
async fn logout_handler(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    let token = session_token(&headers, &cookies);

    // Cleared even when revoking the session fails
    cookies.remove(clear_session_cookie());

    if let Some(token) = token {
        state.auth_service.logout(&token).await?;
    }

    Ok(Json(MessageResponse::ok("Signed out")))
}

/// Confirm an email address from the emailed link.
#[utoipa::path(
    get,
    path = "/auth/verify-email/{token}",
    params(("token" = String, Path, description = "Token from the verification email")),
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Invalid, used or expired token", body = MessageResponse)
    ),
    tag = "auth"
)]
async fn verify_email_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.auth_service.verify_email(&token).await?;
    Ok(Json(MessageResponse::ok("Email verified")))
}

/// Request a password reset link. Always succeeds.
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses((
        status = 200,
        description = "Reset link sent if the account exists",
        body = MessageResponse
    )),
    tag = "auth"
)]
async fn forgot_password_handler(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.auth_service.forgot_password(&payload.email).await?;
    Ok(Json(MessageResponse::ok(
        "If an account exists for this email, a reset link has been sent.",
    )))
}

/// Set a new password using an emailed reset token. Signs out all sessions.
#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Invalid token or password", body = MessageResponse)
    ),
    tag = "auth"
)]
async fn reset_password_handler(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.auth_service.reset_password(&payload).await?;
    Ok(Json(MessageResponse::ok("Password has been reset")))
}

// ============================================================================
// Protected Route Handlers (require authentication)
// ============================================================================

/// Get the signed-in user.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not signed in", body = MessageResponse)
    ),
    tag = "auth"
)]
async fn me_handler(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.auth_service.get_user(auth_user.user_id).await?;
    Ok(Json(UserResponse::from(&user)))
}

/// Email a new verification link.
#[utoipa::path(
    post,
    path = "/auth/resend-verification",
    responses(
        (status = 200, description = "Link sent", body = MessageResponse),
        (status = 401, description = "Not signed in", body = MessageResponse),
        (status = 409, description = "Already verified", body = MessageResponse)
    ),
    tag = "auth"
)]
async fn resend_verification_handler(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<MessageResponse>, ApiError> {
    state.auth_service.resend_verification(&auth_user).await?;
    Ok(Json(MessageResponse::ok("Verification email sent")))
}

/// Change the password of the signed-in user.
#[utoipa::path(
    put,
    path = "/auth/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "New password too weak", body = MessageResponse),
        (status = 401, description = "Wrong current password", body = MessageResponse)
    ),
    tag = "auth"
)]
async fn change_password_handler(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .auth_service
        .change_password(&auth_user, &payload)
        .await?;
    Ok(Json(MessageResponse::ok("Password changed")))
}

/// Turn emailed sign-in codes on or off.
#[utoipa::path(
    put,
    path = "/auth/two-factor",
    request_body = TwoFactorRequest,
    responses(
        (status = 200, description = "Setting updated", body = UserResponse),
        (status = 401, description = "Wrong password", body = MessageResponse)
    ),
    tag = "auth"
)]
async fn two_factor_handler(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<TwoFactorRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .auth_service
        .set_two_factor(&auth_user, payload.enabled, &payload.password)
        .await?;
    Ok(Json(UserResponse::from(&user)))
}
