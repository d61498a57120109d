// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Authentication extractors and cookie helpers for Axum.
//!
//! - `SESSION_COOKIE_NAME`: the cookie carrying the session token
//! - `AuthUser`: any signed-in, active user (cookie or `Authorization: Bearer`)
//! - `AdminUser`: a signed-in admin
//! - `client_info`: user agent and client address recorded on new sessions

use crate::app::AppState;
use crate::error::ApiError;
use crate::models::auth::AuthUser;
use crate::services::auth::{require_admin, ClientInfo};
use crate::services::tokens::bearer_token;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap};
use tower_cookies::cookie::{time::Duration, SameSite};
use tower_cookies::{Cookie, Cookies};

/// Cookie name for the session.
pub const SESSION_COOKIE_NAME: &str = "grant_session";

/// Find the session token, preferring the `Authorization` header over the cookie.
pub fn session_token(headers: &HeaderMap, cookies: &Cookies) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_string)
        .or_else(|| {
            cookies
                .get(SESSION_COOKIE_NAME)
                .map(|c| c.value().to_string())
                .filter(|v| !v.is_empty())
        })
}

async fn extract_session_token(parts: &mut Parts, state: &AppState) -> Option<String> {
    let cookies = Cookies::from_request_parts(parts, state).await.ok()?;
    session_token(&parts.headers, &cookies)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = extract_session_token(parts, state)
            .await
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        state.auth_service.validate_session(&token).await
    }
}

/// A signed-in user with the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        require_admin(&user)?;
        Ok(AdminUser(user))
    }
}

/// Read the user agent and client address from request headers.
pub fn client_info(headers: &HeaderMap) -> ClientInfo {
    let header_str = |name: &'static str| headers.get(name).and_then(|v| v.to_str().ok());

    let ip_address = header_str("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .or_else(|| header_str("x-real-ip"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    ClientInfo {
        user_agent: header_str("user-agent").map(str::to_string),
        ip_address,
    }
}

/// Create a session cookie with the given token.
pub fn create_session_cookie(token: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, token.to_string()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(Duration::seconds(max_age_secs))
        .build()
}

/// Create a cookie that clears the session (for logout).
pub fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, ""))
        .path("/")
        .http_only(true)
        .max_age(Duration::ZERO)
        .build()
}
