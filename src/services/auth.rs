// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Authentication service: accounts, password login with optional emailed
//! one-time codes, sessions, email verification, password reset and admin
//! account management.

use crate::error::{is_unique_violation, ApiError};
use crate::models::auth::{
    AuthUser, ChangePasswordRequest, RegisterRequest, ResetPasswordRequest, TokenPurpose, User,
    UserRole, UserStatus, VerificationToken, VerifyOtpRequest,
};
use crate::services::auth_db::{
    AuthDbClient, CreateSessionParams, CreateUserParams, CreateVerificationTokenParams,
};
use crate::services::config::env_or;
use crate::services::email::EmailService;
use crate::services::logging::anonymize_email;
use crate::services::password::{hash_password, verify_password};
use crate::services::tokens::SessionTokens;
use crate::services::validation::normalize_email;
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use std::env;
use std::sync::Arc;
use uuid::Uuid;
use validator::{Validate, ValidateEmail};

/// Configuration for the auth service.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 signing secret, at least 32 characters
    pub jwt_secret: String,
    /// Session lifetime in hours
    pub session_max_age_hours: u64,
    /// One-time login code expiry in minutes
    pub otp_expiry_minutes: u64,
    /// Wrong guesses allowed before a code is discarded
    pub otp_max_attempts: i32,
    pub email_verification_expiry_hours: u64,
    pub password_reset_expiry_minutes: u64,
    /// Set the `Secure` flag on the session cookie
    pub cookie_secure: bool,
}

impl AuthConfig {
    /// Load auth configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            session_max_age_hours: env_or("SESSION_MAX_AGE_HOURS", 168)?,
            otp_expiry_minutes: env_or("OTP_EXPIRY_MINUTES", 10)?,
            otp_max_attempts: env_or("OTP_MAX_ATTEMPTS", 5)?,
            email_verification_expiry_hours: env_or("EMAIL_VERIFICATION_EXPIRY_HOURS", 24)?,
            password_reset_expiry_minutes: env_or("PASSWORD_RESET_EXPIRY_MINUTES", 60)?,
            cookie_secure: env_or("COOKIE_SECURE", true)?,
        })
    }

    pub fn session_max_age_seconds(&self) -> i64 {
        self.session_max_age_hours as i64 * 60 * 60
    }
}

/// A freshly issued session.
#[derive(Debug)]
pub struct SignedSession {
    pub token: String,
    pub user: User,
}

/// Result of the password step of a login.
#[derive(Debug)]
pub enum LoginOutcome {
    Session(SignedSession),
    /// A one-time code was emailed; no session yet
    TwoFactorRequired,
}

/// Request metadata recorded on new sessions.
#[derive(Debug, Default, Clone)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const INVALID_SESSION: &str = "Invalid or expired session";
const INVALID_CODE: &str = "Invalid or expired code";

/// Authentication service.
pub struct AuthService {
    db: AuthDbClient,
    email: Arc<EmailService>,
    tokens: SessionTokens,
    config: AuthConfig,
}

impl AuthService {
    /// Create a new auth service. Fails if the signing secret is too short.
    pub fn new(db: AuthDbClient, email: Arc<EmailService>, config: AuthConfig) -> Result<Self> {
        let tokens = SessionTokens::new(&config.jwt_secret, config.session_max_age_seconds())?;
        Ok(Self {
            db,
            email,
            tokens,
            config,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    // ========== Token Generation ==========

    /// Generate a secure random token.
    /// Returns (raw_token, hash) - raw_token is sent to user, hash is stored in DB.
    pub fn generate_token() -> (String, String) {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let raw_token = hex::encode(bytes);
        let hash = Self::hash_token(&raw_token);
        (raw_token, hash)
    }

    /// Generate a 6-digit login code. Returns (code, hash).
    pub fn generate_otp() -> (String, String) {
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        let hash = Self::hash_token(&code);
        (code, hash)
    }

    /// Hash a token for storage.
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    // ========== Registration ==========

    /// Create an applicant account and email a verification link.
    pub async fn register(&self, account: &RegisterRequest) -> Result<User, ApiError> {
        let user = self
            .create_account(account, UserRole::Applicant, false)
            .await?;

        tracing::info!(
            user_id = %user.id,
            email = %anonymize_email(&user.email),
            "user registered"
        );

        // The account exists either way; the link can be re-sent.
        if let Err(e) = self.send_verification_link(&user).await {
            tracing::error!(user_id = %user.id, error = ?e, "failed to send verification email");
        }

        Ok(user)
    }

    /// Create a verified admin account. Used by the `create-admin` command.
    pub async fn create_admin(&self, account: &RegisterRequest) -> Result<User, ApiError> {
        let user = self.create_account(account, UserRole::Admin, true).await?;
        tracing::info!(
            user_id = %user.id,
            email = %anonymize_email(&user.email),
            "admin account created"
        );
        Ok(user)
    }

    async fn create_account(
        &self,
        account: &RegisterRequest,
        role: UserRole,
        email_verified: bool,
    ) -> Result<User, ApiError> {
        account.validate()?;
        let email = normalize_email(&account.email);
        let username = account.username.as_str();

        if self
            .db
            .get_user_by_email(&email)
            .await
            .context("Failed to look up email")?
            .is_some()
        {
            return Err(ApiError::conflict("Email already registered"));
        }
        if self
            .db
            .get_user_by_username(username)
            .await
            .context("Failed to look up username")?
            .is_some()
        {
            return Err(ApiError::conflict("Username already taken"));
        }

        let password_hash = hash_password(&account.password)?;

        // A concurrent registration can still win the race; the unique
        // indexes catch it.
        self.db
            .create_user(&CreateUserParams {
                username,
                email: &email,
                password_hash: &password_hash,
                full_name: account.full_name.trim(),
                role,
                email_verified,
            })
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    ApiError::conflict("Email or username already registered")
                } else {
                    ApiError::Database(e)
                }
            })
    }

    // ========== Login ==========

    /// Check a password and either open a session or email a one-time code.
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<LoginOutcome, ApiError> {
        let user = self
            .find_user(identifier)
            .await?
            .ok_or_else(|| ApiError::unauthorized(INVALID_CREDENTIALS))?;

        if !verify_password(password, &user.password_hash)? {
            tracing::warn!(
                user_id = %user.id,
                ip = client.ip_address.as_deref().unwrap_or("-"),
                "login failed: wrong password"
            );
            return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
        }

        if !user.is_active() {
            return Err(ApiError::forbidden("Account suspended"));
        }

        if user.two_factor_enabled {
            self.send_login_code(&user).await?;
            return Ok(LoginOutcome::TwoFactorRequired);
        }

        self.open_session(user, client)
            .await
            .map(LoginOutcome::Session)
    }

    /// Second login step: check the emailed code and open a session.
    pub async fn verify_otp(
        &self,
        request: &VerifyOtpRequest,
        client: &ClientInfo,
    ) -> Result<SignedSession, ApiError> {
        request.validate()?;

        let user = self
            .find_user(&request.identifier)
            .await?
            .ok_or_else(|| ApiError::unauthorized(INVALID_CODE))?;

        let otp = self
            .db
            .get_otp(user.id)
            .await
            .context("Failed to get login code")?
            .ok_or_else(|| ApiError::unauthorized(INVALID_CODE))?;

        if otp.is_expired() || otp.attempts_exhausted(self.config.otp_max_attempts) {
            self.db
                .delete_otp(user.id)
                .await
                .context("Failed to delete login code")?;
            tracing::warn!(user_id = %user.id, "login code expired or exhausted");
            return Err(ApiError::unauthorized(INVALID_CODE));
        }

        if Self::hash_token(&request.code) != otp.code_hash {
            self.db
                .increment_otp_attempts(user.id)
                .await
                .context("Failed to record login code attempt")?;
            tracing::warn!(user_id = %user.id, attempts = otp.attempts + 1, "wrong login code");
            return Err(ApiError::unauthorized(INVALID_CODE));
        }

        self.db
            .delete_otp(user.id)
            .await
            .context("Failed to delete login code")?;

        if !user.is_active() {
            return Err(ApiError::forbidden("Account suspended"));
        }

        self.open_session(user, client).await
    }

    /// Look a user up by email (when the identifier contains `@`) or username.
    async fn find_user(&self, identifier: &str) -> Result<Option<User>, ApiError> {
        let identifier = identifier.trim();
        let user = if identifier.contains('@') {
            self.db.get_user_by_email(&normalize_email(identifier)).await
        } else {
            self.db.get_user_by_username(identifier).await
        };
        Ok(user.context("Failed to get user")?)
    }

    async fn send_login_code(&self, user: &User) -> Result<(), ApiError> {
        let (code, code_hash) = Self::generate_otp();
        let expires_at = Utc::now() + Duration::minutes(self.config.otp_expiry_minutes as i64);

        self.db
            .replace_otp(user.id, &code_hash, expires_at)
            .await
            .context("Failed to store login code")?;

        self.email
            .send_login_code(&user.email, &user.username, &code)
            .await
            .context("Failed to send login code email")?;

        tracing::info!(user_id = %user.id, "login code sent");
        Ok(())
    }

    /// Create a session row and sign a token for it.
    async fn open_session(
        &self,
        user: User,
        client: &ClientInfo,
    ) -> Result<SignedSession, ApiError> {
        let expires_at = Utc::now() + Duration::hours(self.config.session_max_age_hours as i64);

        let session_id = self
            .db
            .create_session(&CreateSessionParams {
                user_id: user.id,
                expires_at,
                user_agent: client.user_agent.as_deref(),
                ip_address: client.ip_address.as_deref(),
            })
            .await
            .context("Failed to create session")?;

        let token = self.tokens.issue(user.id, session_id, user.role)?;

        self.db
            .update_user_last_login(user.id)
            .await
            .context("Failed to update last login")?;

        tracing::info!(
            user_id = %user.id,
            email = %anonymize_email(&user.email),
            ip = client.ip_address.as_deref().unwrap_or("-"),
            "user signed in"
        );

        Ok(SignedSession { token, user })
    }

    // ========== Session Management ==========

    /// Validate a session token and return the authenticated user context.
    pub async fn validate_session(&self, token: &str) -> Result<AuthUser, ApiError> {
        let claims = self
            .tokens
            .verify(token)
            .map_err(|_| ApiError::unauthorized(INVALID_SESSION))?;
        let session_id = claims
            .session_id()
            .map_err(|_| ApiError::unauthorized(INVALID_SESSION))?;

        let session = self
            .db
            .get_session(session_id)
            .await
            .context("Failed to get session")?
            .ok_or_else(|| ApiError::unauthorized(INVALID_SESSION))?;

        if session.is_expired() {
            self.db
                .delete_session(session_id)
                .await
                .context("Failed to delete expired session")?;
            return Err(ApiError::unauthorized(INVALID_SESSION));
        }

        if claims.user_id().ok() != Some(session.user_id) {
            return Err(ApiError::unauthorized(INVALID_SESSION));
        }

        let user = self
            .db
            .get_user_by_id(session.user_id)
            .await
            .context("Failed to get user")?
            .ok_or_else(|| ApiError::unauthorized(INVALID_SESSION))?;

        if !user.is_active() {
            return Err(ApiError::forbidden("Account suspended"));
        }

        if let Err(e) = self.db.touch_session(session_id).await {
            tracing::warn!(session_id = %session_id, error = %e, "failed to touch session");
        }

        Ok(AuthUser {
            user_id: user.id,
            session_id,
            username: user.username,
            email: user.email,
            role: user.role,
            email_verified: user.email_verified,
        })
    }

    /// Sign out - invalidate the session named by the token, if any.
    pub async fn logout(&self, token: &str) -> Result<(), ApiError> {
        let Ok(session_id) = self
            .tokens
            .verify(token)
            .and_then(|claims| claims.session_id())
        else {
            return Ok(());
        };

        self.db
            .delete_session(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Get user by ID.
    pub async fn get_user(&self, user_id: Uuid) -> Result<User, ApiError> {
        self.db
            .get_user_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or_else(|| ApiError::not_found("User not found"))
    }

    // ========== Email Verification ==========

    async fn send_verification_link(&self, user: &User) -> Result<()> {
        let (raw_token, token_hash) = Self::generate_token();
        let expires_at =
            Utc::now() + Duration::hours(self.config.email_verification_expiry_hours as i64);

        self.db
            .create_verification_token(&CreateVerificationTokenParams {
                token_hash: &token_hash,
                user_id: user.id,
                purpose: TokenPurpose::EmailVerification,
                expires_at,
            })
            .await
            .context("Failed to create verification token")?;

        self.email
            .send_email_verification(&user.email, &user.username, &raw_token)
            .await
            .context("Failed to send verification email")
    }

    /// Redeem an emailed token. Fails with 400 unless it exists, has the
    /// expected purpose and is unused and unexpired.
    async fn redeem_token(
        &self,
        raw_token: &str,
        purpose: TokenPurpose,
    ) -> Result<VerificationToken, ApiError> {
        let invalid = || ApiError::bad_request("Invalid or expired token");
        let token_hash = Self::hash_token(raw_token.trim());

        let token = self
            .db
            .get_verification_token(&token_hash)
            .await
            .context("Failed to get verification token")?
            .filter(|t| t.purpose == purpose)
            .ok_or_else(invalid)?;

        if !token.is_valid() {
            tracing::warn!(
                user_id = %token.user_id,
                purpose = purpose.as_str(),
                used = token.used,
                "token expired or already used"
            );
            return Err(invalid());
        }

        // Mark token as used immediately to prevent reuse
        if !self
            .db
            .mark_verification_token_used(&token_hash)
            .await
            .context("Failed to mark token as used")?
        {
            return Err(invalid());
        }

        Ok(token)
    }

    /// Confirm an email address from the emailed link.
    pub async fn verify_email(&self, raw_token: &str) -> Result<(), ApiError> {
        let token = self
            .redeem_token(raw_token, TokenPurpose::EmailVerification)
            .await?;

        self.db
            .set_user_email_verified(token.user_id)
            .await
            .context("Failed to verify email")?;

        tracing::info!(user_id = %token.user_id, "email verified");
        Ok(())
    }

    /// Send a new verification link, replacing outstanding ones.
    pub async fn resend_verification(&self, auth_user: &AuthUser) -> Result<(), ApiError> {
        let user = self.get_user(auth_user.user_id).await?;
        if user.email_verified {
            return Err(ApiError::conflict("Email is already verified"));
        }

        self.db
            .invalidate_user_tokens(user.id, TokenPurpose::EmailVerification)
            .await
            .context("Failed to invalidate old verification tokens")?;

        self.send_verification_link(&user).await?;
        Ok(())
    }

    // ========== Passwords ==========

    /// Email a reset link when an account exists. Never reveals whether it does.
    pub async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        let email = normalize_email(email);
        if !email.validate_email() {
            return Ok(());
        }

        let Some(user) = self
            .db
            .get_user_by_email(&email)
            .await
            .context("Failed to get user")?
        else {
            tracing::info!(email = %anonymize_email(&email), "password reset for unknown email");
            return Ok(());
        };

        if let Err(e) = self.send_reset_link(&user).await {
            tracing::error!(user_id = %user.id, error = ?e, "failed to send password reset");
        }
        Ok(())
    }

    async fn send_reset_link(&self, user: &User) -> Result<()> {
        self.db
            .invalidate_user_tokens(user.id, TokenPurpose::PasswordReset)
            .await
            .context("Failed to invalidate old reset tokens")?;

        let (raw_token, token_hash) = Self::generate_token();
        let expires_at =
            Utc::now() + Duration::minutes(self.config.password_reset_expiry_minutes as i64);

        self.db
            .create_verification_token(&CreateVerificationTokenParams {
                token_hash: &token_hash,
                user_id: user.id,
                purpose: TokenPurpose::PasswordReset,
                expires_at,
            })
            .await
            .context("Failed to create reset token")?;

        self.email
            .send_password_reset(&user.email, &user.username, &raw_token)
            .await
            .context("Failed to send password reset email")?;

        tracing::info!(user_id = %user.id, "password reset requested");
        Ok(())
    }

    /// Set a new password from an emailed reset token and sign out everywhere.
    pub async fn reset_password(&self, request: &ResetPasswordRequest) -> Result<(), ApiError> {
        request.validate()?;

        let token = self
            .redeem_token(&request.token, TokenPurpose::PasswordReset)
            .await?;

        let password_hash = hash_password(&request.new_password)?;
        self.db
            .set_user_password_hash(token.user_id, &password_hash)
            .await
            .context("Failed to update password")?;

        let revoked = self
            .db
            .delete_user_sessions(token.user_id)
            .await
            .context("Failed to revoke sessions")?;

        tracing::info!(user_id = %token.user_id, revoked_sessions = revoked, "password reset");
        Ok(())
    }

    /// Change the password of a signed-in user.
    pub async fn change_password(
        &self,
        auth_user: &AuthUser,
        request: &ChangePasswordRequest,
    ) -> Result<(), ApiError> {
        request.validate()?;
        let user = self.get_user(auth_user.user_id).await?;

        if !verify_password(&request.current_password, &user.password_hash)? {
            return Err(ApiError::unauthorized("Current password is incorrect"));
        }

        let password_hash = hash_password(&request.new_password)?;
        self.db
            .set_user_password_hash(user.id, &password_hash)
            .await
            .context("Failed to update password")?;

        tracing::info!(user_id = %user.id, "password changed");
        Ok(())
    }

    /// Turn emailed login codes on or off. Requires the current password.
    pub async fn set_two_factor(
        &self,
        auth_user: &AuthUser,
        enabled: bool,
        password: &str,
    ) -> Result<User, ApiError> {
        let user = self.get_user(auth_user.user_id).await?;

        if !verify_password(password, &user.password_hash)? {
            return Err(ApiError::unauthorized("Password is incorrect"));
        }

        self.db
            .set_user_two_factor(user.id, enabled)
            .await
            .context("Failed to update two-factor setting")?;

        tracing::info!(user_id = %user.id, enabled, "two-factor setting changed");
        self.get_user(user.id).await
    }

    // ========== Admin Account Management ==========

    pub async fn list_users(
        &self,
        role: Option<UserRole>,
        status: Option<UserStatus>,
    ) -> Result<Vec<User>, ApiError> {
        Ok(self
            .db
            .list_users(role, status)
            .await
            .context("Failed to list users")?)
    }

    /// Change another user's role.
    pub async fn update_user_role(
        &self,
        admin: &AuthUser,
        user_id: Uuid,
        role: UserRole,
    ) -> Result<User, ApiError> {
        if admin.user_id == user_id {
            return Err(ApiError::conflict("You can't change your own role"));
        }

        if !self
            .db
            .set_user_role(user_id, role)
            .await
            .context("Failed to update role")?
        {
            return Err(ApiError::not_found("User not found"));
        }

        tracing::info!(
            admin_id = %admin.user_id,
            user_id = %user_id,
            role = role.as_str(),
            "user role changed"
        );
        self.get_user(user_id).await
    }

    /// Suspend or reactivate another user. Suspension ends all their sessions.
    pub async fn update_user_status(
        &self,
        admin: &AuthUser,
        user_id: Uuid,
        status: UserStatus,
    ) -> Result<User, ApiError> {
        if admin.user_id == user_id {
            return Err(ApiError::conflict("You can't change your own status"));
        }

        if !self
            .db
            .set_user_status(user_id, status)
            .await
            .context("Failed to update status")?
        {
            return Err(ApiError::not_found("User not found"));
        }

        if status == UserStatus::Suspended {
            self.db
                .delete_user_sessions(user_id)
                .await
                .context("Failed to revoke sessions")?;
        }

        tracing::info!(
            admin_id = %admin.user_id,
            user_id = %user_id,
            status = status.as_str(),
            "user status changed"
        );
        self.get_user(user_id).await
    }

    /// Delete another user together with everything they own.
    pub async fn delete_user(&self, admin: &AuthUser, user_id: Uuid) -> Result<(), ApiError> {
        if admin.user_id == user_id {
            return Err(ApiError::conflict("You can't delete yourself"));
        }

        if !self
            .db
            .delete_user(user_id)
            .await
            .context("Failed to delete user")?
        {
            return Err(ApiError::not_found("User not found"));
        }

        tracing::info!(admin_id = %admin.user_id, user_id = %user_id, "user deleted");
        Ok(())
    }
}

/// Reject a request unless the caller is an admin.
pub fn require_admin(user: &AuthUser) -> Result<(), ApiError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Admin access required"))
    }
}
