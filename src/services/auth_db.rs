// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Database operations for authentication: users, sessions, one-time codes
//! and emailed verification tokens.

use crate::models::auth::{
    OtpCode, Session, TokenPurpose, User, UserRole, UserStatus, VerificationToken,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, username, email, password_hash, full_name, role, status, \
     email_verified, two_factor_enabled, created_at, updated_at, last_login_at";

/// Parameters for creating a user.
pub struct CreateUserParams<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub full_name: &'a str,
    pub role: UserRole,
    pub email_verified: bool,
}

/// Parameters for creating a session.
pub struct CreateSessionParams<'a> {
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<&'a str>,
    pub ip_address: Option<&'a str>,
}

/// Parameters for creating an emailed verification token.
pub struct CreateVerificationTokenParams<'a> {
    pub token_hash: &'a str,
    pub user_id: Uuid,
    pub purpose: TokenPurpose,
    pub expires_at: DateTime<Utc>,
}

/// Authentication database client.
#[derive(Clone)]
pub struct AuthDbClient {
    pub pool: PgPool,
}

fn decode_error(column: &str, value: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unexpected value '{value}'").into(),
    }
}

fn parse_user_row(row: &PgRow) -> Result<User, sqlx::Error> {
    let role: String = row.try_get("role")?;
    let status: String = row.try_get("status")?;

    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        full_name: row.try_get("full_name")?,
        role: UserRole::parse(&role).ok_or_else(|| decode_error("role", &role))?,
        status: UserStatus::parse(&status).ok_or_else(|| decode_error("status", &status))?,
        email_verified: row.try_get("email_verified")?,
        two_factor_enabled: row.try_get("two_factor_enabled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_login_at: row.try_get("last_login_at")?,
    })
}

impl AuthDbClient {
    /// Create a new auth database client.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ========== User Operations ==========

    /// Create a new user and return it.
    pub async fn create_user(&self, params: &CreateUserParams<'_>) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (id, username, email, password_hash, full_name, role, email_verified)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {USER_COLUMNS}"
        );

        let row = sqlx::query(&query)
            .bind(Uuid::now_v7())
            .bind(params.username)
            .bind(params.email)
            .bind(params.password_hash)
            .bind(params.full_name)
            .bind(params.role.as_str())
            .bind(params.email_verified)
            .fetch_one(&self.pool)
            .await?;

        parse_user_row(&row)
    }

    /// Get a user by email.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_user_row).transpose()
    }

    /// Get a user by username.
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        let row = sqlx::query(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_user_row).transpose()
    }

    /// Get a user by ID.
    pub async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_user_row).transpose()
    }

    /// List users, newest first, optionally filtered by role and status.
    pub async fn list_users(
        &self,
        role: Option<UserRole>,
        status: Option<UserStatus>,
    ) -> Result<Vec<User>, sqlx::Error> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE ($1::TEXT IS NULL OR role = $1)
               AND ($2::TEXT IS NULL OR status = $2)
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(role.map(|r| r.as_str()))
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(parse_user_row).collect()
    }

    /// Update user's last login time.
    pub async fn update_user_last_login(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET last_login_at = now(), updated_at = now() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark user's email as verified.
    pub async fn set_user_email_verified(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET email_verified = TRUE, updated_at = now() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_user_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_user_two_factor(
        &self,
        user_id: Uuid,
        enabled: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET two_factor_enabled = $2, updated_at = now() WHERE id = $1")
            .bind(user_id)
            .bind(enabled)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns false when no user has the given id.
    pub async fn set_user_role(&self, user_id: Uuid, role: UserRole) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET role = $2, updated_at = now() WHERE id = $1")
            .bind(user_id)
            .bind(role.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns false when no user has the given id.
    pub async fn set_user_status(
        &self,
        user_id: Uuid,
        status: UserStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET status = $2, updated_at = now() WHERE id = $1")
            .bind(user_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a user. Sessions, codes, tokens, applications and messages go with it.
    pub async fn delete_user(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========== Session Operations ==========

    /// Create a new session and return its id.
    pub async fn create_session(
        &self,
        params: &CreateSessionParams<'_>,
    ) -> Result<Uuid, sqlx::Error> {
        let session_id = Uuid::now_v7();

        sqlx::query(
            "INSERT INTO sessions (id, user_id, expires_at, user_agent, ip_address)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(session_id)
        .bind(params.user_id)
        .bind(params.expires_at)
        .bind(params.user_agent)
        .bind(params.ip_address)
        .execute(&self.pool)
        .await?;

        Ok(session_id)
    }

    /// Get a session by id.
    pub async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, user_id, created_at, expires_at, last_active_at, user_agent, ip_address
             FROM sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Session {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
            last_active_at: row.try_get("last_active_at")?,
            user_agent: row.try_get("user_agent")?,
            ip_address: row.try_get("ip_address")?,
        }))
    }

    /// Delete a session.
    pub async fn delete_session(&self, session_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete all sessions for a user.
    pub async fn delete_user_sessions(&self, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Update session's last active time.
    pub async fn touch_session(&self, session_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE sessions SET last_active_at = now() WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========== One-Time Code Operations ==========

    /// Store a new code for the user, replacing any previous one.
    pub async fn replace_otp(
        &self,
        user_id: Uuid,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO otp_codes (user_id, code_hash, attempts, expires_at, created_at)
             VALUES ($1, $2, 0, $3, now())
             ON CONFLICT (user_id) DO UPDATE
             SET code_hash = EXCLUDED.code_hash, attempts = 0,
                 expires_at = EXCLUDED.expires_at, created_at = EXCLUDED.created_at",
        )
        .bind(user_id)
        .bind(code_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_otp(&self, user_id: Uuid) -> Result<Option<OtpCode>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT user_id, code_hash, attempts, expires_at, created_at
             FROM otp_codes WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(OtpCode {
            user_id: row.try_get("user_id")?,
            code_hash: row.try_get("code_hash")?,
            attempts: row.try_get("attempts")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
        }))
    }

    pub async fn increment_otp_attempts(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE otp_codes SET attempts = attempts + 1 WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_otp(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM otp_codes WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========== Verification Token Operations ==========

    pub async fn create_verification_token(
        &self,
        params: &CreateVerificationTokenParams<'_>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO verification_tokens (token_hash, user_id, purpose, expires_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(params.token_hash)
        .bind(params.user_id)
        .bind(params.purpose.as_str())
        .bind(params.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_verification_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<VerificationToken>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT token_hash, user_id, purpose, expires_at, used, created_at
             FROM verification_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let purpose: String = row.try_get("purpose")?;
        Ok(Some(VerificationToken {
            token_hash: row.try_get("token_hash")?,
            user_id: row.try_get("user_id")?,
            purpose: TokenPurpose::parse(&purpose)
                .ok_or_else(|| decode_error("purpose", &purpose))?,
            expires_at: row.try_get("expires_at")?,
            used: row.try_get("used")?,
            created_at: row.try_get("created_at")?,
        }))
    }

    /// Mark a token used. Returns false if it was already used, so two
    /// concurrent redemptions cannot both succeed.
    pub async fn mark_verification_token_used(
        &self,
        token_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE verification_tokens SET used = TRUE WHERE token_hash = $1 AND used = FALSE",
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Invalidate outstanding tokens of one purpose for a user.
    pub async fn invalidate_user_tokens(
        &self,
        user_id: Uuid,
        purpose: TokenPurpose,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE verification_tokens SET used = TRUE
             WHERE user_id = $1 AND purpose = $2 AND used = FALSE",
        )
        .bind(user_id)
        .bind(purpose.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    // Tests run against DATABASE_URL with migrations applied
    async fn create_test_client() -> AuthDbClient {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&url).await.expect("Failed to connect to Postgres");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");
        AuthDbClient::new(pool)
    }

    async fn create_test_user(client: &AuthDbClient) -> User {
        let suffix = Uuid::now_v7().simple().to_string();
        let username = format!("u{}", &suffix[suffix.len() - 12..]);
        let email = format!("{username}@example.com");
        client
            .create_user(&CreateUserParams {
                username: &username,
                email: &email,
                password_hash: "$argon2id$placeholder",
                full_name: "Test User",
                role: UserRole::Applicant,
                email_verified: false,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires Postgres
    async fn test_create_and_get_user() {
        let client = create_test_client().await;
        let user = create_test_user(&client).await;

        let by_email = client.get_user_by_email(&user.email).await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        assert_eq!(by_email.role, UserRole::Applicant);
        assert_eq!(by_email.status, UserStatus::Active);
        assert!(!by_email.email_verified);

        let by_username = client
            .get_user_by_username(&user.username)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_username.id, user.id);

        client.delete_user(user.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Postgres
    async fn test_duplicate_email_is_unique_violation() {
        let client = create_test_client().await;
        let user = create_test_user(&client).await;

        let err = client
            .create_user(&CreateUserParams {
                username: "someone_else",
                email: &user.email,
                password_hash: "$argon2id$placeholder",
                full_name: "",
                role: UserRole::Applicant,
                email_verified: false,
            })
            .await
            .unwrap_err();
        assert!(crate::error::is_unique_violation(&err));

        client.delete_user(user.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Postgres
    async fn test_session_lifecycle() {
        let client = create_test_client().await;
        let user = create_test_user(&client).await;

        let session_id = client
            .create_session(&CreateSessionParams {
                user_id: user.id,
                expires_at: Utc::now() + Duration::hours(1),
                user_agent: Some("test-agent"),
                ip_address: None,
            })
            .await
            .unwrap();

        let session = client.get_session(session_id).await.unwrap().unwrap();
        assert_eq!(session.user_id, user.id);
        assert!(!session.is_expired());

        assert_eq!(client.delete_user_sessions(user.id).await.unwrap(), 1);
        assert!(client.get_session(session_id).await.unwrap().is_none());

        client.delete_user(user.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Postgres
    async fn test_otp_replace_resets_attempts() {
        let client = create_test_client().await;
        let user = create_test_user(&client).await;
        let expires_at = Utc::now() + Duration::minutes(10);

        client.replace_otp(user.id, "first", expires_at).await.unwrap();
        client.increment_otp_attempts(user.id).await.unwrap();
        assert_eq!(client.get_otp(user.id).await.unwrap().unwrap().attempts, 1);

        client.replace_otp(user.id, "second", expires_at).await.unwrap();
        let otp = client.get_otp(user.id).await.unwrap().unwrap();
        assert_eq!(otp.code_hash, "second");
        assert_eq!(otp.attempts, 0);

        client.delete_otp(user.id).await.unwrap();
        assert!(client.get_otp(user.id).await.unwrap().is_none());

        client.delete_user(user.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Postgres
    async fn test_verification_token_single_use() {
        let client = create_test_client().await;
        let user = create_test_user(&client).await;
        let token_hash = format!("hash-{}", Uuid::now_v7());

        client
            .create_verification_token(&CreateVerificationTokenParams {
                token_hash: &token_hash,
                user_id: user.id,
                purpose: TokenPurpose::PasswordReset,
                expires_at: Utc::now() + Duration::hours(1),
            })
            .await
            .unwrap();

        let token = client
            .get_verification_token(&token_hash)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.purpose, TokenPurpose::PasswordReset);
        assert!(token.is_valid());

        assert!(client.mark_verification_token_used(&token_hash).await.unwrap());
        assert!(!client.mark_verification_token_used(&token_hash).await.unwrap());

        client.delete_user(user.id).await.unwrap();
    }
}
