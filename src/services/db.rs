// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

use crate::models::application::{Application, ApplicationRequest, ApplicationStatus};
use crate::models::message::Message;
use crate::models::settings::PortalSettings;
use crate::services::config::env_or;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::env;
use std::time::Duration;
use uuid::Uuid;

const APPLICATION_COLUMNS: &str = "id, user_id, title, summary, description, category, \
     requested_amount, status, score, reviewer_notes, submitted_at, reviewed_at, reviewed_by, \
     created_at, updated_at";

/// Postgres connection settings.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DbConfig {
    /// Load database configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
        })
    }

    /// Open the connection pool and apply pending migrations.
    pub async fn connect(&self) -> Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&self.url)
            .await
            .context("Failed to connect to Postgres")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;

        Ok(pool)
    }
}

/// Parameters for storing a message to an applicant.
pub struct CreateMessageParams<'a> {
    pub recipient_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub application_id: Option<Uuid>,
    pub subject: &'a str,
    pub body: &'a str,
}

/// Parameters for a review change made by an admin.
pub struct ReviewUpdateParams<'a> {
    pub application_id: Uuid,
    /// Status the application must still be in; guards concurrent reviews
    pub expected_status: ApplicationStatus,
    pub new_status: ApplicationStatus,
    pub score: Option<i32>,
    pub reviewer_notes: Option<&'a str>,
    pub reviewer_id: Uuid,
}

/// Parameters for updating portal settings.
pub struct UpdateSettingsParams {
    pub submissions_open: bool,
    pub submission_deadline: Option<DateTime<Utc>>,
    pub max_requested_amount: Option<i64>,
    pub updated_by: Uuid,
}

/// Postgres client for applications, messages and portal settings.
#[derive(Clone)]
pub struct PortalDb {
    pool: PgPool,
}

fn parse_application_row(row: &PgRow) -> Result<Application, sqlx::Error> {
    let status: String = row.try_get("status")?;

    Ok(Application {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        summary: row.try_get("summary")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        requested_amount: row.try_get("requested_amount")?,
        status: ApplicationStatus::parse(&status).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "status".to_string(),
            source: format!("unexpected value '{status}'").into(),
        })?,
        score: row.try_get("score")?,
        reviewer_notes: row.try_get("reviewer_notes")?,
        submitted_at: row.try_get("submitted_at")?,
        reviewed_at: row.try_get("reviewed_at")?,
        reviewed_by: row.try_get("reviewed_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_message_row(row: &PgRow) -> Result<Message, sqlx::Error> {
    Ok(Message {
        id: row.try_get("id")?,
        recipient_id: row.try_get("recipient_id")?,
        sender_id: row.try_get("sender_id")?,
        application_id: row.try_get("application_id")?,
        subject: row.try_get("subject")?,
        body: row.try_get("body")?,
        read: row.try_get("read")?,
        created_at: row.try_get("created_at")?,
    })
}

fn parse_settings_row(row: &PgRow) -> Result<PortalSettings, sqlx::Error> {
    Ok(PortalSettings {
        submissions_open: row.try_get("submissions_open")?,
        submission_deadline: row.try_get("submission_deadline")?,
        max_requested_amount: row.try_get("max_requested_amount")?,
        updated_at: row.try_get("updated_at")?,
        updated_by: row.try_get("updated_by")?,
    })
}

impl PortalDb {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Round-trip a trivial query to check the database is reachable.
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    // ========== Applications ==========

    /// Create a draft application owned by `user_id`.
    pub async fn create_application(
        &self,
        user_id: Uuid,
        request: &ApplicationRequest,
    ) -> Result<Application, sqlx::Error> {
        let query = format!(
            "INSERT INTO applications
                 (id, user_id, title, summary, description, category, requested_amount)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {APPLICATION_COLUMNS}"
        );

        let row = sqlx::query(&query)
            .bind(Uuid::now_v7())
            .bind(user_id)
            .bind(request.title.trim())
            .bind(&request.summary)
            .bind(&request.description)
            .bind(request.category.as_deref())
            .bind(request.requested_amount)
            .fetch_one(&self.pool)
            .await?;

        parse_application_row(&row)
    }

    pub async fn get_application(&self, id: Uuid) -> Result<Option<Application>, sqlx::Error> {
        let query = format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_application_row).transpose()
    }

    /// Applications owned by one user, newest first.
    pub async fn list_user_applications(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Application>, sqlx::Error> {
        let query = format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications
             WHERE user_id = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(parse_application_row).collect()
    }

    /// All applications, optionally filtered by status. Drafts are included
    /// only when asked for explicitly.
    pub async fn list_applications(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<Application>, sqlx::Error> {
        let query = format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications
             WHERE ($1::TEXT IS NULL AND status <> 'draft') OR status = $1
             ORDER BY submitted_at DESC NULLS LAST, created_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(parse_application_row).collect()
    }

    /// Replace the applicant-editable fields of a draft. Returns `None` when
    /// the application no longer exists or has left the draft state.
    pub async fn update_draft(
        &self,
        id: Uuid,
        request: &ApplicationRequest,
    ) -> Result<Option<Application>, sqlx::Error> {
        let query = format!(
            "UPDATE applications
             SET title = $2, summary = $3, description = $4, category = $5,
                 requested_amount = $6, updated_at = now()
             WHERE id = $1 AND status = 'draft'
             RETURNING {APPLICATION_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(request.title.trim())
            .bind(&request.summary)
            .bind(&request.description)
            .bind(request.category.as_deref())
            .bind(request.requested_amount)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_application_row).transpose()
    }

    /// Delete a draft. Returns false if it is gone or no longer a draft.
    pub async fn delete_draft(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM applications WHERE id = $1 AND status = 'draft'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a draft to submitted.
    pub async fn submit_draft(&self, id: Uuid) -> Result<Option<Application>, sqlx::Error> {
        let query = format!(
            "UPDATE applications
             SET status = 'submitted', submitted_at = now(), updated_at = now()
             WHERE id = $1 AND status = 'draft'
             RETURNING {APPLICATION_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_application_row).transpose()
    }

    /// Apply a review change. Returns `None` if the application is not in
    /// `expected_status` any more.
    pub async fn apply_review(
        &self,
        params: &ReviewUpdateParams<'_>,
    ) -> Result<Option<Application>, sqlx::Error> {
        // Returning to draft clears the submission timestamp so the applicant
        // can edit and resubmit. Only a decision records the reviewer.
        let query = format!(
            "UPDATE applications
             SET status = $3,
                 score = COALESCE($4, score),
                 reviewer_notes = COALESCE($5, reviewer_notes),
                 reviewed_by = CASE WHEN $3 IN ('accepted', 'rejected')
                                    THEN $6 ELSE reviewed_by END,
                 reviewed_at = CASE WHEN $3 IN ('accepted', 'rejected')
                                    THEN now() ELSE reviewed_at END,
                 submitted_at = CASE WHEN $3 = 'draft' THEN NULL ELSE submitted_at END,
                 updated_at = now()
             WHERE id = $1 AND status = $2
             RETURNING {APPLICATION_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(params.application_id)
            .bind(params.expected_status.as_str())
            .bind(params.new_status.as_str())
            .bind(params.score)
            .bind(params.reviewer_notes)
            .bind(params.reviewer_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_application_row).transpose()
    }

    // ========== Messages ==========

    pub async fn create_message(
        &self,
        params: &CreateMessageParams<'_>,
    ) -> Result<Message, sqlx::Error> {
        let row = sqlx::query(
            "INSERT INTO messages (id, recipient_id, sender_id, application_id, subject, body)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, recipient_id, sender_id, application_id, subject, body, read,
                       created_at",
        )
        .bind(Uuid::now_v7())
        .bind(params.recipient_id)
        .bind(params.sender_id)
        .bind(params.application_id)
        .bind(params.subject)
        .bind(params.body)
        .fetch_one(&self.pool)
        .await?;

        parse_message_row(&row)
    }

    /// Messages addressed to a user, newest first.
    pub async fn list_messages(&self, recipient_id: Uuid) -> Result<Vec<Message>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, recipient_id, sender_id, application_id, subject, body, read, created_at
             FROM messages WHERE recipient_id = $1
             ORDER BY created_at DESC",
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_message_row).collect()
    }

    /// Returns false when the message does not exist or belongs to someone else.
    pub async fn mark_message_read(
        &self,
        id: Uuid,
        recipient_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE messages SET read = TRUE WHERE id = $1 AND recipient_id = $2")
                .bind(id)
                .bind(recipient_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========== Settings ==========

    pub async fn get_settings(&self) -> Result<PortalSettings, sqlx::Error> {
        let row = sqlx::query(
            "SELECT submissions_open, submission_deadline, max_requested_amount, updated_at,
                    updated_by
             FROM portal_settings WHERE id = 1",
        )
        .fetch_one(&self.pool)
        .await?;
        parse_settings_row(&row)
    }

    pub async fn update_settings(
        &self,
        params: &UpdateSettingsParams,
    ) -> Result<PortalSettings, sqlx::Error> {
        let row = sqlx::query(
            "UPDATE portal_settings
             SET submissions_open = $1, submission_deadline = $2, max_requested_amount = $3,
                 updated_by = $4, updated_at = now()
             WHERE id = 1
             RETURNING submissions_open, submission_deadline, max_requested_amount, updated_at,
                       updated_by",
        )
        .bind(params.submissions_open)
        .bind(params.submission_deadline)
        .bind(params.max_requested_amount)
        .bind(params.updated_by)
        .fetch_one(&self.pool)
        .await?;
        parse_settings_row(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::UserRole;
    use crate::services::auth_db::{AuthDbClient, CreateUserParams};

    async fn create_test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&url).await.expect("Failed to connect to Postgres");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    async fn create_owner(pool: &PgPool) -> Uuid {
        let suffix = Uuid::now_v7().simple().to_string();
        let username = format!("o{}", &suffix[suffix.len() - 12..]);
        let email = format!("{username}@example.com");
        AuthDbClient::new(pool.clone())
            .create_user(&CreateUserParams {
                username: &username,
                email: &email,
                password_hash: "$argon2id$placeholder",
                full_name: "",
                role: UserRole::Applicant,
                email_verified: true,
            })
            .await
            .unwrap()
            .id
    }

    fn draft_request() -> ApplicationRequest {
        ApplicationRequest {
            title: "  Community garden  ".to_string(),
            summary: "Raised beds for the east side".to_string(),
            description: String::new(),
            category: Some("environment".to_string()),
            requested_amount: 4_500,
        }
    }

    #[tokio::test]
    #[ignore] // Requires Postgres
    async fn test_draft_submit_and_review() {
        let pool = create_test_pool().await;
        let db = PortalDb::new(pool.clone());
        let owner = create_owner(&pool).await;

        let app = db.create_application(owner, &draft_request()).await.unwrap();
        assert_eq!(app.status, ApplicationStatus::Draft);
        assert_eq!(app.title, "Community garden");

        let submitted = db.submit_draft(app.id).await.unwrap().unwrap();
        assert_eq!(submitted.status, ApplicationStatus::Submitted);
        assert!(submitted.submitted_at.is_some());

        // Already submitted: neither editable nor submittable again
        assert!(db.submit_draft(app.id).await.unwrap().is_none());
        assert!(db.update_draft(app.id, &draft_request()).await.unwrap().is_none());
        assert!(!db.delete_draft(app.id).await.unwrap());

        let reviewed = db
            .apply_review(&ReviewUpdateParams {
                application_id: app.id,
                expected_status: ApplicationStatus::Submitted,
                new_status: ApplicationStatus::UnderReview,
                score: Some(72),
                reviewer_notes: Some("clear budget"),
                reviewer_id: owner,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reviewed.status, ApplicationStatus::UnderReview);
        assert_eq!(reviewed.score, Some(72));
        assert!(reviewed.reviewed_at.is_none());
        assert!(reviewed.reviewed_by.is_none());

        let accepted = db
            .apply_review(&ReviewUpdateParams {
                application_id: app.id,
                expected_status: ApplicationStatus::UnderReview,
                new_status: ApplicationStatus::Accepted,
                score: None,
                reviewer_notes: None,
                reviewer_id: owner,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(accepted.score, Some(72));
        assert_eq!(accepted.reviewer_notes.as_deref(), Some("clear budget"));
        assert!(accepted.reviewed_at.is_some());
        assert_eq!(accepted.reviewed_by, Some(owner));

        AuthDbClient::new(pool).delete_user(owner).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Postgres
    async fn test_messages_are_scoped_to_recipient() {
        let pool = create_test_pool().await;
        let db = PortalDb::new(pool.clone());
        let recipient = create_owner(&pool).await;
        let other = create_owner(&pool).await;

        let message = db
            .create_message(&CreateMessageParams {
                recipient_id: recipient,
                sender_id: None,
                application_id: None,
                subject: "Hello",
                body: "Welcome to the portal",
            })
            .await
            .unwrap();
        assert!(!message.read);

        assert!(!db.mark_message_read(message.id, other).await.unwrap());
        assert!(db.mark_message_read(message.id, recipient).await.unwrap());
        assert!(db.list_messages(recipient).await.unwrap()[0].read);
        assert!(db.list_messages(other).await.unwrap().is_empty());

        let auth_db = AuthDbClient::new(pool);
        auth_db.delete_user(recipient).await.unwrap();
        auth_db.delete_user(other).await.unwrap();
    }
}
