// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Application lifecycle: applicant drafts and submissions, admin review,
//! scoring and notices, plus the portal settings that gate submissions.

use crate::error::ApiError;
use crate::models::application::{
    Application, ApplicationRequest, ApplicationStatus, NotifyRequest, ScoreRequest,
};
use crate::models::auth::AuthUser;
use crate::models::message::Message;
use crate::models::settings::{PortalSettings, UpdateSettingsRequest};
use crate::services::auth_db::AuthDbClient;
use crate::services::db::{CreateMessageParams, PortalDb, ReviewUpdateParams, UpdateSettingsParams};
use crate::services::email::EmailService;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

const NOT_FOUND: &str = "Application not found";

/// Check a submission against the portal settings at time `now`.
pub fn check_submission_allowed(
    settings: &PortalSettings,
    requested_amount: i64,
    now: DateTime<Utc>,
) -> Result<(), ApiError> {
    if !settings.submissions_open {
        return Err(ApiError::forbidden("Submissions are closed"));
    }
    if !settings.accepts_submissions_at(now) {
        return Err(ApiError::forbidden("The submission deadline has passed"));
    }
    if let Some(max) = settings.max_requested_amount {
        if requested_amount > max {
            return Err(ApiError::bad_request(format!(
                "Requested amount exceeds the maximum of {max}"
            )));
        }
    }
    Ok(())
}

/// Status an application moves to when scored.
pub fn status_after_scoring(current: ApplicationStatus) -> Result<ApplicationStatus, ApiError> {
    if current.can_be_scored() {
        Ok(ApplicationStatus::UnderReview)
    } else {
        Err(ApiError::conflict(format!(
            "Applications in status '{current}' can't be scored"
        )))
    }
}

/// Applications, messages and settings.
pub struct ApplicationService {
    db: PortalDb,
    users: AuthDbClient,
    email: Arc<EmailService>,
}

impl ApplicationService {
    pub fn new(db: PortalDb, users: AuthDbClient, email: Arc<EmailService>) -> Self {
        Self { db, users, email }
    }

    pub async fn ping(&self) -> bool {
        self.db.ping().await
    }

    async fn load(&self, id: Uuid) -> Result<Application, ApiError> {
        self.db
            .get_application(id)
            .await
            .context("Failed to get application")?
            .ok_or_else(|| ApiError::not_found(NOT_FOUND))
    }

    /// Load an application owned by `user`. Someone else's is reported as
    /// missing, not forbidden.
    async fn load_owned(&self, user: &AuthUser, id: Uuid) -> Result<Application, ApiError> {
        let app = self.load(id).await?;
        if app.user_id != user.user_id {
            return Err(ApiError::not_found(NOT_FOUND));
        }
        Ok(app)
    }

    // ========== Applicant ==========

    pub async fn create(
        &self,
        user: &AuthUser,
        request: &ApplicationRequest,
    ) -> Result<Application, ApiError> {
        request.validate()?;

        let app = self
            .db
            .create_application(user.user_id, request)
            .await
            .context("Failed to create application")?;

        tracing::info!(user_id = %user.user_id, application_id = %app.id, "draft created");
        Ok(app)
    }

    pub async fn list_own(&self, user: &AuthUser) -> Result<Vec<Application>, ApiError> {
        Ok(self
            .db
            .list_user_applications(user.user_id)
            .await
            .context("Failed to list applications")?)
    }

    pub async fn get_own(&self, user: &AuthUser, id: Uuid) -> Result<Application, ApiError> {
        self.load_owned(user, id).await
    }

    /// Update a draft. Anything past draft is locked.
    pub async fn update(
        &self,
        user: &AuthUser,
        id: Uuid,
        request: &ApplicationRequest,
    ) -> Result<Application, ApiError> {
        request.validate()?;
        let app = self.load_owned(user, id).await?;
        if !app.status.is_editable() {
            return Err(ApiError::conflict("Only drafts can be edited"));
        }

        self.db
            .update_draft(id, request)
            .await
            .context("Failed to update application")?
            .ok_or_else(|| ApiError::conflict("Only drafts can be edited"))
    }

    pub async fn delete(&self, user: &AuthUser, id: Uuid) -> Result<(), ApiError> {
        let app = self.load_owned(user, id).await?;
        if !app.status.is_editable() {
            return Err(ApiError::conflict("Only drafts can be deleted"));
        }

        if !self
            .db
            .delete_draft(id)
            .await
            .context("Failed to delete application")?
        {
            return Err(ApiError::conflict("Only drafts can be deleted"));
        }

        tracing::info!(user_id = %user.user_id, application_id = %id, "draft deleted");
        Ok(())
    }

    /// Submit a draft for review.
    pub async fn submit(&self, user: &AuthUser, id: Uuid) -> Result<Application, ApiError> {
        if !user.email_verified {
            return Err(ApiError::forbidden(
                "Verify your email address before submitting",
            ));
        }

        let app = self.load_owned(user, id).await?;
        if app.status != ApplicationStatus::Draft {
            return Err(ApiError::conflict("Application has already been submitted"));
        }

        let settings = self.settings().await?;
        check_submission_allowed(&settings, app.requested_amount, Utc::now())?;

        let submitted = self
            .db
            .submit_draft(id)
            .await
            .context("Failed to submit application")?
            .ok_or_else(|| ApiError::conflict("Application has already been submitted"))?;

        tracing::info!(user_id = %user.user_id, application_id = %id, "application submitted");
        Ok(submitted)
    }

    // ========== Admin ==========

    pub async fn list_all(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<Application>, ApiError> {
        Ok(self
            .db
            .list_applications(status)
            .await
            .context("Failed to list applications")?)
    }

    pub async fn get_any(&self, id: Uuid) -> Result<Application, ApiError> {
        self.load(id).await
    }

    /// Move an application along the review workflow.
    pub async fn change_status(
        &self,
        admin: &AuthUser,
        id: Uuid,
        next: ApplicationStatus,
        reviewer_notes: Option<&str>,
    ) -> Result<Application, ApiError> {
        let app = self.load(id).await?;
        if !app.status.can_transition_to(next) {
            return Err(ApiError::conflict(format!(
                "Can't move an application from '{}' to '{}'",
                app.status, next
            )));
        }

        let updated = self
            .db
            .apply_review(&ReviewUpdateParams {
                application_id: id,
                expected_status: app.status,
                new_status: next,
                score: None,
                reviewer_notes,
                reviewer_id: admin.user_id,
            })
            .await
            .context("Failed to update application status")?
            .ok_or_else(|| ApiError::conflict("Application was changed concurrently"))?;

        tracing::info!(
            admin_id = %admin.user_id,
            application_id = %id,
            from = app.status.as_str(),
            to = next.as_str(),
            "application status changed"
        );
        Ok(updated)
    }

    /// Score an application. A submitted one moves to under review.
    pub async fn score(
        &self,
        admin: &AuthUser,
        id: Uuid,
        request: &ScoreRequest,
    ) -> Result<Application, ApiError> {
        request.validate()?;
        let app = self.load(id).await?;
        let next = status_after_scoring(app.status)?;

        let updated = self
            .db
            .apply_review(&ReviewUpdateParams {
                application_id: id,
                expected_status: app.status,
                new_status: next,
                score: Some(request.score),
                reviewer_notes: request.reviewer_notes.as_deref(),
                reviewer_id: admin.user_id,
            })
            .await
            .context("Failed to score application")?
            .ok_or_else(|| ApiError::conflict("Application was changed concurrently"))?;

        tracing::info!(
            admin_id = %admin.user_id,
            application_id = %id,
            score = request.score,
            "application scored"
        );
        Ok(updated)
    }

    /// Store a message for the applicant and email it. An email failure is
    /// logged; the stored message stands.
    pub async fn notify(
        &self,
        admin: &AuthUser,
        id: Uuid,
        request: &NotifyRequest,
    ) -> Result<Message, ApiError> {
        request.validate()?;
        let (subject, body) = (request.subject.trim(), request.body.trim());
        let app = self.load(id).await?;

        let applicant = self
            .users
            .get_user_by_id(app.user_id)
            .await
            .context("Failed to get applicant")?
            .ok_or_else(|| ApiError::not_found("Applicant not found"))?;

        let message = self
            .db
            .create_message(&CreateMessageParams {
                recipient_id: applicant.id,
                sender_id: Some(admin.user_id),
                application_id: Some(app.id),
                subject,
                body,
            })
            .await
            .context("Failed to store message")?;

        if let Err(e) = self
            .email
            .send_application_notice(
                &applicant.email,
                &applicant.username,
                &app.title,
                subject,
                body,
            )
            .await
        {
            tracing::error!(
                application_id = %app.id,
                message_id = %message.id,
                error = ?e,
                "failed to email application notice"
            );
        }

        tracing::info!(
            admin_id = %admin.user_id,
            application_id = %app.id,
            message_id = %message.id,
            "applicant notified"
        );
        Ok(message)
    }

    // ========== Messages ==========

    pub async fn messages(&self, user: &AuthUser) -> Result<Vec<Message>, ApiError> {
        Ok(self
            .db
            .list_messages(user.user_id)
            .await
            .context("Failed to list messages")?)
    }

    pub async fn mark_message_read(&self, user: &AuthUser, id: Uuid) -> Result<(), ApiError> {
        if !self
            .db
            .mark_message_read(id, user.user_id)
            .await
            .context("Failed to mark message read")?
        {
            return Err(ApiError::not_found("Message not found"));
        }
        Ok(())
    }

    // ========== Settings ==========

    pub async fn settings(&self) -> Result<PortalSettings, ApiError> {
        Ok(self
            .db
            .get_settings()
            .await
            .context("Failed to get portal settings")?)
    }

    pub async fn update_settings(
        &self,
        admin: &AuthUser,
        request: &UpdateSettingsRequest,
    ) -> Result<PortalSettings, ApiError> {
        request.validate()?;
        let submission_deadline = request
            .submission_deadline
            .as_deref()
            .map(parse_deadline)
            .transpose()?;

        let settings = self
            .db
            .update_settings(&UpdateSettingsParams {
                submissions_open: request.submissions_open,
                submission_deadline,
                max_requested_amount: request.max_requested_amount,
                updated_by: admin.user_id,
            })
            .await
            .context("Failed to update portal settings")?;

        tracing::info!(
            admin_id = %admin.user_id,
            submissions_open = settings.submissions_open,
            "portal settings updated"
        );
        Ok(settings)
    }
}

/// Parse an RFC 3339 deadline.
pub fn parse_deadline(value: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ApiError::bad_request("Deadline must be an RFC 3339 timestamp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn settings(open: bool, deadline: Option<DateTime<Utc>>, max: Option<i64>) -> PortalSettings {
        PortalSettings {
            submissions_open: open,
            submission_deadline: deadline,
            max_requested_amount: max,
            updated_at: Utc::now(),
            updated_by: None,
        }
    }

    #[test]
    fn test_closed_portal_is_forbidden() {
        let err = check_submission_allowed(&settings(false, None, None), 100, Utc::now())
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[test]
    fn test_past_deadline_is_forbidden() {
        let now = Utc::now();
        let s = settings(true, Some(now - Duration::minutes(1)), None);
        let err = check_submission_allowed(&s, 100, now).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
        assert!(err.to_string().contains("deadline"));
    }

    #[test]
    fn test_amount_over_maximum_is_bad_request() {
        let s = settings(true, None, Some(10_000));
        assert!(check_submission_allowed(&s, 10_000, Utc::now()).is_ok());
        let err = check_submission_allowed(&s, 10_001, Utc::now()).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_scoring_moves_submitted_to_under_review() {
        assert_eq!(
            status_after_scoring(ApplicationStatus::Submitted).unwrap(),
            ApplicationStatus::UnderReview
        );
        assert_eq!(
            status_after_scoring(ApplicationStatus::UnderReview).unwrap(),
            ApplicationStatus::UnderReview
        );
        for status in [
            ApplicationStatus::Draft,
            ApplicationStatus::Accepted,
            ApplicationStatus::Rejected,
        ] {
            assert!(matches!(
                status_after_scoring(status),
                Err(ApiError::Conflict(_))
            ));
        }
    }

    #[test]
    fn test_parse_deadline() {
        let parsed = parse_deadline("2026-12-31T23:59:59+02:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-12-31T21:59:59+00:00");
        assert!(parse_deadline("next friday").is_err());
    }
}
