// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

use crate::services::config::env_or;
use crate::services::logging::anonymize_email;
use anyhow::{Context, Result};
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use std::env;

/// SMTP connection settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub tls: bool,
}

/// Configuration for the email service.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// `None` puts the service in log-only mode
    pub smtp: Option<SmtpConfig>,
    pub from_email: String,
    pub from_name: String,
    pub app_base_url: String,
    pub verification_expiry_hours: u64,
    pub password_reset_expiry_minutes: u64,
    pub otp_expiry_minutes: u64,
}

impl EmailConfig {
    /// Load email configuration from environment variables.
    /// Without `SMTP_HOST` emails are written to the log instead of sent.
    pub fn from_env() -> Result<Self> {
        let smtp = match env::var("SMTP_HOST") {
            Ok(host) => Some(SmtpConfig {
                host,
                port: env_or("SMTP_PORT", 587)?,
                username: env::var("SMTP_USERNAME").context("SMTP_USERNAME must be set")?,
                password: env::var("SMTP_PASSWORD").context("SMTP_PASSWORD must be set")?,
                tls: env_or("SMTP_TLS", true)?,
            }),
            Err(_) => None,
        };

        Ok(Self {
            smtp,
            from_email: env::var("SMTP_FROM_EMAIL")
                .unwrap_or_else(|_| "no-reply@localhost".to_string()),
            from_name: env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "Grant Portal".to_string()),
            app_base_url: env::var("APP_BASE_URL").context("APP_BASE_URL must be set")?,
            verification_expiry_hours: env_or("EMAIL_VERIFICATION_EXPIRY_HOURS", 24)?,
            password_reset_expiry_minutes: env_or("PASSWORD_RESET_EXPIRY_MINUTES", 60)?,
            otp_expiry_minutes: env_or("OTP_EXPIRY_MINUTES", 10)?,
        })
    }

    /// Log-only configuration for local development and tests.
    pub fn log_only(app_base_url: &str) -> Self {
        Self {
            smtp: None,
            from_email: "no-reply@localhost".to_string(),
            from_name: "Grant Portal".to_string(),
            app_base_url: app_base_url.to_string(),
            verification_expiry_hours: 24,
            password_reset_expiry_minutes: 60,
            otp_expiry_minutes: 10,
        }
    }
}

/// Email template with simple variable substitution.
struct EmailTemplate {
    content: &'static str,
}

impl EmailTemplate {
    const fn new(content: &'static str) -> Self {
        Self { content }
    }

    fn render(&self, vars: &[(&str, &str)]) -> String {
        let mut result = self.content.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }
}

// Email templates loaded at compile time
const EMAIL_VERIFICATION_TEMPLATE: EmailTemplate =
    EmailTemplate::new(include_str!("../../templates/emails/email_verification.txt"));
const PASSWORD_RESET_TEMPLATE: EmailTemplate =
    EmailTemplate::new(include_str!("../../templates/emails/password_reset.txt"));
const LOGIN_CODE_TEMPLATE: EmailTemplate =
    EmailTemplate::new(include_str!("../../templates/emails/login_code.txt"));
const APPLICATION_NOTICE_TEMPLATE: EmailTemplate =
    EmailTemplate::new(include_str!("../../templates/emails/application_notice.txt"));

/// Email service for account and application notifications.
pub struct EmailService {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from_mailbox: Mailbox,
    config: EmailConfig,
}

impl EmailService {
    /// Create a new email service with the given configuration.
    pub fn new(config: EmailConfig) -> Result<Self> {
        let transport = match &config.smtp {
            Some(smtp) => {
                let creds = Credentials::new(smtp.username.clone(), smtp.password.clone());
                let transport = if smtp.tls {
                    AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
                        .context("Failed to create SMTP relay")?
                        .port(smtp.port)
                        .credentials(creds)
                        .build()
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host)
                        .port(smtp.port)
                        .credentials(creds)
                        .build()
                };
                Some(transport)
            }
            None => None,
        };

        let from_mailbox: Mailbox = format!("{} <{}>", config.from_name, config.from_email)
            .parse()
            .context("Invalid from email address")?;

        Ok(Self {
            transport,
            from_mailbox,
            config,
        })
    }

    /// Send the link that confirms a new account's email address.
    pub async fn send_email_verification(
        &self,
        to_email: &str,
        username: &str,
        token: &str,
    ) -> Result<()> {
        let verify_link = format!("{}/auth/verify-email/{}", self.config.app_base_url, token);
        let expiry_hours = self.config.verification_expiry_hours.to_string();

        let body = EMAIL_VERIFICATION_TEMPLATE.render(&[
            ("username", username),
            ("verify_link", &verify_link),
            ("expiry_hours", &expiry_hours),
        ]);

        self.send_email(to_email, "Confirm your Grant Portal email", &body)
            .await
    }

    /// Send a password reset link.
    pub async fn send_password_reset(
        &self,
        to_email: &str,
        username: &str,
        token: &str,
    ) -> Result<()> {
        let reset_link = format!(
            "{}/reset-password?token={}",
            self.config.app_base_url, token
        );
        let expiry_minutes = self.config.password_reset_expiry_minutes.to_string();

        let body = PASSWORD_RESET_TEMPLATE.render(&[
            ("username", username),
            ("reset_link", &reset_link),
            ("expiry_minutes", &expiry_minutes),
        ]);

        self.send_email(to_email, "Reset your Grant Portal password", &body)
            .await
    }

    /// Send a one-time sign-in code.
    pub async fn send_login_code(&self, to_email: &str, username: &str, code: &str) -> Result<()> {
        let expiry_minutes = self.config.otp_expiry_minutes.to_string();

        let body = LOGIN_CODE_TEMPLATE.render(&[
            ("username", username),
            ("code", code),
            ("expiry_minutes", &expiry_minutes),
        ]);

        self.send_email(to_email, "Your Grant Portal sign-in code", &body)
            .await
    }

    /// Tell an applicant about an update on their application.
    pub async fn send_application_notice(
        &self,
        to_email: &str,
        username: &str,
        application_title: &str,
        subject: &str,
        message: &str,
    ) -> Result<()> {
        let portal_link = format!("{}/messages", self.config.app_base_url);

        let body = APPLICATION_NOTICE_TEMPLATE.render(&[
            ("username", username),
            ("application_title", application_title),
            ("body", message),
            ("portal_link", &portal_link),
        ]);

        self.send_email(to_email, subject, &body).await
    }

    /// Send an email, or log it when no SMTP transport is configured.
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let to_mailbox: Mailbox = to.parse().context("Invalid recipient email address")?;

        let Some(transport) = &self.transport else {
            tracing::info!(
                to = %anonymize_email(to),
                subject,
                "SMTP not configured, email not sent:\n{}",
                body
            );
            return Ok(());
        };

        let email = Message::builder()
            .from(self.from_mailbox.clone())
            .to(to_mailbox)
            .subject(subject)
            .body(body.to_string())
            .context("Failed to build email message")?;

        transport.send(email).await.context("Failed to send email")?;

        tracing::debug!(to = %anonymize_email(to), subject, "email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_render() {
        let template = EmailTemplate::new("Hello {{name}}, your code is {{code}}.");
        let result = template.render(&[("name", "Alice"), ("code", "12345")]);
        assert_eq!(result, "Hello Alice, your code is 12345.");
    }

    #[test]
    fn test_template_render_missing_var() {
        let template = EmailTemplate::new("Hello {{name}}, welcome!");
        assert_eq!(template.render(&[]), "Hello {{name}}, welcome!");
    }

    #[test]
    fn test_verification_template_loads() {
        let result = EMAIL_VERIFICATION_TEMPLATE.render(&[
            ("username", "alice"),
            ("verify_link", "https://portal.example.com/auth/verify-email/abc"),
            ("expiry_hours", "24"),
        ]);
        assert!(result.contains("Hello alice"));
        assert!(result.contains("https://portal.example.com/auth/verify-email/abc"));
        assert!(result.contains("24 hours"));
    }

    #[test]
    fn test_login_code_template_loads() {
        let result = LOGIN_CODE_TEMPLATE.render(&[
            ("username", "alice"),
            ("code", "042917"),
            ("expiry_minutes", "10"),
        ]);
        assert!(result.contains("042917"));
        assert!(result.contains("10 minutes"));
    }

    #[test]
    fn test_notice_template_has_no_placeholders_left() {
        let result = APPLICATION_NOTICE_TEMPLATE.render(&[
            ("username", "alice"),
            ("application_title", "Library roof"),
            ("body", "Your proposal is under review."),
            ("portal_link", "https://portal.example.com/messages"),
        ]);
        assert!(!result.contains("{{"));
        assert!(result.contains("\"Library roof\""));
    }

    #[tokio::test]
    async fn test_log_only_mode_does_not_fail() {
        let service = EmailService::new(EmailConfig::log_only("http://localhost:3000")).unwrap();
        service
            .send_login_code("alice@example.com", "alice", "123456")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_rejected() {
        let service = EmailService::new(EmailConfig::log_only("http://localhost:3000")).unwrap();
        assert!(service
            .send_login_code("not an address", "alice", "123456")
            .await
            .is_err());
    }
}
