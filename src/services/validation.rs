// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Request validation helpers.
//!
//! Field rules live on the request types as `#[derive(Validate)]` attributes.
//! This module holds the custom rules those attributes refer to.

use std::borrow::Cow;
use validator::ValidationError;

/// Lowercase and trim an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// ASCII letters, digits and underscores only.
pub fn username_charset(username: &str) -> Result<(), ValidationError> {
    if username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(ValidationError::new("username_charset"))
    }
}

/// At least one non-whitespace character.
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("blank"))
    } else {
        Ok(())
    }
}

pub fn ascii_digits(value: &str) -> Result<(), ValidationError> {
    if value.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("digits").with_message(Cow::Borrowed("Code must be 6 digits")))
    }
}
