// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Tracing setup and utilities for sensitive data anonymization.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "grant_portal=info,tower_http=info";

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Anonymize an email address for logging.
/// Shows first character and domain, hides the rest: "a***@example.com"
pub fn anonymize_email(email: &str) -> String {
    if let Some((local, domain)) = email.split_once('@') {
        if local.is_empty() {
            return format!("***@{}", domain);
        }
        let first = local.chars().next().unwrap_or('*');
        format!("{}***@{}", first, domain)
    } else {
        "***@***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymize_email() {
        assert_eq!(anonymize_email("alice@example.com"), "a***@example.com");
        assert_eq!(anonymize_email("bob@test.org"), "b***@test.org");
    }

    #[test]
    fn test_anonymize_email_empty_local() {
        assert_eq!(anonymize_email("@example.com"), "***@example.com");
    }

    #[test]
    fn test_anonymize_email_no_at() {
        assert_eq!(anonymize_email("notanemail"), "***@***");
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
