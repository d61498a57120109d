// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Environment lookups shared by the service configs.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

/// Read `var` and parse it, or return `default` when it is unset.
/// A value that is set but does not parse is an error.
pub fn env_or<T: FromStr>(var: &str, default: T) -> Result<T> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .ok()
            .with_context(|| format!("{var} has an invalid value: {value:?}")),
        Err(_) => Ok(default),
    }
}
