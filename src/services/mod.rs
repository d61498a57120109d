// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

pub mod applications;
pub mod auth;
pub mod auth_db;
pub mod auth_middleware;
pub mod config;
pub mod db;
pub mod email;
pub mod logging;
pub mod password;
pub mod tokens;
pub mod validation;
