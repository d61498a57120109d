// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

pub mod admin;
pub mod application;
pub mod auth;
pub mod message;
pub mod settings;
pub mod version;
