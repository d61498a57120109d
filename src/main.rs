// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use grant_portal::app::{create_router, AppState, VERSION};
use grant_portal::models::auth::RegisterRequest;
use grant_portal::services::auth::AuthConfig;
use grant_portal::services::db::DbConfig;
use grant_portal::services::email::{EmailConfig, EmailService};
use grant_portal::services::logging::init_tracing;
use std::net::SocketAddr;

#[derive(Parser)]
#[command(name = "grant-portal", version = VERSION, about = "Grant application portal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
        bind: SocketAddr,
    },
    /// Create a verified administrator account
    CreateAdmin {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value = "")]
        full_name: String,
    },
}

/// Connect to the database and wire up every service from the environment.
async fn build_state() -> Result<AppState> {
    let pool = DbConfig::from_env()?.connect().await?;
    let email = EmailService::new(EmailConfig::from_env()?)?;
    let auth_config = AuthConfig::from_env()?;

    AppState::new(pool, email, auth_config)
}

async fn serve(bind: SocketAddr) -> Result<()> {
    let app = create_router(build_state().await?);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;

    tracing::info!(version = VERSION, addr = %bind, "grant-portal listening");

    axum::serve(listener, app).await.context("Server error")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    match Cli::parse().command {
        Command::Serve { bind } => serve(bind).await,
        Command::CreateAdmin {
            username,
            email,
            password,
            full_name,
        } => {
            let state = build_state().await?;
            let user = state
                .auth_service
                .create_admin(&RegisterRequest {
                    username,
                    email,
                    password,
                    full_name,
                })
                .await?;

            println!("Created admin {} ({})", user.username, user.id);
            Ok(())
        }
    }
}
