//! Sample web application signing users in with MIRACL.

mod config;
mod routes;
mod store;

use axum::{Router, routing::get};
use miracl_api::MiraclClient;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::SampleConfig;
use crate::routes::AppState;
use crate::store::SessionRegistry;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = SampleConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    tracing::info!("Discovering MIRACL provider...");
    let miracl = MiraclClient::new(config.miracl)
        .await
        .expect("failed to discover MIRACL provider");

    if !config.secure_cookies {
        tracing::warn!("session cookies are sent without the Secure flag");
    }

    let sessions = SessionRegistry::new(Duration::from_secs(config.session_ttl_seconds));

    // Spawn periodic session cleanup task
    let cleanup_sessions = sessions.clone();
    let cleanup_interval_secs = config.cleanup_interval_seconds;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(cleanup_interval_secs));
        loop {
            interval.tick().await;
            let count = cleanup_sessions.delete_expired().await;
            if count > 0 {
                let remaining_sessions = cleanup_sessions.len().await;
                tracing::debug!(
                    deleted_sessions = count,
                    remaining_sessions = remaining_sessions,
                    "Periodic session cleanup"
                );
            }
        }
    });

    let app_state = Arc::new(AppState::new(miracl, sessions, config.secure_cookies));

    let app = Router::new()
        .route("/", get(routes::index))
        .route("/auth", get(routes::auth))
        .route("/c2id", get(routes::c2id))
        .route("/refresh", get(routes::refresh))
        .route("/logout", get(routes::logout))
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.listen_addr);

    axum::serve(listener, app).await.expect("server error");
}
