//! HTTP API exposing the visitor chat flow and the owner dashboard.

pub mod response;
pub mod routes;
pub mod sessions;

pub use response::ApiResponse;
pub use routes::AppState;

use anyhow::{Context, Result};
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

/// How often idle chat sessions are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Build the router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            header::ACCEPT,
            header::CONTENT_TYPE,
            header::HeaderName::from_static(routes::USER_ID_HEADER),
            header::HeaderName::from_static(routes::VISITOR_ID_HEADER),
        ]);

    Router::new()
        .route("/api/v1/health", get(routes::health))
        // visitor chat
        .route("/api/v1/chat/{slug}/sessions", post(routes::open_session))
        .route("/api/v1/sessions/{id}", get(routes::get_session))
        .route("/api/v1/sessions/{id}/messages", post(routes::submit_message))
        .route("/api/v1/sessions/{id}/pay", post(routes::pay))
        // owner dashboard
        .route(
            "/api/v1/agents",
            get(routes::list_agents).post(routes::create_agent),
        )
        .route(
            "/api/v1/agents/{id}",
            get(routes::get_agent).put(routes::update_agent),
        )
        .route("/api/v1/agents/{id}/history", get(routes::agent_history))
        .route("/api/v1/stats", get(routes::stats))
        .with_state(state)
        .layer(cors)
}

/// Serve until the token is cancelled.
pub async fn serve(addr: &str, state: Arc<AppState>, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Oportuna API listening on http://{}", addr);

    let sweeper = tokio::spawn(sweep_sessions(state.clone(), shutdown.clone()));

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server error")?;

    sweeper.abort();
    info!("HTTP server stopped");
    Ok(())
}

/// Drop idle chat sessions until shutdown.
async fn sweep_sessions(state: Arc<AppState>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let dropped = state.sessions.lock().await.sweep();
                if dropped > 0 {
                    debug!("Dropped {} idle chat sessions", dropped);
                }
            }
        }
    }
}
