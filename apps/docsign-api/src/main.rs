//! DocSign API Server - Backend for signature placement and finalization
//!
//! Provides REST endpoints for:
//! - Document upload and progress
//! - Signature placement, status changes and public signing links
//! - Finalization into a signed PDF

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

mod config;
mod error;
mod handlers;
mod models;
mod state;
mod store;

use config::Config;
use state::AppState;

/// Build the router over an initialized state
pub fn app(state: Arc<AppState>) -> Router {
    // CORS configuration for web clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.config.max_upload_bytes;

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Documents
        .route(
            "/api/documents",
            get(handlers::list_documents).post(handlers::upload_document),
        )
        .route("/api/documents/:id", get(handlers::get_document))
        .route("/api/documents/:id/file", get(handlers::get_document_file))
        .route("/api/documents/:id/progress", get(handlers::document_progress))
        .route("/api/documents/:id/finalize", post(handlers::finalize_document))
        .route("/api/documents/:id/audit", get(handlers::audit_trail))
        .route("/api/artifacts/:id", get(handlers::get_artifact))
        // Signatures
        .route("/api/signatures", post(handlers::create_signature))
        .route(
            "/api/signatures/document/:document_id",
            get(handlers::list_signatures),
        )
        .route(
            "/api/signatures/:id",
            axum::routing::delete(handlers::delete_signature),
        )
        .route(
            "/api/signatures/:id/status",
            patch(handlers::update_signature_status),
        )
        .route(
            "/api/signatures/:id/position",
            put(handlers::update_signature_position),
        )
        .route("/api/signatures/:id/send-link", post(handlers::send_link))
        // Public signing
        .route(
            "/api/signatures/public/:token",
            get(handlers::get_signing_request),
        )
        .route(
            "/api/signatures/public/:token/sign",
            post(handlers::submit_public_signature),
        )
        .route(
            "/api/signatures/public/:token/reject",
            post(handlers::reject_public_signature),
        )
        // Add middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("docsign_api=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let config = Config::from_env()?;

    // Initialize application state
    info!("Initializing DocSign API...");
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = Arc::new(AppState::new(config).await?);

    info!("Starting DocSign API on http://{}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
