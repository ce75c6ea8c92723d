//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - REST routes for settlements, journals, recognition runs and bank reconciliation
//! - Bearer-token authentication and legal-entity scope checks
//! - The `Idempotency-Key` header extractor
//! - JSON error responses carrying the domain error code

pub mod error;
pub mod extractors;
pub mod middleware;
pub mod routes;

use axum::Router;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use defter_shared::{JwtService, PostingConfig};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: Arc<DatabaseConnection>,
    /// JWT service for token operations.
    pub jwt_service: Arc<JwtService>,
    /// FX and rounding policy handed to every posting repository.
    pub posting: PostingConfig,
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes_with_state(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
