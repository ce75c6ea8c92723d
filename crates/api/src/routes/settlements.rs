//! Settlement routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tracing::info;

use super::idempotent_response;
use crate::{
    AppState,
    error::ApiError,
    extractors::{IdempotencyKeyHeader, authorize},
    middleware::AuthUser,
};
use defter_db::repositories::{ApplySettlementInput, SettlementRepository};
use defter_shared::ScopeAction;
use defter_shared::types::{LegalEntityId, SettlementBatchId};

/// Creates the settlement routes (requires auth middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/entities/{entity_id}/settlements", post(apply_settlement))
        .route(
            "/entities/{entity_id}/settlements/{batch_id}",
            get(get_settlement),
        )
}

/// POST `/entities/{entity_id}/settlements` - Apply cash against open items.
async fn apply_settlement(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(entity_id): Path<LegalEntityId>,
    IdempotencyKeyHeader(key): IdempotencyKeyHeader,
    Json(payload): Json<ApplySettlementInput>,
) -> Result<Response, ApiError> {
    let scope = authorize(&auth, entity_id, ScopeAction::Post)?;
    let repo = SettlementRepository::new((*state.db).clone(), state.posting.clone());

    let result = repo.apply(&scope, key, payload).await?;
    info!(
        batch_id = %result.value.batch_id,
        replay = result.replay,
        "Settlement applied"
    );
    Ok(idempotent_response(result))
}

/// GET `/entities/{entity_id}/settlements/{batch_id}` - Batch with its allocations.
async fn get_settlement(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((entity_id, batch_id)): Path<(LegalEntityId, SettlementBatchId)>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = authorize(&auth, entity_id, ScopeAction::Read)?;
    let repo = SettlementRepository::new((*state.db).clone(), state.posting.clone());

    let batch = repo.get(&scope, batch_id).await?;
    Ok((StatusCode::OK, Json(batch)))
}
