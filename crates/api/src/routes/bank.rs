//! Bank statement and reconciliation routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::idempotent_response;
use crate::{
    AppState,
    error::ApiError,
    extractors::{IdempotencyKeyHeader, authorize},
    middleware::AuthUser,
};
use defter_db::repositories::{
    CreatePostingRuleInput, ImportStatementLineInput, ReconciliationRepository,
};
use defter_shared::ScopeAction;
use defter_shared::types::{LegalEntityId, StatementLineId};

/// Creates the bank routes (requires auth middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/entities/{entity_id}/bank/statement-lines",
            post(import_statement_line),
        )
        .route(
            "/entities/{entity_id}/bank/posting-rules",
            post(create_posting_rule),
        )
        .route(
            "/entities/{entity_id}/bank/statement-lines/{line_id}/auto-post",
            post(auto_post),
        )
}

/// Id of a created row.
#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    /// New row id.
    pub id: Uuid,
}

fn repository(state: &AppState) -> ReconciliationRepository {
    ReconciliationRepository::new((*state.db).clone(), state.posting.clone())
}

/// POST `/entities/{entity_id}/bank/statement-lines` - Import one UNMATCHED line.
async fn import_statement_line(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(entity_id): Path<LegalEntityId>,
    Json(payload): Json<ImportStatementLineInput>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = authorize(&auth, entity_id, ScopeAction::Post)?;
    let id = repository(&state).import_line(&scope, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            id: id.into_inner(),
        }),
    ))
}

/// POST `/entities/{entity_id}/bank/posting-rules` - Store an active posting rule.
async fn create_posting_rule(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(entity_id): Path<LegalEntityId>,
    Json(payload): Json<CreatePostingRuleInput>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = authorize(&auth, entity_id, ScopeAction::Post)?;
    let id = repository(&state).create_rule(&scope, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            id: id.into_inner(),
        }),
    ))
}

/// POST `/entities/{entity_id}/bank/statement-lines/{line_id}/auto-post` - Apply the first matching rule.
async fn auto_post(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((entity_id, line_id)): Path<(LegalEntityId, StatementLineId)>,
    IdempotencyKeyHeader(key): IdempotencyKeyHeader,
) -> Result<Response, ApiError> {
    let scope = authorize(&auth, entity_id, ScopeAction::Post)?;
    let result = repository(&state).auto_post(&scope, line_id, key).await?;
    info!(
        statement_line_id = %line_id,
        rule_id = %result.value.rule_id,
        replay = result.replay,
        "Statement line auto-posted"
    );
    Ok(idempotent_response(result))
}
