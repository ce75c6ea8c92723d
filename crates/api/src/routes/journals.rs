//! Manual journal routes.
//!
//! Journals written by settlements, recognition runs and bank auto-posting can be
//! read here but only reversed through the component that owns them.

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
use defter_db::repositories::{JournalRepository, ManualJournalInput, ReverseJournalInput};
use defter_shared::ScopeAction;
use defter_shared::types::{JournalEntryId, LegalEntityId};

/// Creates the journal routes (requires auth middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/entities/{entity_id}/journals", post(post_manual_journal))
        .route(
            "/entities/{entity_id}/journals/{journal_id}",
            get(get_journal),
        )
        .route(
            "/entities/{entity_id}/journals/{journal_id}/reverse",
            post(reverse_journal),
        )
}

/// POST `/entities/{entity_id}/journals` - Post a balanced manual journal.
async fn post_manual_journal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(entity_id): Path<LegalEntityId>,
    IdempotencyKeyHeader(key): IdempotencyKeyHeader,
    Json(payload): Json<ManualJournalInput>,
) -> Result<Response, ApiError> {
    let scope = authorize(&auth, entity_id, ScopeAction::Post)?;
    let repo = JournalRepository::new((*state.db).clone());

    let result = repo.post_manual(&scope, key, payload).await?;
    info!(
        journal_id = %result.value.journal_entry_id,
        replay = result.replay,
        "Manual journal posted"
    );
    Ok(idempotent_response(result))
}

/// GET `/entities/{entity_id}/journals/{journal_id}` - Journal with its lines.
async fn get_journal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((entity_id, journal_id)): Path<(LegalEntityId, JournalEntryId)>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = authorize(&auth, entity_id, ScopeAction::Read)?;
    let journal = JournalRepository::new((*state.db).clone())
        .get(&scope, journal_id)
        .await?;
    Ok((StatusCode::OK, Json(journal)))
}

/// POST `/entities/{entity_id}/journals/{journal_id}/reverse` - Mirror a manual journal.
async fn reverse_journal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((entity_id, journal_id)): Path<(LegalEntityId, JournalEntryId)>,
    IdempotencyKeyHeader(key): IdempotencyKeyHeader,
    Json(payload): Json<ReverseJournalInput>,
) -> Result<Response, ApiError> {
    let scope = authorize(&auth, entity_id, ScopeAction::Post)?;
    let repo = JournalRepository::new((*state.db).clone());

    let result = repo
        .reverse_journal(&scope, journal_id, key, payload)
        .await?;
    info!(
        journal_id = %journal_id,
        reversal_id = %result.value.reversal.journal_entry_id,
        replay = result.replay,
        "Journal reversed"
    );
    Ok(idempotent_response(result))
}
