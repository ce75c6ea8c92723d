//! Revenue and expense recognition routes.

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
use defter_db::repositories::{
    CreateAccrualInput, CreateContractLineInput, GenerateSchedulesInput, PostRunInput,
    RecognitionRepository, ReverseRunInput, SettleRunInput,
};
use defter_shared::ScopeAction;
use defter_shared::types::{LegalEntityId, RunId};

/// Creates the recognition routes (requires auth middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/entities/{entity_id}/recognition/contract-lines",
            post(create_contract_line),
        )
        .route(
            "/entities/{entity_id}/recognition/schedules",
            post(generate_schedules),
        )
        .route(
            "/entities/{entity_id}/recognition/accruals",
            post(create_accrual),
        )
        .route("/entities/{entity_id}/recognition/runs/{run_id}", get(get_run))
        .route(
            "/entities/{entity_id}/recognition/runs/{run_id}/post",
            post(post_run),
        )
        .route(
            "/entities/{entity_id}/recognition/runs/{run_id}/settle",
            post(settle_run),
        )
        .route(
            "/entities/{entity_id}/recognition/runs/{run_id}/reverse",
            post(reverse_run),
        )
}

fn repository(state: &AppState) -> RecognitionRepository {
    RecognitionRepository::new((*state.db).clone(), state.posting.clone())
}

/// POST `/entities/{entity_id}/recognition/contract-lines` - Store a contract line.
async fn create_contract_line(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(entity_id): Path<LegalEntityId>,
    Json(payload): Json<CreateContractLineInput>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = authorize(&auth, entity_id, ScopeAction::Post)?;
    let line = repository(&state).create_contract_line(&scope, payload).await?;
    Ok((StatusCode::CREATED, Json(line)))
}

/// POST `/entities/{entity_id}/recognition/schedules` - Spread a contract line into DRAFT runs.
async fn generate_schedules(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(entity_id): Path<LegalEntityId>,
    Json(payload): Json<GenerateSchedulesInput>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = authorize(&auth, entity_id, ScopeAction::Post)?;
    let summary = repository(&state).generate_schedules(&scope, payload).await?;
    info!(
        contract_line_id = %summary.contract_line_id,
        generated = summary.generated,
        skipped = summary.skipped,
        "Schedules generated"
    );
    Ok((StatusCode::CREATED, Json(summary)))
}

/// POST `/entities/{entity_id}/recognition/accruals` - Create a DRAFT accrual run.
///
/// Keyed by the caller reference and maturity month, so no header is needed.
async fn create_accrual(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(entity_id): Path<LegalEntityId>,
    Json(payload): Json<CreateAccrualInput>,
) -> Result<Response, ApiError> {
    let scope = authorize(&auth, entity_id, ScopeAction::Post)?;
    let result = repository(&state).create_accrual(&scope, payload).await?;
    Ok(idempotent_response(result))
}

/// GET `/entities/{entity_id}/recognition/runs/{run_id}` - Run with its lines.
async fn get_run(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((entity_id, run_id)): Path<(LegalEntityId, RunId)>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = authorize(&auth, entity_id, ScopeAction::Read)?;
    let run = repository(&state).get_run(&scope, run_id).await?;
    Ok((StatusCode::OK, Json(run)))
}

/// POST `/entities/{entity_id}/recognition/runs/{run_id}/post` - DRAFT to POSTED.
async fn post_run(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((entity_id, run_id)): Path<(LegalEntityId, RunId)>,
    IdempotencyKeyHeader(key): IdempotencyKeyHeader,
    Json(payload): Json<PostRunInput>,
) -> Result<Response, ApiError> {
    let scope = authorize(&auth, entity_id, ScopeAction::Post)?;
    let result = repository(&state).post_run(&scope, run_id, key, payload).await?;
    info!(run_id = %run_id, replay = result.replay, "Recognition run posted");
    Ok(idempotent_response(result))
}

/// POST `/entities/{entity_id}/recognition/runs/{run_id}/settle` - Accrual DRAFT to SETTLED.
async fn settle_run(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((entity_id, run_id)): Path<(LegalEntityId, RunId)>,
    IdempotencyKeyHeader(key): IdempotencyKeyHeader,
    Json(payload): Json<SettleRunInput>,
) -> Result<Response, ApiError> {
    let scope = authorize(&auth, entity_id, ScopeAction::Post)?;
    let result = repository(&state).settle_run(&scope, run_id, key, payload).await?;
    info!(run_id = %run_id, replay = result.replay, "Accrual settled");
    Ok(idempotent_response(result))
}

/// POST `/entities/{entity_id}/recognition/runs/{run_id}/reverse` - Mirror a POSTED run.
async fn reverse_run(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((entity_id, run_id)): Path<(LegalEntityId, RunId)>,
    IdempotencyKeyHeader(key): IdempotencyKeyHeader,
    Json(payload): Json<ReverseRunInput>,
) -> Result<Response, ApiError> {
    let scope = authorize(&auth, entity_id, ScopeAction::Post)?;
    let result = repository(&state).reverse_run(&scope, run_id, key, payload).await?;
    info!(
        run_id = %run_id,
        reversal_run_id = %result.value.run_id,
        replay = result.replay,
        "Recognition run reversed"
    );
    Ok(idempotent_response(result))
}
