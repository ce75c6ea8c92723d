//! Reference data routes: purpose-account mappings and exchange rates.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{AppState, error::ApiError, extractors::authorize, middleware::AuthUser};
use defter_core::fx::{FxPolicy, FxSnapshot};
use defter_core::purpose::PurposeCode;
use defter_db::repositories::{
    ExchangeRateRepository, FiscalRepository, PurposeAccountRepository, UpsertRateInput,
};
use defter_shared::ScopeAction;
use defter_shared::types::{AccountId, CurrencyCode, LegalEntityId};

/// Creates the reference data routes (requires auth middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/entities/{entity_id}/purpose-accounts/{purpose_code}",
            put(map_purpose_account),
        )
        .route(
            "/entities/{entity_id}/exchange-rates",
            post(upsert_exchange_rate),
        )
        .route(
            "/entities/{entity_id}/exchange-rates/resolve",
            get(resolve_exchange_rate),
        )
}

/// Request body for mapping a purpose code.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapPurposeAccountRequest {
    /// GL account the purpose code posts to.
    pub account_id: AccountId,
}

/// Query parameters for a rate lookup.
#[derive(Debug, Deserialize)]
pub struct ResolveRateQuery {
    /// Transaction currency.
    pub from: CurrencyCode,
    /// Date to resolve on.
    pub date: NaiveDate,
    /// Rate supplied by the caller, bypassing the table.
    pub rate: Option<Decimal>,
}

/// Response for a rate lookup.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRateResponse {
    /// Transaction currency.
    pub from_currency: CurrencyCode,
    /// Base currency of the default book.
    pub to_currency: CurrencyCode,
    /// Frozen snapshot a document would carry.
    #[serde(flatten)]
    pub snapshot: FxSnapshot,
}

/// PUT `/entities/{entity_id}/purpose-accounts/{purpose_code}` - Map a purpose code to an account.
async fn map_purpose_account(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((entity_id, purpose_code)): Path<(LegalEntityId, PurposeCode)>,
    Json(payload): Json<MapPurposeAccountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = authorize(&auth, entity_id, ScopeAction::Post)?;
    PurposeAccountRepository::new((*state.db).clone())
        .upsert(&scope, purpose_code, payload.account_id)
        .await?;

    info!(
        legal_entity_id = %entity_id,
        purpose_code = %purpose_code,
        account_id = %payload.account_id,
        "Purpose account mapped"
    );
    Ok((
        StatusCode::OK,
        Json(json!({
            "purposeCode": purpose_code,
            "accountId": payload.account_id,
        })),
    ))
}

/// POST `/entities/{entity_id}/exchange-rates` - Create or replace a quote.
///
/// Quotes are shared by every legal entity of the tenant.
async fn upsert_exchange_rate(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(entity_id): Path<LegalEntityId>,
    Json(payload): Json<UpsertRateInput>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = authorize(&auth, entity_id, ScopeAction::Post)?;
    let model = ExchangeRateRepository::new((*state.db).clone())
        .upsert_rate(scope.tenant_id, payload)
        .await?;

    info!(
        from = %model.from_currency,
        to = %model.to_currency,
        date = %model.effective_date,
        "Exchange rate stored"
    );
    Ok((StatusCode::OK, Json(model)))
}

/// GET `/entities/{entity_id}/exchange-rates/resolve` - Rate into the book's base currency.
async fn resolve_exchange_rate(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(entity_id): Path<LegalEntityId>,
    Query(query): Query<ResolveRateQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = authorize(&auth, entity_id, ScopeAction::Read)?;
    let book = FiscalRepository::new((*state.db).clone())
        .default_book(&scope)
        .await?;

    let snapshot = ExchangeRateRepository::new((*state.db).clone())
        .resolve(
            scope.tenant_id,
            &query.from,
            &book.base_currency,
            query.date,
            FxPolicy::from_config(&state.posting),
            query.rate,
        )
        .await?;

    Ok((
        StatusCode::OK,
        Json(ResolvedRateResponse {
            from_currency: query.from,
            to_currency: book.base_currency,
            snapshot,
        }),
    ))
}
