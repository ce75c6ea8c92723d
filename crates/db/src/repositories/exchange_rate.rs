//! Exchange rate table access.
//!
//! Quotes are read for the direct and inverse pair inside the policy window and
//! handed to `FxResolver`, which decides exact, fallback or inverse.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use uuid::Uuid;

use defter_core::fx::{FxError, FxPolicy, FxResolver, FxSnapshot, RateQuote};
use defter_shared::types::{CurrencyCode, TenantId};

use super::error::{StoreError, decode};
use crate::entities::exchange_rates;

/// Input for creating or replacing a quote.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertRateInput {
    /// Source currency.
    pub from_currency: CurrencyCode,
    /// Target currency.
    pub to_currency: CurrencyCode,
    /// `1 from = rate to`.
    pub rate: Decimal,
    /// Date the quote applies to.
    pub effective_date: NaiveDate,
    /// Free-text origin (manual, bank feed).
    #[serde(default)]
    pub source: Option<String>,
}

/// Exchange rate repository.
#[derive(Debug, Clone)]
pub struct ExchangeRateRepository {
    db: DatabaseConnection,
}

impl ExchangeRateRepository {
    /// Creates a new exchange rate repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Creates or replaces the quote for a pair and date.
    ///
    /// # Errors
    ///
    /// Returns `NonPositiveRate` for a rate ≤ 0 and a database error otherwise.
    pub async fn upsert_rate(
        &self,
        tenant_id: TenantId,
        input: UpsertRateInput,
    ) -> Result<exchange_rates::Model, StoreError> {
        if input.rate <= Decimal::ZERO {
            return Err(FxError::NonPositiveRate(input.rate).into());
        }

        let existing = exchange_rates::Entity::find()
            .filter(exchange_rates::Column::TenantId.eq(tenant_id.into_inner()))
            .filter(exchange_rates::Column::FromCurrency.eq(input.from_currency.as_str()))
            .filter(exchange_rates::Column::ToCurrency.eq(input.to_currency.as_str()))
            .filter(exchange_rates::Column::EffectiveDate.eq(input.effective_date))
            .one(&self.db)
            .await?;

        let model = if let Some(existing) = existing {
            let mut active: exchange_rates::ActiveModel = existing.into();
            active.rate = Set(input.rate);
            active.source = Set(input.source);
            active.update(&self.db).await?
        } else {
            exchange_rates::ActiveModel {
                id: Set(Uuid::now_v7()),
                tenant_id: Set(tenant_id.into_inner()),
                from_currency: Set(input.from_currency.to_string()),
                to_currency: Set(input.to_currency.to_string()),
                rate: Set(input.rate),
                effective_date: Set(input.effective_date),
                source: Set(input.source),
                created_at: Set(Utc::now().into()),
            }
            .insert(&self.db)
            .await?
        };
        Ok(model)
    }

    /// Resolves the rate for `txn_currency → base_currency` on `date`.
    ///
    /// # Errors
    ///
    /// Returns `RateNotFound` when the policy window holds no quote.
    pub async fn resolve(
        &self,
        tenant_id: TenantId,
        txn_currency: &CurrencyCode,
        base_currency: &CurrencyCode,
        date: NaiveDate,
        policy: FxPolicy,
        override_rate: Option<Decimal>,
    ) -> Result<FxSnapshot, StoreError> {
        Self::resolve_in(
            &self.db,
            tenant_id,
            txn_currency,
            base_currency,
            date,
            policy,
            override_rate,
        )
        .await
    }

    pub(crate) async fn resolve_in<C: ConnectionTrait>(
        conn: &C,
        tenant_id: TenantId,
        txn_currency: &CurrencyCode,
        base_currency: &CurrencyCode,
        date: NaiveDate,
        policy: FxPolicy,
        override_rate: Option<Decimal>,
    ) -> Result<FxSnapshot, StoreError> {
        // Same-currency and override paths never touch the table.
        let quotes = if txn_currency == base_currency || override_rate.is_some() {
            Vec::new()
        } else {
            Self::quotes_in(conn, tenant_id, txn_currency, base_currency, policy.earliest(date), date)
                .await?
        };
        Ok(FxResolver::resolve(
            txn_currency,
            base_currency,
            date,
            policy,
            override_rate,
            &quotes,
        )?)
    }

    async fn quotes_in<C: ConnectionTrait>(
        conn: &C,
        tenant_id: TenantId,
        a: &CurrencyCode,
        b: &CurrencyCode,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RateQuote>, StoreError> {
        let pair = Condition::any()
            .add(
                Condition::all()
                    .add(exchange_rates::Column::FromCurrency.eq(a.as_str()))
                    .add(exchange_rates::Column::ToCurrency.eq(b.as_str())),
            )
            .add(
                Condition::all()
                    .add(exchange_rates::Column::FromCurrency.eq(b.as_str()))
                    .add(exchange_rates::Column::ToCurrency.eq(a.as_str())),
            );

        exchange_rates::Entity::find()
            .filter(exchange_rates::Column::TenantId.eq(tenant_id.into_inner()))
            .filter(pair)
            .filter(exchange_rates::Column::EffectiveDate.between(from, to))
            .order_by_desc(exchange_rates::Column::EffectiveDate)
            .all(conn)
            .await?
            .into_iter()
            .map(|row| {
                Ok(RateQuote {
                    from_currency: decode("exchange_rates.from_currency", &row.from_currency)?,
                    to_currency: decode("exchange_rates.to_currency", &row.to_currency)?,
                    rate: row.rate,
                    effective_date: row.effective_date,
                })
            })
            .collect()
    }
}
