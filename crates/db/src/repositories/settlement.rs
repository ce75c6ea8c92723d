//! Settlement persistence.
//!
//! One apply call runs in one transaction:
//! 1. Insert the DRAFT batch carrying the idempotency key (`ON CONFLICT DO NOTHING`)
//! 2. Lock the funding bucket and the targeted open items `FOR UPDATE`, in id order
//! 3. Plan allocations with `SettlementEngine` and post the journal
//! 4. Write allocations, residuals and unapplied cash, then flip the batch to POSTED
//!
//! A conflicting insert in step 1 means a concurrent request with the same key
//! won; the loser rolls back and replays the winner's batch.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use defter_core::fx::{FxPolicy, FxSnapshot};
use defter_core::idempotency::{IdempotencyKey, IdempotencyScope, Idempotent};
use defter_core::journal::{JournalHeader, JournalService, JournalSource};
use defter_core::settlement::{
    AllocationMode, AllocationRequest, ItemDirection, OpenItem, OpenItemStatus, RemainderPolicy,
    SettlementEngine, SettlementError, SettlementInput, SettlementPolicy, SourceResidual,
};
use defter_shared::config::PostingConfig;
use defter_shared::types::{
    AccountId, CounterpartyId, CurrencyCode, JournalEntryId, OpenItemId, RegisterId,
    RequestScope, SettlementBatchId, StatementLineId, TenantId, UnappliedCashId,
};

use super::error::{StoreError, decode};
use super::exchange_rate::ExchangeRateRepository;
use super::fiscal::FiscalRepository;
use super::idempotency::GuardedRequest;
use super::journal::JournalRepository;
use super::purpose::PurposeAccountRepository;
use crate::entities::{
    cash_registers, open_items, settlement_allocations, settlement_batches, unapplied_cash,
};

/// Operation name of settlement apply.
const OP_SETTLEMENT: &str = "settlement";

const BATCH_DRAFT: &str = "DRAFT";
const BATCH_POSTED: &str = "POSTED";

/// Where the settled cash comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FundingSource {
    /// Cash moving through a bank or cash register.
    #[serde(rename_all = "camelCase")]
    Register {
        /// Register id.
        register_id: RegisterId,
    },
    /// A previously parked unapplied-cash bucket.
    #[serde(rename_all = "camelCase")]
    UnappliedCash {
        /// Bucket id.
        bucket_id: UnappliedCashId,
    },
}

impl FundingSource {
    /// Resource the idempotency scope is narrowed to.
    #[must_use]
    pub const fn resource_id(self) -> Uuid {
        match self {
            Self::Register { register_id } => register_id.into_inner(),
            Self::UnappliedCash { bucket_id } => bucket_id.into_inner(),
        }
    }
}

/// Input of a settlement apply call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplySettlementInput {
    /// Funding source.
    pub source: FundingSource,
    /// Customer or vendor.
    pub counterparty_id: CounterpartyId,
    /// Receivable (incoming cash) or payable (outgoing cash).
    pub direction: ItemDirection,
    /// Settlement currency.
    pub currency: CurrencyCode,
    /// Cash amount.
    pub amount: Decimal,
    /// Settlement date.
    pub settlement_date: NaiveDate,
    /// Explicit allocations; exclusive with `auto_allocate`.
    #[serde(default)]
    pub allocations: Option<Vec<AllocationRequest>>,
    /// Allocate oldest items first.
    #[serde(default)]
    pub auto_allocate: bool,
    /// Caller-supplied settlement rate.
    #[serde(default)]
    pub fx_rate_override: Option<Decimal>,
    /// Bank statement line this settlement books.
    #[serde(default)]
    pub bank_statement_line_id: Option<StatementLineId>,
    /// Cash transaction this settlement books.
    #[serde(default)]
    pub cash_transaction_id: Option<Uuid>,
}

/// One stored allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationView {
    /// Settled item.
    pub open_item_id: OpenItemId,
    /// Amount in settlement currency.
    pub amount: Decimal,
    /// Base at the item's original rate.
    pub original_base: Decimal,
    /// Base at the settlement rate.
    pub settlement_base: Decimal,
    /// Realized FX difference.
    pub fx_difference: Decimal,
}

/// A settlement batch with its allocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResult {
    /// Batch id.
    pub batch_id: SettlementBatchId,
    /// Batch status.
    pub status: String,
    /// Posted journal.
    pub journal_entry_id: Option<JournalEntryId>,
    /// Counterparty.
    pub counterparty_id: CounterpartyId,
    /// Settlement currency.
    pub currency: String,
    /// Cash amount.
    pub amount: Decimal,
    /// Σ allocations.
    pub applied_amount: Decimal,
    /// Amount parked as unapplied cash.
    pub unapplied_amount: Decimal,
    /// Net realized FX difference.
    pub fx_total: Decimal,
    /// Settlement-date rate.
    pub fx: FxSnapshot,
    /// Bucket created for the remainder.
    pub unapplied_cash_id: Option<UnappliedCashId>,
    /// Allocation rows.
    pub allocations: Vec<AllocationView>,
}

/// Row-level context of a batch that the core input does not carry.
#[derive(Debug, Clone)]
pub(crate) struct BatchMeta {
    pub register_id: Option<RegisterId>,
    pub unapplied_source_id: Option<UnappliedCashId>,
    pub settlement_date: NaiveDate,
    pub bank_statement_line_id: Option<StatementLineId>,
    pub cash_transaction_id: Option<Uuid>,
}

/// Settlement repository.
#[derive(Debug, Clone)]
pub struct SettlementRepository {
    db: DatabaseConnection,
    config: PostingConfig,
}

impl SettlementRepository {
    /// Creates a new settlement repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection, config: PostingConfig) -> Self {
        Self { db, config }
    }

    /// Applies cash against open items, at most once per key and funding source.
    ///
    /// # Arguments
    ///
    /// * `scope` - Tenant, legal entity and acting user
    /// * `key` - Caller-supplied idempotency key
    /// * `input` - Settlement request
    ///
    /// # Returns
    ///
    /// The batch with its allocations, flagged as a replay when the key was
    /// already used for the same request on the same funding source.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed requests, a state conflict for a
    /// non-open period or an already settled item, `SetupRequired` for missing
    /// purpose accounts or FX rates, and an idempotency conflict when the key was
    /// used for a different payload.
    pub async fn apply(
        &self,
        scope: &RequestScope,
        key: IdempotencyKey,
        input: ApplySettlementInput,
    ) -> Result<Idempotent<SettlementResult>, StoreError> {
        let mode = AllocationMode::from_request(input.allocations.clone(), input.auto_allocate)?;
        if input.amount <= Decimal::ZERO {
            return Err(SettlementError::NonPositiveAmount(input.amount).into());
        }

        let guard = GuardedRequest::new(
            key,
            IdempotencyScope::new(scope.tenant_id, OP_SETTLEMENT)
                .with_legal_entity(scope.legal_entity_id)
                .with_resource(input.source.resource_id()),
            &input,
        )?;
        if let Some(batch) = Self::find_by_key_in(&self.db, scope.tenant_id, &guard).await? {
            return self.replay(&guard, &batch).await;
        }

        let txn = self.db.begin().await?;
        let book = FiscalRepository::default_book_in(&txn, scope).await?;
        let (source_account_id, settlement_fx, remainder) = match input.source {
            FundingSource::Register { register_id } => {
                let register = Self::register_in(&txn, scope, register_id).await?;
                if register.currency != input.currency.as_str() {
                    return Err(SettlementError::SourceMismatch(format!(
                        "register {register_id} holds {}, not {}",
                        register.currency, input.currency
                    ))
                    .into());
                }
                let fx = ExchangeRateRepository::resolve_in(
                    &txn,
                    scope.tenant_id,
                    &input.currency,
                    &book.base_currency,
                    input.settlement_date,
                    FxPolicy::from_config(&self.config),
                    input.fx_rate_override,
                )
                .await?;
                (AccountId::from_uuid(register.account_id), fx, RemainderPolicy::CreateUnapplied)
            }
            FundingSource::UnappliedCash { bucket_id } => {
                let bucket = Self::bucket_in(&txn, scope, bucket_id, false).await?;
                Self::check_bucket(&bucket, &input)?;
                // The bucket's frozen snapshot is the settlement rate.
                (
                    AccountId::from_uuid(bucket.account_id),
                    snapshot_of(&bucket.fx_rate, &bucket.fx_provenance, bucket.fx_rate_date)?,
                    RemainderPolicy::LeaveInSource,
                )
            }
        };

        let settlement = SettlementInput {
            direction: input.direction,
            counterparty_id: input.counterparty_id,
            currency: input.currency.clone(),
            amount: input.amount,
            mode,
            settlement_fx,
            source_account_id,
            remainder,
            source_residual: None,
        };
        let meta = BatchMeta {
            register_id: match input.source {
                FundingSource::Register { register_id } => Some(register_id),
                FundingSource::UnappliedCash { .. } => None,
            },
            unapplied_source_id: match input.source {
                FundingSource::UnappliedCash { bucket_id } => Some(bucket_id),
                FundingSource::Register { .. } => None,
            },
            settlement_date: input.settlement_date,
            bank_statement_line_id: input.bank_statement_line_id,
            cash_transaction_id: input.cash_transaction_id,
        };

        let Some(batch_id) = self.apply_in(&txn, scope, &guard, settlement, &meta).await? else {
            txn.rollback().await?;
            return self.replay_after_conflict(scope, &guard, &meta).await;
        };
        txn.commit().await?;

        let result = Self::load_result(&self.db, scope, batch_id).await?;
        info!(
            tenant_id = %scope.tenant_id,
            batch_id = %batch_id,
            applied = %result.applied_amount,
            unapplied = %result.unapplied_amount,
            fx_total = %result.fx_total,
            "Settlement applied"
        );
        Ok(Idempotent::fresh(result))
    }

    /// Fetches a batch with its allocations.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` outside the caller's tenant and legal entity.
    pub async fn get(
        &self,
        scope: &RequestScope,
        id: SettlementBatchId,
    ) -> Result<SettlementResult, StoreError> {
        Self::load_result(&self.db, scope, id).await
    }

    /// Runs steps 1-4 inside the caller's transaction.
    ///
    /// Returns `None` when the DRAFT batch insert hit a unique index.
    pub(crate) async fn apply_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &RequestScope,
        guard: &GuardedRequest,
        mut input: SettlementInput,
        meta: &BatchMeta,
    ) -> Result<Option<SettlementBatchId>, StoreError> {
        let policy = SettlementPolicy::from_config(&self.config);
        let batch_id = SettlementBatchId::new();
        if !Self::insert_draft_in(conn, scope, guard, batch_id, &input, meta).await? {
            return Ok(None);
        }

        let bucket = match meta.unapplied_source_id {
            Some(bucket_id) => {
                let bucket = Self::bucket_in(conn, scope, bucket_id, true).await?;
                input.source_residual = Some(SourceResidual {
                    amount: bucket.residual_amount,
                    base: bucket.residual_base,
                });
                Some(bucket)
            }
            None => None,
        };

        let items = Self::lock_items_in(conn, scope, &input).await?;
        let accounts = PurposeAccountRepository::load_in(conn, scope).await?;
        let plan = SettlementEngine::plan(&input, &items, &accounts, policy).inspect_err(|e| {
            warn!(tenant_id = %scope.tenant_id, error = %e, "Settlement rejected");
        })?;

        let book = FiscalRepository::default_book_in(conn, scope).await?;
        let period = FiscalRepository::period_in(conn, scope, book.id, meta.settlement_date).await?;
        let header = JournalHeader {
            tenant_id: scope.tenant_id,
            legal_entity_id: scope.legal_entity_id,
            book_id: book.id,
            fiscal_period_id: period.id,
            entry_date: meta.settlement_date,
            currency: input.currency.clone(),
            description: format!(
                "Settlement {} {} {}",
                input.direction.as_str(),
                input.amount,
                input.currency
            ),
            source: JournalSource::Settlement,
            source_id: Some(batch_id.into_inner()),
            reversal_of_entry_id: None,
        };
        let journal = JournalService::prepare(header, &plan.lines, period.status)?;
        if !JournalRepository::insert_in(conn, &journal, scope.user_id, None).await? {
            return Err(StoreError::Corrupt(format!(
                "settlement journal {} collided",
                journal.id
            )));
        }

        let now = Utc::now();
        if !plan.allocations.is_empty() {
            let rows = plan
                .allocations
                .iter()
                .map(|a| settlement_allocations::ActiveModel {
                    id: Set(Uuid::now_v7()),
                    batch_id: Set(batch_id.into_inner()),
                    open_item_id: Set(a.open_item_id.into_inner()),
                    amount: Set(a.amount),
                    original_base: Set(a.original_base),
                    settlement_base: Set(a.settlement_base),
                    fx_difference: Set(a.fx_difference),
                    created_at: Set(now.into()),
                });
            settlement_allocations::Entity::insert_many(rows)
                .exec_without_returning(conn)
                .await?;
        }

        for allocation in &plan.allocations {
            open_items::ActiveModel {
                id: Set(allocation.open_item_id.into_inner()),
                residual_amount: Set(allocation.residual_after),
                residual_base: Set(allocation.residual_base_after),
                status: Set(allocation.status_after.as_str().to_string()),
                updated_at: Set(now.into()),
                ..Default::default()
            }
            .update(conn)
            .await?;
        }

        if let Some(unapplied) = plan.unapplied {
            unapplied_cash::ActiveModel {
                id: Set(UnappliedCashId::new().into_inner()),
                tenant_id: Set(scope.tenant_id.into_inner()),
                legal_entity_id: Set(scope.legal_entity_id.into_inner()),
                counterparty_id: Set(input.counterparty_id.into_inner()),
                direction: Set(input.direction.as_str().to_string()),
                currency: Set(input.currency.to_string()),
                account_id: Set(unapplied.account_id.into_inner()),
                original_amount: Set(unapplied.amount),
                residual_amount: Set(unapplied.amount),
                residual_base: Set(unapplied.base),
                fx_rate: Set(input.settlement_fx.rate),
                fx_provenance: Set(input.settlement_fx.provenance.as_str().to_string()),
                fx_rate_date: Set(input.settlement_fx.rate_date),
                source_batch_id: Set(batch_id.into_inner()),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
            }
            .insert(conn)
            .await?;
        }

        if let Some(bucket) = bucket {
            unapplied_cash::ActiveModel {
                id: Set(bucket.id),
                residual_amount: Set(bucket.residual_amount - plan.applied_amount),
                residual_base: Set(bucket.residual_base - plan.source_base),
                updated_at: Set(now.into()),
                ..Default::default()
            }
            .update(conn)
            .await?;
        }

        settlement_batches::ActiveModel {
            id: Set(batch_id.into_inner()),
            status: Set(BATCH_POSTED.to_string()),
            journal_entry_id: Set(Some(journal.id.into_inner())),
            applied_amount: Set(plan.applied_amount),
            unapplied_amount: Set(plan.unapplied.map_or(Decimal::ZERO, |u| u.amount)),
            fx_total: Set(plan.fx_total),
            updated_at: Set(now.into()),
            ..Default::default()
        }
        .update(conn)
        .await?;

        Ok(Some(batch_id))
    }

    async fn insert_draft_in<C: ConnectionTrait>(
        conn: &C,
        scope: &RequestScope,
        guard: &GuardedRequest,
        batch_id: SettlementBatchId,
        input: &SettlementInput,
        meta: &BatchMeta,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();
        let batch = settlement_batches::ActiveModel {
            id: Set(batch_id.into_inner()),
            tenant_id: Set(scope.tenant_id.into_inner()),
            legal_entity_id: Set(scope.legal_entity_id.into_inner()),
            register_id: Set(meta.register_id.map(RegisterId::into_inner)),
            unapplied_source_id: Set(meta.unapplied_source_id.map(UnappliedCashId::into_inner)),
            counterparty_id: Set(input.counterparty_id.into_inner()),
            direction: Set(input.direction.as_str().to_string()),
            currency: Set(input.currency.to_string()),
            amount: Set(input.amount),
            applied_amount: Set(Decimal::ZERO),
            unapplied_amount: Set(Decimal::ZERO),
            fx_total: Set(Decimal::ZERO),
            fx_rate: Set(input.settlement_fx.rate),
            fx_provenance: Set(input.settlement_fx.provenance.as_str().to_string()),
            fx_rate_date: Set(input.settlement_fx.rate_date),
            settlement_date: Set(meta.settlement_date),
            journal_entry_id: Set(None),
            status: Set(BATCH_DRAFT.to_string()),
            idempotency_scope: Set(guard.scope().to_string()),
            idempotency_key: Set(guard.key().to_string()),
            request_hash: Set(guard.fingerprint().to_string()),
            bank_statement_line_id: Set(meta.bank_statement_line_id.map(StatementLineId::into_inner)),
            cash_transaction_id: Set(meta.cash_transaction_id),
            created_by: Set(scope.user_id.into_inner()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        let inserted = settlement_batches::Entity::insert(batch)
            .on_conflict(OnConflict::new().do_nothing().to_owned())
            .exec_without_returning(conn)
            .await?;
        Ok(inserted == 1)
    }

    /// Locks the candidate open items in id order.
    async fn lock_items_in<C: ConnectionTrait>(
        conn: &C,
        scope: &RequestScope,
        input: &SettlementInput,
    ) -> Result<Vec<OpenItem>, StoreError> {
        let mut query = open_items::Entity::find()
            .filter(open_items::Column::TenantId.eq(scope.tenant_id.into_inner()))
            .filter(open_items::Column::LegalEntityId.eq(scope.legal_entity_id.into_inner()));
        query = match &input.mode {
            AllocationMode::Explicit(requests) => query.filter(
                open_items::Column::Id
                    .is_in(requests.iter().map(|r| r.open_item_id.into_inner())),
            ),
            AllocationMode::Auto => query
                .filter(open_items::Column::CounterpartyId.eq(input.counterparty_id.into_inner()))
                .filter(open_items::Column::Direction.eq(input.direction.as_str()))
                .filter(open_items::Column::Currency.eq(input.currency.as_str()))
                .filter(open_items::Column::Status.ne(OpenItemStatus::Settled.as_str())),
        };

        query
            .order_by_asc(open_items::Column::Id)
            .lock_exclusive()
            .all(conn)
            .await?
            .iter()
            .map(to_open_item)
            .collect()
    }

    async fn register_in<C: ConnectionTrait>(
        conn: &C,
        scope: &RequestScope,
        id: RegisterId,
    ) -> Result<cash_registers::Model, StoreError> {
        cash_registers::Entity::find_by_id(id.into_inner())
            .filter(cash_registers::Column::TenantId.eq(scope.tenant_id.into_inner()))
            .filter(cash_registers::Column::LegalEntityId.eq(scope.legal_entity_id.into_inner()))
            .one(conn)
            .await?
            .ok_or_else(|| StoreError::not_found("Cash register", id))
    }

    async fn bucket_in<C: ConnectionTrait>(
        conn: &C,
        scope: &RequestScope,
        id: UnappliedCashId,
        lock: bool,
    ) -> Result<unapplied_cash::Model, StoreError> {
        let mut query = unapplied_cash::Entity::find_by_id(id.into_inner())
            .filter(unapplied_cash::Column::TenantId.eq(scope.tenant_id.into_inner()))
            .filter(unapplied_cash::Column::LegalEntityId.eq(scope.legal_entity_id.into_inner()));
        if lock {
            query = query.lock_exclusive();
        }
        query
            .one(conn)
            .await?
            .ok_or_else(|| StoreError::not_found("Unapplied cash", id))
    }

    fn check_bucket(
        bucket: &unapplied_cash::Model,
        input: &ApplySettlementInput,
    ) -> Result<(), StoreError> {
        let reason = if bucket.counterparty_id != input.counterparty_id.into_inner() {
            "bucket belongs to another counterparty"
        } else if bucket.direction != input.direction.as_str() {
            "bucket direction differs"
        } else if bucket.currency != input.currency.as_str() {
            "bucket currency differs"
        } else {
            return Ok(());
        };
        Err(SettlementError::SourceMismatch(reason.to_string()).into())
    }

    pub(crate) async fn find_by_key_in<C: ConnectionTrait>(
        conn: &C,
        tenant_id: TenantId,
        guard: &GuardedRequest,
    ) -> Result<Option<settlement_batches::Model>, StoreError> {
        Ok(settlement_batches::Entity::find()
            .filter(settlement_batches::Column::TenantId.eq(tenant_id.into_inner()))
            .filter(settlement_batches::Column::IdempotencyScope.eq(guard.scope()))
            .filter(settlement_batches::Column::IdempotencyKey.eq(guard.key()))
            .one(conn)
            .await?)
    }

    async fn replay(
        &self,
        guard: &GuardedRequest,
        batch: &settlement_batches::Model,
    ) -> Result<Idempotent<SettlementResult>, StoreError> {
        guard.verify(&batch.idempotency_scope, Some(&batch.request_hash))?;
        let result = Self::result_of(&self.db, batch).await?;
        info!(batch_id = %batch.id, key = guard.key(), "Idempotent replay of settlement");
        Ok(Idempotent::replayed(result))
    }

    async fn replay_after_conflict(
        &self,
        scope: &RequestScope,
        guard: &GuardedRequest,
        meta: &BatchMeta,
    ) -> Result<Idempotent<SettlementResult>, StoreError> {
        if let Some(batch) = Self::find_by_key_in(&self.db, scope.tenant_id, guard).await? {
            return self.replay(guard, &batch).await;
        }
        match meta.bank_statement_line_id {
            Some(line) => Err(StoreError::DuplicateLinkage(format!(
                "Bank statement line {line} is already linked to a settlement"
            ))),
            None => Err(StoreError::Corrupt(format!(
                "key '{}' conflicted but no batch",
                guard.key()
            ))),
        }
    }

    pub(crate) async fn load_result<C: ConnectionTrait>(
        conn: &C,
        scope: &RequestScope,
        id: SettlementBatchId,
    ) -> Result<SettlementResult, StoreError> {
        let batch = settlement_batches::Entity::find_by_id(id.into_inner())
            .filter(settlement_batches::Column::TenantId.eq(scope.tenant_id.into_inner()))
            .filter(settlement_batches::Column::LegalEntityId.eq(scope.legal_entity_id.into_inner()))
            .one(conn)
            .await?
            .ok_or_else(|| StoreError::not_found("Settlement batch", id))?;
        Self::result_of(conn, &batch).await
    }

    async fn result_of<C: ConnectionTrait>(
        conn: &C,
        batch: &settlement_batches::Model,
    ) -> Result<SettlementResult, StoreError> {
        let allocations = settlement_allocations::Entity::find()
            .filter(settlement_allocations::Column::BatchId.eq(batch.id))
            .order_by_asc(settlement_allocations::Column::Id)
            .all(conn)
            .await?
            .into_iter()
            .map(|a| AllocationView {
                open_item_id: OpenItemId::from_uuid(a.open_item_id),
                amount: a.amount,
                original_base: a.original_base,
                settlement_base: a.settlement_base,
                fx_difference: a.fx_difference,
            })
            .collect();
        let unapplied = unapplied_cash::Entity::find()
            .filter(unapplied_cash::Column::SourceBatchId.eq(batch.id))
            .one(conn)
            .await?;

        Ok(SettlementResult {
            batch_id: SettlementBatchId::from_uuid(batch.id),
            status: batch.status.clone(),
            journal_entry_id: batch.journal_entry_id.map(JournalEntryId::from_uuid),
            counterparty_id: CounterpartyId::from_uuid(batch.counterparty_id),
            currency: batch.currency.clone(),
            amount: batch.amount,
            applied_amount: batch.applied_amount,
            unapplied_amount: batch.unapplied_amount,
            fx_total: batch.fx_total,
            fx: snapshot_of(&batch.fx_rate, &batch.fx_provenance, batch.fx_rate_date)?,
            unapplied_cash_id: unapplied.map(|u| UnappliedCashId::from_uuid(u.id)),
            allocations,
        })
    }
}

fn snapshot_of(rate: &Decimal, provenance: &str, rate_date: NaiveDate) -> Result<FxSnapshot, StoreError> {
    Ok(FxSnapshot {
        rate: *rate,
        provenance: decode("fx_provenance", provenance)?,
        rate_date,
    })
}

fn to_open_item(model: &open_items::Model) -> Result<OpenItem, StoreError> {
    Ok(OpenItem {
        id: OpenItemId::from_uuid(model.id),
        counterparty_id: CounterpartyId::from_uuid(model.counterparty_id),
        direction: decode("open_items.direction", &model.direction)?,
        currency: decode("open_items.currency", &model.currency)?,
        control_account_id: AccountId::from_uuid(model.control_account_id),
        document_date: model.document_date,
        due_date: model.due_date,
        original_amount: model.original_amount,
        residual_amount: model.residual_amount,
        original_base: model.original_base,
        residual_base: model.residual_base,
        fx: snapshot_of(&model.fx_rate, &model.fx_provenance, model.fx_rate_date)?,
        status: decode("open_items.status", &model.status)?,
    })
}
