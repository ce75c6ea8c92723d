//! Bank statement auto-posting.
//!
//! A statement line is posted at most once. The `bank_reconciliations` row is
//! unique per (tenant, statement line) and per (tenant, scope, key); it is the
//! first write of the transaction, and the statement line is locked before it.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use defter_core::fx::FxPolicy;
use defter_core::idempotency::{IdempotencyKey, IdempotencyScope, Idempotent};
use defter_core::journal::{JournalHeader, JournalService, JournalSource};
use defter_core::reconciliation::{
    BankStatementLine, PostingRule, PostingTemplate, ReconciliationError, RuleMatcher,
    StatementDirection, StatementLineStatus, TemplatePlanner,
};
use defter_core::settlement::SettlementError;
use defter_shared::config::PostingConfig;
use defter_shared::types::{
    AccountId, CounterpartyId, CurrencyCode, JournalEntryId, PostingRuleId, RegisterId,
    RequestScope, SettlementBatchId, StatementLineId,
};
use uuid::Uuid;

use super::error::{StoreError, decode};
use super::exchange_rate::ExchangeRateRepository;
use super::fiscal::FiscalRepository;
use super::idempotency::GuardedRequest;
use super::journal::JournalRepository;
use super::settlement::{BatchMeta, SettlementRepository};
use crate::entities::{bank_reconciliations, bank_statement_lines, cash_registers, posting_rules};

const OP_AUTO_POST: &str = "bank.auto_post";
/// Batches created by auto-post carry the caller's key under this operation.
const OP_AUTO_SETTLE: &str = "bank.auto_settle";

/// Input for an imported statement line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStatementLineInput {
    /// Bank register the statement belongs to.
    pub register_id: RegisterId,
    /// Value date.
    pub value_date: NaiveDate,
    /// Signed amount, positive for inflows.
    pub amount: Decimal,
    /// Statement currency.
    pub currency: CurrencyCode,
    /// Bank-supplied description.
    pub description: String,
    /// Bank reference.
    #[serde(default)]
    pub reference: Option<String>,
    /// Counterparty suggested by the import.
    #[serde(default)]
    pub counterparty_hint: Option<CounterpartyId>,
}

/// Input for a posting rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostingRuleInput {
    /// Display name.
    pub name: String,
    /// Evaluation order, ascending.
    pub priority: i32,
    /// Restrict to one direction.
    #[serde(default)]
    pub direction: Option<StatementDirection>,
    /// Regular expression matched against the description.
    #[serde(default)]
    pub description_pattern: Option<String>,
    /// Required reference prefix.
    #[serde(default)]
    pub reference_prefix: Option<String>,
    /// Minimum absolute amount.
    #[serde(default)]
    pub min_amount: Option<Decimal>,
    /// Maximum absolute amount.
    #[serde(default)]
    pub max_amount: Option<Decimal>,
    /// Template applied on match.
    pub template: PostingTemplate,
}

/// Outcome of an auto-post call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoPostResult {
    /// Reconciliation row id.
    pub reconciliation_id: Uuid,
    /// Posted line.
    pub statement_line_id: StatementLineId,
    /// Rule that matched.
    pub rule_id: PostingRuleId,
    /// Journal booked for the line.
    pub journal_entry_id: Option<JournalEntryId>,
    /// Settlement batch, for settlement templates.
    pub settlement_batch_id: Option<SettlementBatchId>,
}

/// Bank reconciliation repository.
#[derive(Debug, Clone)]
pub struct ReconciliationRepository {
    db: DatabaseConnection,
    config: PostingConfig,
    settlements: SettlementRepository,
}

impl ReconciliationRepository {
    /// Creates a new reconciliation repository.
    #[must_use]
    pub fn new(db: DatabaseConnection, config: PostingConfig) -> Self {
        Self {
            settlements: SettlementRepository::new(db.clone(), config.clone()),
            db,
            config,
        }
    }

    /// Stores an imported statement line as UNMATCHED.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown register and a validation error for a
    /// zero amount.
    pub async fn import_line(
        &self,
        scope: &RequestScope,
        input: ImportStatementLineInput,
    ) -> Result<StatementLineId, StoreError> {
        let register = Self::register_in(&self.db, scope, input.register_id).await?;
        let id = StatementLineId::new();
        if input.amount.is_zero() {
            return Err(ReconciliationError::ZeroAmount(id).into());
        }
        if register.currency != input.currency.as_str() {
            return Err(SettlementError::SourceMismatch(format!(
                "register {} holds {}, statement line is {}",
                register.id, register.currency, input.currency
            ))
            .into());
        }

        let now = Utc::now();
        bank_statement_lines::ActiveModel {
            id: Set(id.into_inner()),
            tenant_id: Set(scope.tenant_id.into_inner()),
            legal_entity_id: Set(scope.legal_entity_id.into_inner()),
            register_id: Set(register.id),
            value_date: Set(input.value_date),
            amount: Set(input.amount),
            currency: Set(input.currency.to_string()),
            description: Set(input.description),
            reference: Set(input.reference),
            counterparty_hint: Set(input.counterparty_hint.map(CounterpartyId::into_inner)),
            status: Set(StatementLineStatus::Unmatched.as_str().to_string()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&self.db)
        .await?;
        Ok(id)
    }

    /// Stores an active posting rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be encoded or the insert fails.
    pub async fn create_rule(
        &self,
        scope: &RequestScope,
        input: CreatePostingRuleInput,
    ) -> Result<PostingRuleId, StoreError> {
        let id = PostingRuleId::new();
        posting_rules::ActiveModel {
            id: Set(id.into_inner()),
            tenant_id: Set(scope.tenant_id.into_inner()),
            legal_entity_id: Set(scope.legal_entity_id.into_inner()),
            name: Set(input.name),
            priority: Set(input.priority),
            direction: Set(input.direction.map(|d| d.as_str().to_string())),
            description_pattern: Set(input.description_pattern),
            reference_prefix: Set(input.reference_prefix),
            min_amount: Set(input.min_amount),
            max_amount: Set(input.max_amount),
            template: Set(serde_json::to_value(&input.template)?),
            is_active: Set(true),
            created_at: Set(Utc::now().into()),
        }
        .insert(&self.db)
        .await?;
        Ok(id)
    }

    /// Matches a statement line to a rule and posts it.
    ///
    /// Direct templates post a journal against the counter (and tax) account;
    /// settlement templates apply the amount through the settlement engine with
    /// the statement line as linkage. A line that was already auto-posted is
    /// returned as a replay, whichever key posted it.
    ///
    /// # Errors
    ///
    /// Returns `NoMatchingRule` when no active rule matches, and any error of the
    /// journal or settlement path. Nothing is written on failure.
    pub async fn auto_post(
        &self,
        scope: &RequestScope,
        statement_line_id: StatementLineId,
        key: IdempotencyKey,
    ) -> Result<Idempotent<AutoPostResult>, StoreError> {
        let guard = GuardedRequest::new(
            key.clone(),
            IdempotencyScope::new(scope.tenant_id, OP_AUTO_POST)
                .with_legal_entity(scope.legal_entity_id)
                .with_resource(statement_line_id.into_inner()),
            &statement_line_id,
        )?;
        if let Some(existing) = self.find_existing_in(&self.db, scope, &guard, statement_line_id).await? {
            return Self::replay(&guard, &existing);
        }

        let txn = self.db.begin().await?;
        let row = bank_statement_lines::Entity::find_by_id(statement_line_id.into_inner())
            .filter(bank_statement_lines::Column::TenantId.eq(scope.tenant_id.into_inner()))
            .filter(bank_statement_lines::Column::LegalEntityId.eq(scope.legal_entity_id.into_inner()))
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| StoreError::not_found("Bank statement line", statement_line_id))?;
        if let Some(existing) = self.find_existing_in(&txn, scope, &guard, statement_line_id).await? {
            txn.rollback().await?;
            return Self::replay(&guard, &existing);
        }

        let register = Self::register_in(&txn, scope, RegisterId::from_uuid(row.register_id)).await?;
        let line = to_statement_line(&row, AccountId::from_uuid(register.account_id))?;
        TemplatePlanner::check_postable(&line)?;

        let rules = Self::active_rules_in(&txn, scope).await?;
        let rule = RuleMatcher::select(&line, &rules)?
            .ok_or(ReconciliationError::NoMatchingRule(line.id))
            .inspect_err(|e| warn!(statement_line_id = %line.id, error = %e, "Auto-post rejected"))?;

        let reconciliation_id = Uuid::now_v7();
        let claimed = bank_reconciliations::Entity::insert(bank_reconciliations::ActiveModel {
            id: Set(reconciliation_id),
            tenant_id: Set(scope.tenant_id.into_inner()),
            legal_entity_id: Set(scope.legal_entity_id.into_inner()),
            statement_line_id: Set(line.id.into_inner()),
            rule_id: Set(rule.id.into_inner()),
            journal_entry_id: Set(None),
            settlement_batch_id: Set(None),
            idempotency_scope: Set(guard.scope().to_string()),
            idempotency_key: Set(guard.key().to_string()),
            created_by: Set(scope.user_id.into_inner()),
            created_at: Set(Utc::now().into()),
        })
        .on_conflict(OnConflict::new().do_nothing().to_owned())
        .exec_without_returning(&txn)
        .await?;
        if claimed == 0 {
            txn.rollback().await?;
            return match self.find_existing_in(&self.db, scope, &guard, statement_line_id).await? {
                Some(existing) => Self::replay(&guard, &existing),
                None => Err(StoreError::Corrupt(format!(
                    "statement line {statement_line_id} conflicted but no reconciliation"
                ))),
            };
        }

        let book = FiscalRepository::default_book_in(&txn, scope).await?;
        let fx = ExchangeRateRepository::resolve_in(
            &txn,
            scope.tenant_id,
            &line.currency,
            &book.base_currency,
            line.value_date,
            FxPolicy::from_config(&self.config),
            None,
        )
        .await?;

        let (journal_entry_id, settlement_batch_id) = match &rule.template {
            PostingTemplate::DirectPosting {
                counter_account_id,
                tax,
            } => {
                let lines = TemplatePlanner::direct_lines(
                    &line,
                    *counter_account_id,
                    *tax,
                    &fx,
                    self.config.base_scale,
                )?;
                let period = FiscalRepository::period_in(&txn, scope, book.id, line.value_date).await?;
                let header = JournalHeader {
                    tenant_id: scope.tenant_id,
                    legal_entity_id: scope.legal_entity_id,
                    book_id: book.id,
                    fiscal_period_id: period.id,
                    entry_date: line.value_date,
                    currency: line.currency.clone(),
                    description: format!("{}: {}", rule.name, line.description),
                    source: JournalSource::Reconciliation,
                    source_id: Some(line.id.into_inner()),
                    reversal_of_entry_id: None,
                };
                let journal = JournalService::prepare(header, &lines, period.status)
                    .map_err(ReconciliationError::from)?;
                if !JournalRepository::insert_in(&txn, &journal, scope.user_id, None).await? {
                    return Err(StoreError::Corrupt(format!("journal {} collided", journal.id)));
                }
                (Some(journal.id), None)
            }
            PostingTemplate::Settlement {
                counterparty_id,
                auto_allocate,
            } => {
                let input = TemplatePlanner::settlement_input(&line, *counterparty_id, *auto_allocate, fx)?;
                let batch_guard = GuardedRequest::new(
                    key,
                    IdempotencyScope::new(scope.tenant_id, OP_AUTO_SETTLE)
                        .with_legal_entity(scope.legal_entity_id)
                        .with_resource(line.id.into_inner()),
                    &line.id,
                )?;
                let meta = BatchMeta {
                    register_id: Some(RegisterId::from_uuid(register.id)),
                    unapplied_source_id: None,
                    settlement_date: line.value_date,
                    bank_statement_line_id: Some(line.id),
                    cash_transaction_id: None,
                };
                let batch_id = self
                    .settlements
                    .apply_in(&txn, scope, &batch_guard, input, &meta)
                    .await?
                    .ok_or_else(|| {
                        StoreError::DuplicateLinkage(format!(
                            "Bank statement line {} is already linked to a settlement",
                            line.id
                        ))
                    })?;
                let batch = SettlementRepository::load_result(&txn, scope, batch_id).await?;
                (batch.journal_entry_id, Some(batch_id))
            }
        };

        bank_reconciliations::ActiveModel {
            id: Set(reconciliation_id),
            journal_entry_id: Set(journal_entry_id.map(JournalEntryId::into_inner)),
            settlement_batch_id: Set(settlement_batch_id.map(SettlementBatchId::into_inner)),
            ..Default::default()
        }
        .update(&txn)
        .await?;
        bank_statement_lines::ActiveModel {
            id: Set(line.id.into_inner()),
            status: Set(StatementLineStatus::Reconciled.as_str().to_string()),
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        }
        .update(&txn)
        .await?;
        txn.commit().await?;

        info!(
            tenant_id = %scope.tenant_id,
            statement_line_id = %line.id,
            rule = %rule.name,
            journal_entry_id = ?journal_entry_id,
            settlement_batch_id = ?settlement_batch_id,
            "Statement line auto-posted"
        );
        Ok(Idempotent::fresh(AutoPostResult {
            reconciliation_id,
            statement_line_id: line.id,
            rule_id: rule.id,
            journal_entry_id,
            settlement_batch_id,
        }))
    }

    /// Finds the reconciliation of this key, or else of this line.
    async fn find_existing_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &RequestScope,
        guard: &GuardedRequest,
        statement_line_id: StatementLineId,
    ) -> Result<Option<bank_reconciliations::Model>, StoreError> {
        let by_key = bank_reconciliations::Entity::find()
            .filter(bank_reconciliations::Column::TenantId.eq(scope.tenant_id.into_inner()))
            .filter(bank_reconciliations::Column::IdempotencyScope.eq(guard.scope()))
            .filter(bank_reconciliations::Column::IdempotencyKey.eq(guard.key()))
            .one(conn)
            .await?;
        if by_key.is_some() {
            return Ok(by_key);
        }
        Ok(bank_reconciliations::Entity::find()
            .filter(bank_reconciliations::Column::TenantId.eq(scope.tenant_id.into_inner()))
            .filter(bank_reconciliations::Column::StatementLineId.eq(statement_line_id.into_inner()))
            .one(conn)
            .await?)
    }

    fn replay(
        guard: &GuardedRequest,
        existing: &bank_reconciliations::Model,
    ) -> Result<Idempotent<AutoPostResult>, StoreError> {
        // A line posted under another key replays too; only the same key with a
        // different scope is a conflict.
        if existing.idempotency_key == guard.key() {
            guard.verify(&existing.idempotency_scope, None)?;
        }
        info!(
            statement_line_id = %existing.statement_line_id,
            key = guard.key(),
            "Idempotent replay of auto-post"
        );
        Ok(Idempotent::replayed(AutoPostResult {
            reconciliation_id: existing.id,
            statement_line_id: StatementLineId::from_uuid(existing.statement_line_id),
            rule_id: PostingRuleId::from_uuid(existing.rule_id),
            journal_entry_id: existing.journal_entry_id.map(JournalEntryId::from_uuid),
            settlement_batch_id: existing.settlement_batch_id.map(SettlementBatchId::from_uuid),
        }))
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

    async fn active_rules_in<C: ConnectionTrait>(
        conn: &C,
        scope: &RequestScope,
    ) -> Result<Vec<PostingRule>, StoreError> {
        posting_rules::Entity::find()
            .filter(posting_rules::Column::TenantId.eq(scope.tenant_id.into_inner()))
            .filter(posting_rules::Column::LegalEntityId.eq(scope.legal_entity_id.into_inner()))
            .filter(posting_rules::Column::IsActive.eq(true))
            .order_by_asc(posting_rules::Column::Priority)
            .all(conn)
            .await?
            .into_iter()
            .map(|rule| {
                Ok(PostingRule {
                    id: PostingRuleId::from_uuid(rule.id),
                    name: rule.name,
                    priority: rule.priority,
                    direction: rule
                        .direction
                        .as_deref()
                        .map(|d| decode("posting_rules.direction", d))
                        .transpose()?,
                    description_pattern: rule.description_pattern,
                    reference_prefix: rule.reference_prefix,
                    min_amount: rule.min_amount,
                    max_amount: rule.max_amount,
                    template: serde_json::from_value(rule.template)
                        .map_err(|e| StoreError::Corrupt(format!("posting_rules.template: {e}")))?,
                })
            })
            .collect()
    }
}

fn to_statement_line(
    model: &bank_statement_lines::Model,
    register_account_id: AccountId,
) -> Result<BankStatementLine, StoreError> {
    Ok(BankStatementLine {
        id: StatementLineId::from_uuid(model.id),
        register_account_id,
        value_date: model.value_date,
        amount: model.amount,
        currency: decode("bank_statement_lines.currency", &model.currency)?,
        description: model.description.clone(),
        reference: model.reference.clone(),
        counterparty_hint: model.counterparty_hint.map(CounterpartyId::from_uuid),
        status: decode("bank_statement_lines.status", &model.status)?,
    })
}
