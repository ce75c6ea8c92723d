//! Journal persistence.
//!
//! Every component writes its journal through `JournalRepository::insert_in`
//! inside its own transaction, so a journal never exists without the domain
//! rows that reference it.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use defter_core::idempotency::{IdempotencyKey, IdempotencyScope, Idempotent};
use defter_core::journal::{
    JournalError, JournalHeader, JournalService, JournalSource, JournalStatus, PostedJournal,
    PostingLine, PreparedJournal, PreparedLine,
};
use defter_shared::types::{
    AccountId, BookId, CurrencyCode, FiscalPeriodId, JournalEntryId, LegalEntityId,
    RequestScope, TenantId, UserId,
};

use super::error::{StoreError, decode};
use super::fiscal::FiscalRepository;
use super::idempotency::GuardedRequest;
use crate::entities::{journal_entries, journal_lines};

/// Operation name of manual postings.
const OP_POST: &str = "journal.post";
/// Operation name of manual reversals.
const OP_REVERSE: &str = "journal.reverse";

/// Input for a manually entered journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualJournalInput {
    /// Accounting date.
    pub entry_date: NaiveDate,
    /// Transaction currency.
    pub currency: CurrencyCode,
    /// Description.
    pub description: String,
    /// Signed lines with their base amounts.
    pub lines: Vec<PostingLine>,
}

/// Input for a manual reversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseJournalInput {
    /// Date of the mirror entry.
    pub reversal_date: NaiveDate,
}

/// Header view of a stored journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalSummary {
    /// Entry id.
    pub journal_entry_id: JournalEntryId,
    /// Current status.
    pub status: JournalStatus,
    /// Fiscal period.
    pub fiscal_period_id: FiscalPeriodId,
    /// Accounting date.
    pub entry_date: NaiveDate,
    /// Total debit in base currency.
    pub total_debit_base: Decimal,
    /// Total credit in base currency.
    pub total_credit_base: Decimal,
    /// Number of lines.
    pub line_count: usize,
}

impl From<&PreparedJournal> for JournalSummary {
    fn from(journal: &PreparedJournal) -> Self {
        Self {
            journal_entry_id: journal.id,
            status: journal.status,
            fiscal_period_id: journal.header.fiscal_period_id,
            entry_date: journal.header.entry_date,
            total_debit_base: journal.total_debit_base,
            total_credit_base: journal.total_credit_base,
            line_count: journal.lines.len(),
        }
    }
}

impl From<&PostedJournal> for JournalSummary {
    fn from(journal: &PostedJournal) -> Self {
        Self {
            journal_entry_id: journal.id,
            status: journal.status,
            fiscal_period_id: journal.header.fiscal_period_id,
            entry_date: journal.header.entry_date,
            total_debit_base: journal.total_debit_base,
            total_credit_base: journal.total_credit_base,
            line_count: journal.lines.len(),
        }
    }
}

/// Result of a reversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalReversal {
    /// Entry that was reversed.
    pub original_entry_id: JournalEntryId,
    /// The mirror entry.
    pub reversal: JournalSummary,
}

/// Journal repository.
#[derive(Debug, Clone)]
pub struct JournalRepository {
    db: DatabaseConnection,
}

impl JournalRepository {
    /// Creates a new journal repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Loads a journal with its lines.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` outside the caller's tenant and legal entity.
    pub async fn get(
        &self,
        scope: &RequestScope,
        id: JournalEntryId,
    ) -> Result<PostedJournal, StoreError> {
        let model = Self::find_in(&self.db, scope, id, false).await?;
        Self::hydrate_in(&self.db, &model).await
    }

    /// Posts a manually entered journal under an idempotency key.
    ///
    /// # Errors
    ///
    /// Returns a journal error for unbalanced lines or a non-open period, and an
    /// idempotency conflict when the key was used for a different payload.
    pub async fn post_manual(
        &self,
        scope: &RequestScope,
        key: IdempotencyKey,
        input: ManualJournalInput,
    ) -> Result<Idempotent<JournalSummary>, StoreError> {
        let guard = GuardedRequest::new(
            key,
            IdempotencyScope::new(scope.tenant_id, OP_POST).with_legal_entity(scope.legal_entity_id),
            &input,
        )?;
        if let Some(existing) = Self::find_by_key_in(&self.db, scope.tenant_id, &guard).await? {
            return Self::replay_summary(&self.db, &guard, &existing).await;
        }

        let txn = self.db.begin().await?;
        let book = FiscalRepository::default_book_in(&txn, scope).await?;
        let period = FiscalRepository::period_in(&txn, scope, book.id, input.entry_date).await?;

        let header = JournalHeader {
            tenant_id: scope.tenant_id,
            legal_entity_id: scope.legal_entity_id,
            book_id: book.id,
            fiscal_period_id: period.id,
            entry_date: input.entry_date,
            currency: input.currency.clone(),
            description: input.description.clone(),
            source: JournalSource::Manual,
            source_id: None,
            reversal_of_entry_id: None,
        };
        let prepared = JournalService::prepare(header, &input.lines, period.status)?;

        if !Self::insert_in(&txn, &prepared, scope.user_id, Some(&guard)).await? {
            txn.rollback().await?;
            return Self::replay_by_key(&self.db, scope.tenant_id, &guard).await;
        }
        txn.commit().await?;

        info!(
            tenant_id = %scope.tenant_id,
            journal_entry_id = %prepared.id,
            total = %prepared.total_debit_base,
            "Manual journal posted"
        );
        Ok(Idempotent::fresh(JournalSummary::from(&prepared)))
    }

    /// Reverses a journal that is not owned by a settlement or recognition run.
    ///
    /// The mirror goes through the same balance and period checks as any posting.
    ///
    /// # Errors
    ///
    /// Returns `OwnedBySource` for settlement and run journals, a state conflict when
    /// the journal is not POSTED or the reversal period is not OPEN.
    pub async fn reverse_journal(
        &self,
        scope: &RequestScope,
        id: JournalEntryId,
        key: IdempotencyKey,
        input: ReverseJournalInput,
    ) -> Result<Idempotent<JournalReversal>, StoreError> {
        let guard = GuardedRequest::new(
            key,
            IdempotencyScope::new(scope.tenant_id, OP_REVERSE)
                .with_legal_entity(scope.legal_entity_id)
                .with_resource(id.into_inner()),
            &input,
        )?;
        if let Some(existing) = Self::find_by_key_in(&self.db, scope.tenant_id, &guard).await? {
            return Self::replay_reversal(&self.db, &guard, &existing).await;
        }

        let txn = self.db.begin().await?;
        let original = Self::find_in(&txn, scope, id, true).await?;
        // A concurrent request with the same key may have committed while we waited.
        if let Some(existing) = Self::find_by_key_in(&txn, scope.tenant_id, &guard).await? {
            txn.rollback().await?;
            return Self::replay_reversal(&self.db, &guard, &existing).await;
        }

        let source: JournalSource = decode("journal_entries.source", &original.source)?;
        if !matches!(source, JournalSource::Manual | JournalSource::Reconciliation) {
            return Err(JournalError::OwnedBySource { id, owner: source }.into());
        }

        let Some(mirror) =
            Self::reverse_in(&txn, scope, &original, input.reversal_date, Some(&guard)).await?
        else {
            txn.rollback().await?;
            return Self::replay_by_key_reversal(&self.db, scope.tenant_id, &guard).await;
        };
        txn.commit().await?;

        info!(
            tenant_id = %scope.tenant_id,
            journal_entry_id = %id,
            reversal_entry_id = %mirror.id,
            "Journal reversed"
        );
        Ok(Idempotent::fresh(JournalReversal {
            original_entry_id: id,
            reversal: JournalSummary::from(&mirror),
        }))
    }

    /// Inserts a prepared journal and its lines.
    ///
    /// Returns `false` when a unique index rejected the header, which for keyed
    /// journals means a concurrent request with the same key won.
    pub(crate) async fn insert_in<C: ConnectionTrait>(
        conn: &C,
        journal: &PreparedJournal,
        created_by: UserId,
        guard: Option<&GuardedRequest>,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();
        let header = &journal.header;
        let entry = journal_entries::ActiveModel {
            id: Set(journal.id.into_inner()),
            tenant_id: Set(header.tenant_id.into_inner()),
            legal_entity_id: Set(header.legal_entity_id.into_inner()),
            book_id: Set(header.book_id.into_inner()),
            fiscal_period_id: Set(header.fiscal_period_id.into_inner()),
            entry_date: Set(header.entry_date),
            currency: Set(header.currency.to_string()),
            description: Set(header.description.clone()),
            source: Set(header.source.as_str().to_string()),
            source_id: Set(header.source_id),
            status: Set(journal.status.as_str().to_string()),
            total_debit_base: Set(journal.total_debit_base),
            total_credit_base: Set(journal.total_credit_base),
            reversal_of_entry_id: Set(header.reversal_of_entry_id.map(JournalEntryId::into_inner)),
            reversed_by_entry_id: Set(None),
            idempotency_scope: Set(guard.map(|g| g.scope().to_string())),
            idempotency_key: Set(guard.map(|g| g.key().to_string())),
            request_hash: Set(guard.map(|g| g.fingerprint().to_string())),
            created_by: Set(created_by.into_inner()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let inserted = journal_entries::Entity::insert(entry)
            .on_conflict(OnConflict::new().do_nothing().to_owned())
            .exec_without_returning(conn)
            .await?;
        if inserted == 0 {
            return Ok(false);
        }

        let lines = journal.lines.iter().map(|line| journal_lines::ActiveModel {
            id: Set(Uuid::now_v7()),
            journal_entry_id: Set(journal.id.into_inner()),
            line_no: Set(line.line_no),
            account_id: Set(line.account_id.into_inner()),
            debit_base: Set(line.debit_base),
            credit_base: Set(line.credit_base),
            amount_txn: Set(line.amount_txn),
            memo: Set(line.memo.clone()),
        });
        journal_lines::Entity::insert_many(lines)
            .exec_without_returning(conn)
            .await?;
        Ok(true)
    }

    /// Mirrors `original` into the period of `reversal_date` and flips it to REVERSED.
    ///
    /// The caller must hold the row lock on `original`. Returns `None` when the
    /// mirror insert lost to a concurrent request with the same key.
    pub(crate) async fn reverse_in<C: ConnectionTrait>(
        conn: &C,
        scope: &RequestScope,
        original: &journal_entries::Model,
        reversal_date: NaiveDate,
        guard: Option<&GuardedRequest>,
    ) -> Result<Option<PreparedJournal>, StoreError> {
        let posted = Self::hydrate_in(conn, original).await?;
        let period =
            FiscalRepository::period_in(conn, scope, posted.header.book_id, reversal_date).await?;
        let mirror = JournalService::mirror(&posted, period.id, reversal_date, period.status)
            .inspect_err(|e| {
                warn!(journal_entry_id = %posted.id, error = %e, "Journal reversal rejected");
            })?;

        if !Self::insert_in(conn, &mirror, scope.user_id, guard).await? {
            return Ok(None);
        }
        Self::mark_reversed_in(conn, posted.id, mirror.id).await?;
        Ok(Some(mirror))
    }

    /// Flips a POSTED journal to REVERSED.
    ///
    /// The `status = 'POSTED'` guard makes a second concurrent reversal observe zero
    /// updated rows instead of overwriting the forward link.
    pub(crate) async fn mark_reversed_in<C: ConnectionTrait>(
        conn: &C,
        id: JournalEntryId,
        reversed_by: JournalEntryId,
    ) -> Result<(), StoreError> {
        let result = journal_entries::Entity::update_many()
            .col_expr(
                journal_entries::Column::Status,
                Expr::value(JournalStatus::Reversed.as_str()),
            )
            .col_expr(
                journal_entries::Column::ReversedByEntryId,
                Expr::value(reversed_by.into_inner()),
            )
            .col_expr(
                journal_entries::Column::UpdatedAt,
                Expr::current_timestamp().into(),
            )
            .filter(journal_entries::Column::Id.eq(id.into_inner()))
            .filter(journal_entries::Column::Status.eq(JournalStatus::Posted.as_str()))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(JournalError::NotReversible {
                id,
                status: JournalStatus::Reversed,
            }
            .into());
        }
        Ok(())
    }

    /// Finds a journal in the caller's scope, optionally under `FOR UPDATE`.
    pub(crate) async fn find_in<C: ConnectionTrait>(
        conn: &C,
        scope: &RequestScope,
        id: JournalEntryId,
        lock: bool,
    ) -> Result<journal_entries::Model, StoreError> {
        let mut query = journal_entries::Entity::find_by_id(id.into_inner())
            .filter(journal_entries::Column::TenantId.eq(scope.tenant_id.into_inner()))
            .filter(journal_entries::Column::LegalEntityId.eq(scope.legal_entity_id.into_inner()));
        if lock {
            query = query.lock_exclusive();
        }
        query
            .one(conn)
            .await?
            .ok_or_else(|| StoreError::not_found("Journal entry", id))
    }

    /// Finds the journal stamped with a key.
    pub(crate) async fn find_by_key_in<C: ConnectionTrait>(
        conn: &C,
        tenant_id: TenantId,
        guard: &GuardedRequest,
    ) -> Result<Option<journal_entries::Model>, StoreError> {
        Ok(journal_entries::Entity::find()
            .filter(journal_entries::Column::TenantId.eq(tenant_id.into_inner()))
            .filter(journal_entries::Column::IdempotencyScope.eq(guard.scope()))
            .filter(journal_entries::Column::IdempotencyKey.eq(guard.key()))
            .one(conn)
            .await?)
    }

    /// Loads the lines of a stored journal.
    pub(crate) async fn hydrate_in<C: ConnectionTrait>(
        conn: &C,
        model: &journal_entries::Model,
    ) -> Result<PostedJournal, StoreError> {
        let lines = journal_lines::Entity::find()
            .filter(journal_lines::Column::JournalEntryId.eq(model.id))
            .order_by_asc(journal_lines::Column::LineNo)
            .all(conn)
            .await?
            .into_iter()
            .map(|line| PreparedLine {
                line_no: line.line_no,
                account_id: AccountId::from_uuid(line.account_id),
                debit_base: line.debit_base,
                credit_base: line.credit_base,
                amount_txn: line.amount_txn,
                memo: line.memo,
            })
            .collect();

        Ok(PostedJournal {
            id: JournalEntryId::from_uuid(model.id),
            header: JournalHeader {
                tenant_id: TenantId::from_uuid(model.tenant_id),
                legal_entity_id: LegalEntityId::from_uuid(model.legal_entity_id),
                book_id: BookId::from_uuid(model.book_id),
                fiscal_period_id: FiscalPeriodId::from_uuid(model.fiscal_period_id),
                entry_date: model.entry_date,
                currency: decode("journal_entries.currency", &model.currency)?,
                description: model.description.clone(),
                source: decode("journal_entries.source", &model.source)?,
                source_id: model.source_id,
                reversal_of_entry_id: model.reversal_of_entry_id.map(JournalEntryId::from_uuid),
            },
            status: decode("journal_entries.status", &model.status)?,
            reversed_by_entry_id: model.reversed_by_entry_id.map(JournalEntryId::from_uuid),
            lines,
            total_debit_base: model.total_debit_base,
            total_credit_base: model.total_credit_base,
        })
    }

    async fn replay_summary(
        db: &DatabaseConnection,
        guard: &GuardedRequest,
        existing: &journal_entries::Model,
    ) -> Result<Idempotent<JournalSummary>, StoreError> {
        guard.verify(
            existing.idempotency_scope.as_deref().unwrap_or_default(),
            existing.request_hash.as_deref(),
        )?;
        let journal = Self::hydrate_in(db, existing).await?;
        info!(journal_entry_id = %journal.id, key = guard.key(), "Idempotent replay of journal");
        Ok(Idempotent::replayed(JournalSummary::from(&journal)))
    }

    async fn replay_by_key(
        db: &DatabaseConnection,
        tenant_id: TenantId,
        guard: &GuardedRequest,
    ) -> Result<Idempotent<JournalSummary>, StoreError> {
        let existing = Self::find_by_key_in(db, tenant_id, guard)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("key '{}' conflicted but no row", guard.key())))?;
        Self::replay_summary(db, guard, &existing).await
    }

    async fn replay_reversal(
        db: &DatabaseConnection,
        guard: &GuardedRequest,
        mirror: &journal_entries::Model,
    ) -> Result<Idempotent<JournalReversal>, StoreError> {
        guard.verify(
            mirror.idempotency_scope.as_deref().unwrap_or_default(),
            mirror.request_hash.as_deref(),
        )?;
        let original_entry_id = mirror
            .reversal_of_entry_id
            .map(JournalEntryId::from_uuid)
            .ok_or_else(|| StoreError::Corrupt(format!("journal {} is not a reversal", mirror.id)))?;
        let journal = Self::hydrate_in(db, mirror).await?;
        info!(reversal_entry_id = %journal.id, key = guard.key(), "Idempotent replay of reversal");
        Ok(Idempotent::replayed(JournalReversal {
            original_entry_id,
            reversal: JournalSummary::from(&journal),
        }))
    }

    async fn replay_by_key_reversal(
        db: &DatabaseConnection,
        tenant_id: TenantId,
        guard: &GuardedRequest,
    ) -> Result<Idempotent<JournalReversal>, StoreError> {
        let existing = Self::find_by_key_in(db, tenant_id, guard)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("key '{}' conflicted but no row", guard.key())))?;
        Self::replay_reversal(db, guard, &existing).await
    }
}
