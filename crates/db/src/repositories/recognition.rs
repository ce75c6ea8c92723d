//! Recognition schedules and runs.
//!
//! Post and settle stamp the caller's key on the run journal; reverse stamps it
//! on the reversal run. Every transition locks the run row first, so two
//! concurrent calls on one run serialize and the loser observes the new status
//! (or replays when it carried the same key).

use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use defter_core::fx::{FxPolicy, FxSnapshot};
use defter_core::idempotency::{IdempotencyError, IdempotencyKey, IdempotencyScope, Idempotent};
use defter_core::journal::{JournalHeader, JournalService, JournalSource, PreparedJournal};
use defter_core::recognition::{
    AccountFamily, AccrualRequest, ContractLine, GenerationWindow, MaturityBucket,
    PlannedRunLine, PlannedSubledgerEntry, RecognitionError, RecognitionMethod, RunLifecycle,
    RunStatus, ScheduleDraft, ScheduleGenerator, StoredRunLine, TwoBucketPosting,
};
use defter_shared::config::PostingConfig;
use defter_shared::types::{
    AccountId, ContractLineId, CurrencyCode, FiscalPeriodId, JournalEntryId, RequestScope, RunId,
    RunLineId, ScheduleId,
};

use super::error::{StoreError, decode};
use super::exchange_rate::ExchangeRateRepository;
use super::fiscal::FiscalRepository;
use super::idempotency::GuardedRequest;
use super::journal::JournalRepository;
use super::purpose::PurposeAccountRepository;
use crate::entities::{
    contract_lines, revenue_recognition_run_lines as run_lines, revenue_recognition_runs as runs,
    revenue_recognition_schedules as schedules, subledger_entries,
};

const OP_POST: &str = "recognition.post";
const OP_SETTLE: &str = "recognition.settle";
const OP_REVERSE: &str = "recognition.reverse";

/// Run line status while its journal is live.
const LINE_POSTED: &str = "POSTED";
/// Run line status once the run is reversed.
const LINE_REVERSED: &str = "REVERSED";

/// Input for a new contract line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContractLineInput {
    /// Balance family.
    pub family: AccountFamily,
    /// Spread method.
    pub method: RecognitionMethod,
    /// Service start.
    pub start_date: NaiveDate,
    /// Service end.
    pub end_date: NaiveDate,
    /// Total amount in line currency.
    pub amount: Decimal,
    /// Line currency.
    pub currency: CurrencyCode,
    /// Free text.
    #[serde(default)]
    pub description: Option<String>,
    /// Billing rate; looked up at the start date when absent.
    #[serde(default)]
    pub fx_rate_override: Option<Decimal>,
}

/// Input of a generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSchedulesInput {
    /// Line to spread.
    pub contract_line_id: ContractLineId,
    /// Date maturity buckets are measured from.
    pub reference_date: NaiveDate,
    /// Restricts generated rows to one fiscal period.
    #[serde(default)]
    pub fiscal_period_id: Option<FiscalPeriodId>,
    /// Skip rows that already exist instead of failing.
    #[serde(default)]
    pub regenerate_missing_only: bool,
}

/// Input for a direct accrual.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccrualInput {
    /// `ACCRUED_REVENUE` or `ACCRUED_EXPENSE`.
    pub family: AccountFamily,
    /// Amount in transaction currency.
    pub amount: Decimal,
    /// Transaction currency.
    pub currency: CurrencyCode,
    /// Date the accrual matures.
    pub maturity_date: NaiveDate,
    /// Date the bucket is measured from.
    pub reference_date: NaiveDate,
    /// Caller reference; one accrual per reference and maturity month.
    pub reference: String,
    /// Rate to book the base amount at.
    #[serde(default)]
    pub fx_rate_override: Option<Decimal>,
}

/// Input of a post call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRunInput {
    /// Journal date; defaults to the schedule maturity date.
    #[serde(default)]
    pub posting_date: Option<NaiveDate>,
}

/// Input of a settle call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRunInput {
    /// Settlement date; must not precede maturity.
    pub settlement_date: NaiveDate,
}

/// Input of a reverse call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseRunInput {
    /// Date of the mirror journal.
    pub reversal_date: NaiveDate,
}

/// A schedule row with its run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleView {
    /// Schedule id.
    pub schedule_id: ScheduleId,
    /// Run created for the row.
    pub run_id: RunId,
    /// Balance family.
    pub family: AccountFamily,
    /// Maturity bucket.
    pub bucket: MaturityBucket,
    /// Maturity date.
    pub maturity_date: NaiveDate,
    /// Amount in transaction currency.
    pub amount_txn: Decimal,
    /// Amount in base currency.
    pub amount_base: Decimal,
    /// Long-term rows post a reclass leg.
    pub reclass_required: bool,
    /// Generation uid.
    pub source_row_uid: String,
}

/// Outcome of a generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSummary {
    /// Contract line.
    pub contract_line_id: ContractLineId,
    /// Rows created by this call.
    pub generated: usize,
    /// Rows in the window that already existed.
    pub skipped: usize,
    /// The created rows.
    pub schedules: Vec<ScheduleView>,
}

/// One stored run line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLineView {
    /// Run line id.
    pub id: RunLineId,
    /// Position, equal to the journal line number.
    pub line_no: i32,
    /// Purpose slot.
    pub purpose_code: String,
    /// GL account.
    pub account_id: AccountId,
    /// Leg.
    pub kind: String,
    /// Signed transaction amount.
    pub amount_txn: Decimal,
    /// Signed base amount.
    pub amount_base: Decimal,
    /// POSTED or REVERSED.
    pub status: String,
    /// Line this one mirrors.
    pub reversal_of_run_line_id: Option<RunLineId>,
}

/// A run with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunView {
    /// Run id.
    pub run_id: RunId,
    /// Schedule row.
    pub schedule_id: ScheduleId,
    /// Current status.
    pub status: RunStatus,
    /// Posted journal.
    pub journal_entry_id: Option<JournalEntryId>,
    /// Set on reversal runs.
    pub reversal_of_run_id: Option<RunId>,
    /// Set on reversed runs.
    pub reversed_by_run_id: Option<RunId>,
    /// Run lines in journal order.
    pub lines: Vec<RunLineView>,
    /// Number of subledger rows written for the run.
    pub subledger_entries: usize,
}

/// Recognition repository.
#[derive(Debug, Clone)]
pub struct RecognitionRepository {
    db: DatabaseConnection,
    config: PostingConfig,
}

impl RecognitionRepository {
    /// Creates a new recognition repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection, config: PostingConfig) -> Self {
        Self { db, config }
    }

    /// Stores a contract line with its billing rate snapshot.
    ///
    /// # Errors
    ///
    /// Returns `InvalidContractLine` for a non-positive amount or an empty date
    /// range, and an FX error when no rate can be resolved.
    pub async fn create_contract_line(
        &self,
        scope: &RequestScope,
        input: CreateContractLineInput,
    ) -> Result<ContractLine, StoreError> {
        if input.amount <= Decimal::ZERO {
            return Err(RecognitionError::InvalidContractLine(format!(
                "amount must be positive, got {}",
                input.amount
            ))
            .into());
        }
        if input.end_date < input.start_date {
            return Err(RecognitionError::InvalidContractLine(format!(
                "end date {} is before start date {}",
                input.end_date, input.start_date
            ))
            .into());
        }

        let fx = self
            .rate_in(&self.db, scope, &input.currency, input.start_date, input.fx_rate_override)
            .await?;
        let line = ContractLine {
            id: ContractLineId::new(),
            family: input.family,
            method: input.method,
            start_date: input.start_date,
            end_date: input.end_date,
            amount: input.amount,
            currency: input.currency,
            fx,
        };

        contract_lines::ActiveModel {
            id: Set(line.id.into_inner()),
            tenant_id: Set(scope.tenant_id.into_inner()),
            legal_entity_id: Set(scope.legal_entity_id.into_inner()),
            family: Set(line.family.as_str().to_string()),
            method: Set(line.method.as_str().to_string()),
            start_date: Set(line.start_date),
            end_date: Set(line.end_date),
            amount: Set(line.amount),
            currency: Set(line.currency.to_string()),
            fx_rate: Set(fx.rate),
            fx_provenance: Set(fx.provenance.as_str().to_string()),
            fx_rate_date: Set(fx.rate_date),
            description: Set(input.description),
            created_at: Set(Utc::now().into()),
        }
        .insert(&self.db)
        .await?;

        info!(
            tenant_id = %scope.tenant_id,
            contract_line_id = %line.id,
            family = %line.family,
            "Contract line created"
        );
        Ok(line)
    }

    /// Generates schedule rows for a contract line, one DRAFT run per row.
    ///
    /// The contract line is locked for the duration, so concurrent generation
    /// calls for one line never insert the same bucket twice.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyGenerated` when rows exist in the window and
    /// `regenerate_missing_only` is false.
    pub async fn generate_schedules(
        &self,
        scope: &RequestScope,
        input: GenerateSchedulesInput,
    ) -> Result<GenerationSummary, StoreError> {
        let txn = self.db.begin().await?;
        let model = contract_lines::Entity::find_by_id(input.contract_line_id.into_inner())
            .filter(contract_lines::Column::TenantId.eq(scope.tenant_id.into_inner()))
            .filter(contract_lines::Column::LegalEntityId.eq(scope.legal_entity_id.into_inner()))
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| StoreError::not_found("Contract line", input.contract_line_id))?;
        let line = to_contract_line(&model)?;

        let window = match input.fiscal_period_id {
            Some(id) => {
                let period = FiscalRepository::period_by_id_in(&txn, scope, id).await?;
                Some(GenerationWindow {
                    start: period.start_date,
                    end: period.end_date,
                })
            }
            None => None,
        };

        let existing: HashSet<String> = schedules::Entity::find()
            .filter(schedules::Column::TenantId.eq(scope.tenant_id.into_inner()))
            .filter(schedules::Column::ContractLineId.eq(line.id.into_inner()))
            .all(&txn)
            .await?
            .into_iter()
            .map(|s| s.source_row_uid)
            .collect();

        let outcome = ScheduleGenerator::generate(
            &line,
            input.reference_date,
            window,
            &existing,
            input.regenerate_missing_only,
            self.config.base_scale,
        )?;

        let mut views = Vec::with_capacity(outcome.drafts.len());
        for draft in &outcome.drafts {
            views.push(Self::insert_schedule_in(&txn, scope, draft).await?);
        }
        txn.commit().await?;

        info!(
            tenant_id = %scope.tenant_id,
            contract_line_id = %line.id,
            generated = outcome.generated(),
            skipped = outcome.skipped,
            "Schedules generated"
        );
        Ok(GenerationSummary {
            contract_line_id: line.id,
            generated: outcome.generated(),
            skipped: outcome.skipped,
            schedules: views,
        })
    }

    /// Creates the schedule row and DRAFT run of a direct accrual.
    ///
    /// The schedule's unique `source_row_uid` makes this idempotent per
    /// reference and maturity month: a repeat returns the stored row as a replay.
    ///
    /// # Errors
    ///
    /// Returns `NotAccrualFamily` for consuming families, and a payload mismatch
    /// when the reference is reused with different amounts or dates.
    pub async fn create_accrual(
        &self,
        scope: &RequestScope,
        input: CreateAccrualInput,
    ) -> Result<Idempotent<ScheduleView>, StoreError> {
        let fx = self
            .rate_in(&self.db, scope, &input.currency, input.reference_date, input.fx_rate_override)
            .await?;
        let request = AccrualRequest {
            family: input.family,
            amount: input.amount,
            currency: input.currency,
            maturity_date: input.maturity_date,
            reference_date: input.reference_date,
            reference: input.reference,
        };
        let draft = ScheduleGenerator::accrual(&request, fx.rate, self.config.base_scale)?;

        let txn = self.db.begin().await?;
        let inserted = schedules::Entity::insert(Self::schedule_row(scope, ScheduleId::new(), &draft))
            .on_conflict(OnConflict::new().do_nothing().to_owned())
            .exec_without_returning(&txn)
            .await?;
        if inserted == 0 {
            txn.rollback().await?;
            return self.replay_accrual(scope, &request, &draft).await;
        }

        let schedule = schedules::Entity::find()
            .filter(schedules::Column::TenantId.eq(scope.tenant_id.into_inner()))
            .filter(schedules::Column::LegalEntityId.eq(scope.legal_entity_id.into_inner()))
            .filter(schedules::Column::SourceRowUid.eq(draft.source_row_uid.as_str()))
            .one(&txn)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("accrual {} vanished", draft.source_row_uid)))?;
        let run_id = Self::insert_draft_run_in(&txn, scope, ScheduleId::from_uuid(schedule.id)).await?;
        txn.commit().await?;

        info!(
            tenant_id = %scope.tenant_id,
            schedule_id = %schedule.id,
            run_id = %run_id,
            family = %draft.family,
            "Accrual created"
        );
        Ok(Idempotent::fresh(to_schedule_view(&schedule, run_id)?))
    }

    /// Fetches a run with its lines.
    ///
    /// # Errors
    ///
    /// Returns `RunNotFound` outside the caller's tenant and legal entity.
    pub async fn get_run(&self, scope: &RequestScope, run_id: RunId) -> Result<RunView, StoreError> {
        Self::load_run_in(&self.db, scope, run_id).await
    }

    /// Posts a DRAFT run through the two-bucket planner.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyPosted` (or the matching state error) when the run left
    /// DRAFT, a period-state error for a non-open period, and `SetupRequired`
    /// when a purpose slot the row needs is not mapped.
    pub async fn post_run(
        &self,
        scope: &RequestScope,
        run_id: RunId,
        key: IdempotencyKey,
        input: PostRunInput,
    ) -> Result<Idempotent<RunView>, StoreError> {
        let guard = Self::guard(scope, OP_POST, run_id, key, &input)?;
        if let Some(journal) = JournalRepository::find_by_key_in(&self.db, scope.tenant_id, &guard).await? {
            return self.replay_journal(scope, &guard, &journal).await;
        }

        let txn = self.db.begin().await?;
        let run = Self::lock_run_in(&txn, scope, run_id).await?;
        if let Some(journal) = JournalRepository::find_by_key_in(&txn, scope.tenant_id, &guard).await? {
            txn.rollback().await?;
            return self.replay_journal(scope, &guard, &journal).await;
        }

        let status: RunStatus = decode("revenue_recognition_runs.status", &run.status)?;
        RunLifecycle::check_post(run_id, status)?;
        let schedule = Self::schedule_in(&txn, &run).await?;
        let posting_date = input.posting_date.unwrap_or(schedule.maturity_date);

        let Some(journal) =
            self.book_run_in(&txn, scope, &run, &schedule, posting_date, &guard).await?
        else {
            txn.rollback().await?;
            return self.replay_by_key(scope, &guard).await;
        };
        Self::transition_in(&txn, &run, RunStatus::Draft, RunStatus::Posted, journal.id).await?;
        txn.commit().await?;

        info!(
            tenant_id = %scope.tenant_id,
            run_id = %run_id,
            journal_entry_id = %journal.id,
            lines = journal.lines.len(),
            "Recognition run posted"
        );
        Ok(Idempotent::fresh(Self::load_run_in(&self.db, scope, run_id).await?))
    }

    /// Settles a DRAFT accrual run at or after maturity, posting its journal.
    ///
    /// # Errors
    ///
    /// Returns `SettleNotSupported` for consuming families, `BeforeMaturity`
    /// for an early date, and a state conflict when the run left DRAFT.
    pub async fn settle_run(
        &self,
        scope: &RequestScope,
        run_id: RunId,
        key: IdempotencyKey,
        input: SettleRunInput,
    ) -> Result<Idempotent<RunView>, StoreError> {
        let guard = Self::guard(scope, OP_SETTLE, run_id, key, &input)?;
        if let Some(journal) = JournalRepository::find_by_key_in(&self.db, scope.tenant_id, &guard).await? {
            return self.replay_journal(scope, &guard, &journal).await;
        }

        let txn = self.db.begin().await?;
        let run = Self::lock_run_in(&txn, scope, run_id).await?;
        if let Some(journal) = JournalRepository::find_by_key_in(&txn, scope.tenant_id, &guard).await? {
            txn.rollback().await?;
            return self.replay_journal(scope, &guard, &journal).await;
        }

        let status: RunStatus = decode("revenue_recognition_runs.status", &run.status)?;
        let schedule = Self::schedule_in(&txn, &run).await?;
        let family: AccountFamily = decode("revenue_recognition_schedules.family", &schedule.family)?;
        RunLifecycle::check_settle(run_id, family, status, schedule.maturity_date, input.settlement_date)
            .inspect_err(|e| warn!(run_id = %run_id, error = %e, "Settle rejected"))?;

        let Some(journal) = self
            .book_run_in(&txn, scope, &run, &schedule, input.settlement_date, &guard)
            .await?
        else {
            txn.rollback().await?;
            return self.replay_by_key(scope, &guard).await;
        };
        Self::transition_in(&txn, &run, RunStatus::Draft, RunStatus::Settled, journal.id).await?;
        txn.commit().await?;

        info!(
            tenant_id = %scope.tenant_id,
            run_id = %run_id,
            journal_entry_id = %journal.id,
            "Accrual run settled"
        );
        Ok(Idempotent::fresh(Self::load_run_in(&self.db, scope, run_id).await?))
    }

    /// Reverses a POSTED (or SETTLED accrual) run into a new POSTED run.
    ///
    /// # Errors
    ///
    /// Returns `RUN_IS_REVERSAL` when `run_id` is itself a mirror run,
    /// `AlreadyReversed` or `InvalidTransition` from the wrong state,
    /// `BeforeMaturity` for early accrual reversals, and a period-state error
    /// when the reversal period is not OPEN. Nothing is written on failure.
    pub async fn reverse_run(
        &self,
        scope: &RequestScope,
        run_id: RunId,
        key: IdempotencyKey,
        input: ReverseRunInput,
    ) -> Result<Idempotent<RunView>, StoreError> {
        let guard = Self::guard(scope, OP_REVERSE, run_id, key, &input)?;
        if let Some(reversal) = Self::find_run_by_key_in(&self.db, scope, &guard).await? {
            return self.replay_run(scope, &guard, &reversal).await;
        }

        let txn = self.db.begin().await?;
        let original = Self::lock_run_in(&txn, scope, run_id).await?;
        if let Some(reversal) = Self::find_run_by_key_in(&txn, scope, &guard).await? {
            txn.rollback().await?;
            return self.replay_run(scope, &guard, &reversal).await;
        }

        let status: RunStatus = decode("revenue_recognition_runs.status", &original.status)?;
        let schedule = Self::schedule_in(&txn, &original).await?;
        let family: AccountFamily = decode("revenue_recognition_schedules.family", &schedule.family)?;
        RunLifecycle::check_reverse(
            run_id,
            original.reversal_of_run_id.map(RunId::from_uuid),
            family,
            status,
            schedule.maturity_date,
            input.reversal_date,
        )
        .inspect_err(|e| warn!(run_id = %run_id, error = %e, "Reverse rejected"))?;
        let journal_id = original
            .journal_entry_id
            .map(JournalEntryId::from_uuid)
            .ok_or_else(|| StoreError::Corrupt(format!("run {run_id} is {status} without a journal")))?;

        let reversal_id = RunId::new();
        let now = Utc::now();
        let claimed = runs::Entity::insert(runs::ActiveModel {
            id: Set(reversal_id.into_inner()),
            tenant_id: Set(scope.tenant_id.into_inner()),
            legal_entity_id: Set(scope.legal_entity_id.into_inner()),
            schedule_id: Set(original.schedule_id),
            status: Set(RunStatus::Posted.as_str().to_string()),
            journal_entry_id: Set(None),
            reversal_of_run_id: Set(Some(original.id)),
            reversed_by_run_id: Set(None),
            posted_at: Set(Some(now.into())),
            settled_at: Set(None),
            reversed_at: Set(None),
            idempotency_scope: Set(Some(guard.scope().to_string())),
            idempotency_key: Set(Some(guard.key().to_string())),
            request_hash: Set(Some(guard.fingerprint().to_string())),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        })
        .on_conflict(OnConflict::new().do_nothing().to_owned())
        .exec_without_returning(&txn)
        .await?;
        if claimed == 0 {
            txn.rollback().await?;
            return match Self::find_run_by_key_in(&self.db, scope, &guard).await? {
                Some(reversal) => self.replay_run(scope, &guard, &reversal).await,
                None => Err(RecognitionError::AlreadyReversed(run_id).into()),
            };
        }

        let original_journal = JournalRepository::find_in(&txn, scope, journal_id, true).await?;
        let mirror = JournalRepository::reverse_in(&txn, scope, &original_journal, input.reversal_date, None)
            .await?
            .ok_or(RecognitionError::AlreadyReversed(run_id))?;

        runs::ActiveModel {
            id: Set(reversal_id.into_inner()),
            journal_entry_id: Set(Some(mirror.id.into_inner())),
            ..Default::default()
        }
        .update(&txn)
        .await?;

        let stored = Self::stored_lines_in(&txn, original.id).await?;
        let mirrored = RunLifecycle::mirror_lines(&stored);
        let lines = mirrored.iter().enumerate().map(|(i, m)| {
            Self::run_line_row(reversal_id, i, &m.line, Some(m.reversal_of_run_line_id))
        });
        run_lines::Entity::insert_many(lines)
            .exec_without_returning(&txn)
            .await?;

        let entries = Self::stored_subledger_in(&txn, original.id).await?;
        let schedule_id = ScheduleId::from_uuid(schedule.id);
        Self::insert_subledger_in(
            &txn,
            scope,
            reversal_id,
            schedule_id,
            mirror.id,
            &RunLifecycle::mirror_subledger(&entries),
        )
        .await?;

        let flipped = runs::Entity::update_many()
            .col_expr(runs::Column::Status, Expr::value(RunStatus::Reversed.as_str()))
            .col_expr(runs::Column::ReversedByRunId, Expr::value(reversal_id.into_inner()))
            .col_expr(runs::Column::ReversedAt, Expr::current_timestamp().into())
            .col_expr(runs::Column::UpdatedAt, Expr::current_timestamp().into())
            .filter(runs::Column::Id.eq(original.id))
            .filter(runs::Column::Status.eq(status.as_str()))
            .exec(&txn)
            .await?;
        if flipped.rows_affected == 0 {
            return Err(RecognitionError::AlreadyReversed(run_id).into());
        }
        run_lines::Entity::update_many()
            .col_expr(run_lines::Column::Status, Expr::value(LINE_REVERSED))
            .filter(run_lines::Column::RunId.eq(original.id))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        info!(
            tenant_id = %scope.tenant_id,
            run_id = %run_id,
            reversal_run_id = %reversal_id,
            reversal_entry_id = %mirror.id,
            "Recognition run reversed"
        );
        Ok(Idempotent::fresh(Self::load_run_in(&self.db, scope, reversal_id).await?))
    }

    /// Plans, posts and traces the journal of a run. `None` means the keyed
    /// journal insert lost to a concurrent request.
    async fn book_run_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &RequestScope,
        run: &runs::Model,
        schedule: &schedules::Model,
        date: NaiveDate,
        guard: &GuardedRequest,
    ) -> Result<Option<PreparedJournal>, StoreError> {
        let draft = to_draft(schedule)?;
        let accounts = PurposeAccountRepository::load_in(conn, scope).await?;
        let plan = TwoBucketPosting::plan(&draft, &accounts)
            .inspect_err(|e| warn!(run_id = %run.id, error = %e, "Run posting rejected"))?;

        let book = FiscalRepository::default_book_in(conn, scope).await?;
        let period = FiscalRepository::period_in(conn, scope, book.id, date).await?;
        let header = JournalHeader {
            tenant_id: scope.tenant_id,
            legal_entity_id: scope.legal_entity_id,
            book_id: book.id,
            fiscal_period_id: period.id,
            entry_date: date,
            currency: draft.currency.clone(),
            description: format!(
                "{} {} {}",
                draft.family,
                draft.bucket.as_str(),
                draft.source_row_uid
            ),
            source: JournalSource::Recognition,
            source_id: Some(run.id),
            reversal_of_entry_id: None,
        };
        let journal = JournalService::prepare(header, &plan.posting_lines(), period.status)?;
        if !JournalRepository::insert_in(conn, &journal, scope.user_id, Some(guard)).await? {
            return Ok(None);
        }

        let run_id = RunId::from_uuid(run.id);
        let lines = plan
            .lines
            .iter()
            .enumerate()
            .map(|(i, line)| Self::run_line_row(run_id, i, line, None));
        run_lines::Entity::insert_many(lines)
            .exec_without_returning(conn)
            .await?;
        Self::insert_subledger_in(
            conn,
            scope,
            run_id,
            ScheduleId::from_uuid(schedule.id),
            journal.id,
            &plan.subledger,
        )
        .await?;
        Ok(Some(journal))
    }

    /// Moves a locked run out of `from`, recording its journal.
    async fn transition_in<C: ConnectionTrait>(
        conn: &C,
        run: &runs::Model,
        from: RunStatus,
        to: RunStatus,
        journal_id: JournalEntryId,
    ) -> Result<(), StoreError> {
        let stamp = match to {
            RunStatus::Settled => runs::Column::SettledAt,
            _ => runs::Column::PostedAt,
        };
        let result = runs::Entity::update_many()
            .col_expr(runs::Column::Status, Expr::value(to.as_str()))
            .col_expr(runs::Column::JournalEntryId, Expr::value(journal_id.into_inner()))
            .col_expr(stamp, Expr::current_timestamp().into())
            .col_expr(runs::Column::UpdatedAt, Expr::current_timestamp().into())
            .filter(runs::Column::Id.eq(run.id))
            .filter(runs::Column::Status.eq(from.as_str()))
            .exec(conn)
            .await?;
        if result.rows_affected == 0 {
            return Err(RecognitionError::InvalidTransition { from, to }.into());
        }
        Ok(())
    }

    fn guard<T: Serialize>(
        scope: &RequestScope,
        operation: &'static str,
        run_id: RunId,
        key: IdempotencyKey,
        input: &T,
    ) -> Result<GuardedRequest, StoreError> {
        GuardedRequest::new(
            key,
            IdempotencyScope::new(scope.tenant_id, operation)
                .with_legal_entity(scope.legal_entity_id)
                .with_resource(run_id.into_inner()),
            input,
        )
    }

    async fn rate_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &RequestScope,
        currency: &CurrencyCode,
        date: NaiveDate,
        override_rate: Option<Decimal>,
    ) -> Result<FxSnapshot, StoreError> {
        let book = FiscalRepository::default_book_in(conn, scope).await?;
        ExchangeRateRepository::resolve_in(
            conn,
            scope.tenant_id,
            currency,
            &book.base_currency,
            date,
            FxPolicy::from_config(&self.config),
            override_rate,
        )
        .await
    }

    async fn insert_schedule_in<C: ConnectionTrait>(
        conn: &C,
        scope: &RequestScope,
        draft: &ScheduleDraft,
    ) -> Result<ScheduleView, StoreError> {
        let schedule = Self::schedule_row(scope, ScheduleId::new(), draft)
            .insert(conn)
            .await?;
        let run_id = Self::insert_draft_run_in(conn, scope, ScheduleId::from_uuid(schedule.id)).await?;
        to_schedule_view(&schedule, run_id)
    }

    fn schedule_row(scope: &RequestScope, id: ScheduleId, draft: &ScheduleDraft) -> schedules::ActiveModel {
        schedules::ActiveModel {
            id: Set(id.into_inner()),
            tenant_id: Set(scope.tenant_id.into_inner()),
            legal_entity_id: Set(scope.legal_entity_id.into_inner()),
            contract_line_id: Set(draft.contract_line_id.map(ContractLineId::into_inner)),
            family: Set(draft.family.as_str().to_string()),
            bucket: Set(draft.bucket.as_str().to_string()),
            maturity_date: Set(draft.maturity_date),
            amount_txn: Set(draft.amount_txn),
            amount_base: Set(draft.amount_base),
            currency: Set(draft.currency.to_string()),
            fx_rate: Set(draft.fx_rate),
            reclass_required: Set(draft.reclass_required),
            source_row_uid: Set(draft.source_row_uid.clone()),
            created_at: Set(Utc::now().into()),
        }
    }

    async fn insert_draft_run_in<C: ConnectionTrait>(
        conn: &C,
        scope: &RequestScope,
        schedule_id: ScheduleId,
    ) -> Result<RunId, StoreError> {
        let id = RunId::new();
        let now = Utc::now();
        runs::ActiveModel {
            id: Set(id.into_inner()),
            tenant_id: Set(scope.tenant_id.into_inner()),
            legal_entity_id: Set(scope.legal_entity_id.into_inner()),
            schedule_id: Set(schedule_id.into_inner()),
            status: Set(RunStatus::Draft.as_str().to_string()),
            journal_entry_id: Set(None),
            reversal_of_run_id: Set(None),
            reversed_by_run_id: Set(None),
            posted_at: Set(None),
            settled_at: Set(None),
            reversed_at: Set(None),
            idempotency_scope: Set(None),
            idempotency_key: Set(None),
            request_hash: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(conn)
        .await?;
        Ok(id)
    }

    fn run_line_row(
        run_id: RunId,
        index: usize,
        line: &PlannedRunLine,
        reversal_of: Option<RunLineId>,
    ) -> run_lines::ActiveModel {
        run_lines::ActiveModel {
            id: Set(RunLineId::new().into_inner()),
            run_id: Set(run_id.into_inner()),
            line_no: Set(i32::try_from(index + 1).unwrap_or(i32::MAX)),
            purpose_code: Set(line.purpose.as_str().to_string()),
            account_id: Set(line.account_id.into_inner()),
            kind: Set(line.kind.as_str().to_string()),
            amount_txn: Set(line.amount_txn),
            amount_base: Set(line.amount_base),
            status: Set(LINE_POSTED.to_string()),
            reversal_of_run_line_id: Set(reversal_of.map(RunLineId::into_inner)),
        }
    }

    async fn insert_subledger_in<C: ConnectionTrait>(
        conn: &C,
        scope: &RequestScope,
        run_id: RunId,
        schedule_id: ScheduleId,
        journal_id: JournalEntryId,
        entries: &[PlannedSubledgerEntry],
    ) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        let rows = entries.iter().map(|e| subledger_entries::ActiveModel {
            id: Set(Uuid::now_v7()),
            tenant_id: Set(scope.tenant_id.into_inner()),
            legal_entity_id: Set(scope.legal_entity_id.into_inner()),
            run_id: Set(run_id.into_inner()),
            schedule_id: Set(schedule_id.into_inner()),
            journal_entry_id: Set(journal_id.into_inner()),
            kind: Set(e.kind.as_str().to_string()),
            debit_account_id: Set(e.debit_account_id.into_inner()),
            credit_account_id: Set(e.credit_account_id.into_inner()),
            amount_txn: Set(e.amount_txn),
            amount_base: Set(e.amount_base),
            created_at: Set(now.into()),
        });
        subledger_entries::Entity::insert_many(rows)
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }

    async fn stored_lines_in<C: ConnectionTrait>(
        conn: &C,
        run_id: Uuid,
    ) -> Result<Vec<StoredRunLine>, StoreError> {
        run_lines::Entity::find()
            .filter(run_lines::Column::RunId.eq(run_id))
            .order_by_asc(run_lines::Column::LineNo)
            .all(conn)
            .await?
            .into_iter()
            .map(|row| {
                Ok(StoredRunLine {
                    id: RunLineId::from_uuid(row.id),
                    line: PlannedRunLine {
                        purpose: decode("run_lines.purpose_code", &row.purpose_code)?,
                        account_id: AccountId::from_uuid(row.account_id),
                        kind: decode("run_lines.kind", &row.kind)?,
                        amount_txn: row.amount_txn,
                        amount_base: row.amount_base,
                    },
                })
            })
            .collect()
    }

    async fn stored_subledger_in<C: ConnectionTrait>(
        conn: &C,
        run_id: Uuid,
    ) -> Result<Vec<PlannedSubledgerEntry>, StoreError> {
        subledger_entries::Entity::find()
            .filter(subledger_entries::Column::RunId.eq(run_id))
            .order_by_asc(subledger_entries::Column::Id)
            .all(conn)
            .await?
            .into_iter()
            .map(|row| {
                Ok(PlannedSubledgerEntry {
                    kind: decode("subledger_entries.kind", &row.kind)?,
                    debit_account_id: AccountId::from_uuid(row.debit_account_id),
                    credit_account_id: AccountId::from_uuid(row.credit_account_id),
                    amount_txn: row.amount_txn,
                    amount_base: row.amount_base,
                })
            })
            .collect()
    }

    async fn lock_run_in<C: ConnectionTrait>(
        conn: &C,
        scope: &RequestScope,
        run_id: RunId,
    ) -> Result<runs::Model, StoreError> {
        runs::Entity::find_by_id(run_id.into_inner())
            .filter(runs::Column::TenantId.eq(scope.tenant_id.into_inner()))
            .filter(runs::Column::LegalEntityId.eq(scope.legal_entity_id.into_inner()))
            .lock_exclusive()
            .one(conn)
            .await?
            .ok_or_else(|| RecognitionError::RunNotFound(run_id).into())
    }

    async fn schedule_in<C: ConnectionTrait>(
        conn: &C,
        run: &runs::Model,
    ) -> Result<schedules::Model, StoreError> {
        schedules::Entity::find_by_id(run.schedule_id)
            .one(conn)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("run {} has no schedule", run.id)))
    }

    async fn find_run_by_key_in<C: ConnectionTrait>(
        conn: &C,
        scope: &RequestScope,
        guard: &GuardedRequest,
    ) -> Result<Option<runs::Model>, StoreError> {
        Ok(runs::Entity::find()
            .filter(runs::Column::TenantId.eq(scope.tenant_id.into_inner()))
            .filter(runs::Column::IdempotencyScope.eq(guard.scope()))
            .filter(runs::Column::IdempotencyKey.eq(guard.key()))
            .one(conn)
            .await?)
    }

    pub(crate) async fn load_run_in<C: ConnectionTrait>(
        conn: &C,
        scope: &RequestScope,
        run_id: RunId,
    ) -> Result<RunView, StoreError> {
        let run = runs::Entity::find_by_id(run_id.into_inner())
            .filter(runs::Column::TenantId.eq(scope.tenant_id.into_inner()))
            .filter(runs::Column::LegalEntityId.eq(scope.legal_entity_id.into_inner()))
            .one(conn)
            .await?
            .ok_or(RecognitionError::RunNotFound(run_id))?;

        let lines = run_lines::Entity::find()
            .filter(run_lines::Column::RunId.eq(run.id))
            .order_by_asc(run_lines::Column::LineNo)
            .all(conn)
            .await?
            .into_iter()
            .map(|l| RunLineView {
                id: RunLineId::from_uuid(l.id),
                line_no: l.line_no,
                purpose_code: l.purpose_code,
                account_id: AccountId::from_uuid(l.account_id),
                kind: l.kind,
                amount_txn: l.amount_txn,
                amount_base: l.amount_base,
                status: l.status,
                reversal_of_run_line_id: l.reversal_of_run_line_id.map(RunLineId::from_uuid),
            })
            .collect();
        let subledger = subledger_entries::Entity::find()
            .filter(subledger_entries::Column::RunId.eq(run.id))
            .all(conn)
            .await?
            .len();

        Ok(RunView {
            run_id,
            schedule_id: ScheduleId::from_uuid(run.schedule_id),
            status: decode("revenue_recognition_runs.status", &run.status)?,
            journal_entry_id: run.journal_entry_id.map(JournalEntryId::from_uuid),
            reversal_of_run_id: run.reversal_of_run_id.map(RunId::from_uuid),
            reversed_by_run_id: run.reversed_by_run_id.map(RunId::from_uuid),
            lines,
            subledger_entries: subledger,
        })
    }

    /// Replays a post or settle call from its keyed journal.
    async fn replay_journal(
        &self,
        scope: &RequestScope,
        guard: &GuardedRequest,
        journal: &crate::entities::journal_entries::Model,
    ) -> Result<Idempotent<RunView>, StoreError> {
        guard.verify(
            journal.idempotency_scope.as_deref().unwrap_or_default(),
            journal.request_hash.as_deref(),
        )?;
        let run_id = journal
            .source_id
            .map(RunId::from_uuid)
            .ok_or_else(|| StoreError::Corrupt(format!("journal {} has no run", journal.id)))?;
        let view = Self::load_run_in(&self.db, scope, run_id).await?;
        info!(run_id = %run_id, key = guard.key(), "Idempotent replay of run transition");
        Ok(Idempotent::replayed(view))
    }

    async fn replay_by_key(
        &self,
        scope: &RequestScope,
        guard: &GuardedRequest,
    ) -> Result<Idempotent<RunView>, StoreError> {
        let journal = JournalRepository::find_by_key_in(&self.db, scope.tenant_id, guard)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("key '{}' conflicted but no journal", guard.key())))?;
        self.replay_journal(scope, guard, &journal).await
    }

    async fn replay_run(
        &self,
        scope: &RequestScope,
        guard: &GuardedRequest,
        reversal: &runs::Model,
    ) -> Result<Idempotent<RunView>, StoreError> {
        guard.verify(
            reversal.idempotency_scope.as_deref().unwrap_or_default(),
            reversal.request_hash.as_deref(),
        )?;
        let view = Self::load_run_in(&self.db, scope, RunId::from_uuid(reversal.id)).await?;
        info!(reversal_run_id = %reversal.id, key = guard.key(), "Idempotent replay of run reversal");
        Ok(Idempotent::replayed(view))
    }

    async fn replay_accrual(
        &self,
        scope: &RequestScope,
        request: &AccrualRequest,
        draft: &ScheduleDraft,
    ) -> Result<Idempotent<ScheduleView>, StoreError> {
        let schedule = schedules::Entity::find()
            .filter(schedules::Column::TenantId.eq(scope.tenant_id.into_inner()))
            .filter(schedules::Column::LegalEntityId.eq(scope.legal_entity_id.into_inner()))
            .filter(schedules::Column::SourceRowUid.eq(draft.source_row_uid.as_str()))
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("accrual {} conflicted but no row", draft.source_row_uid)))?;
        if schedule.amount_txn != draft.amount_txn
            || schedule.maturity_date != draft.maturity_date
            || schedule.currency != draft.currency.as_str()
        {
            return Err(IdempotencyError::PayloadMismatch(request.reference.clone()).into());
        }

        let run = runs::Entity::find()
            .filter(runs::Column::ScheduleId.eq(schedule.id))
            .filter(runs::Column::ReversalOfRunId.is_null())
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("schedule {} has no run", schedule.id)))?;
        info!(schedule_id = %schedule.id, reference = %request.reference, "Idempotent replay of accrual");
        Ok(Idempotent::replayed(to_schedule_view(&schedule, RunId::from_uuid(run.id))?))
    }
}

fn to_contract_line(model: &contract_lines::Model) -> Result<ContractLine, StoreError> {
    Ok(ContractLine {
        id: ContractLineId::from_uuid(model.id),
        family: decode("contract_lines.family", &model.family)?,
        method: decode("contract_lines.method", &model.method)?,
        start_date: model.start_date,
        end_date: model.end_date,
        amount: model.amount,
        currency: decode("contract_lines.currency", &model.currency)?,
        fx: FxSnapshot {
            rate: model.fx_rate,
            provenance: decode("contract_lines.fx_provenance", &model.fx_provenance)?,
            rate_date: model.fx_rate_date,
        },
    })
}

fn to_draft(model: &schedules::Model) -> Result<ScheduleDraft, StoreError> {
    Ok(ScheduleDraft {
        contract_line_id: model.contract_line_id.map(ContractLineId::from_uuid),
        family: decode("revenue_recognition_schedules.family", &model.family)?,
        bucket: decode("revenue_recognition_schedules.bucket", &model.bucket)?,
        maturity_date: model.maturity_date,
        amount_txn: model.amount_txn,
        amount_base: model.amount_base,
        currency: decode("revenue_recognition_schedules.currency", &model.currency)?,
        fx_rate: model.fx_rate,
        reclass_required: model.reclass_required,
        source_row_uid: model.source_row_uid.clone(),
    })
}

fn to_schedule_view(model: &schedules::Model, run_id: RunId) -> Result<ScheduleView, StoreError> {
    Ok(ScheduleView {
        schedule_id: ScheduleId::from_uuid(model.id),
        run_id,
        family: decode("revenue_recognition_schedules.family", &model.family)?,
        bucket: decode("revenue_recognition_schedules.bucket", &model.bucket)?,
        maturity_date: model.maturity_date,
        amount_txn: model.amount_txn,
        amount_base: model.amount_base,
        reclass_required: model.reclass_required,
        source_row_uid: model.source_row_uid.clone(),
    })
}
