//! Journal domain types.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use defter_shared::types::{
    AccountId, BookId, CurrencyCode, FiscalPeriodId, JournalEntryId, LegalEntityId, TenantId,
};

/// Journal entry status.
///
/// A journal is never edited once POSTED; the only later transition is to REVERSED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalStatus {
    /// Not yet posted.
    Draft,
    /// Posted to the ledger.
    Posted,
    /// Posted and later mirrored by a reversal entry.
    Reversed,
}

impl JournalStatus {
    /// Returns the persisted representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Posted => "POSTED",
            Self::Reversed => "REVERSED",
        }
    }
}

impl std::str::FromStr for JournalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "POSTED" => Ok(Self::Posted),
            "REVERSED" => Ok(Self::Reversed),
            other => Err(format!("Unknown journal status: {other}")),
        }
    }
}

/// Business event that produced a journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalSource {
    /// Settlement apply.
    Settlement,
    /// Revenue recognition or accrual run.
    Recognition,
    /// Bank statement auto-post.
    Reconciliation,
    /// Mirror of an earlier journal.
    Reversal,
    /// Entered by hand.
    Manual,
}

impl JournalSource {
    /// Returns the persisted representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Settlement => "SETTLEMENT",
            Self::Recognition => "RECOGNITION",
            Self::Reconciliation => "RECONCILIATION",
            Self::Reversal => "REVERSAL",
            Self::Manual => "MANUAL",
        }
    }
}

impl std::fmt::Display for JournalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JournalSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SETTLEMENT" => Ok(Self::Settlement),
            "RECOGNITION" => Ok(Self::Recognition),
            "RECONCILIATION" => Ok(Self::Reconciliation),
            "REVERSAL" => Ok(Self::Reversal),
            "MANUAL" => Ok(Self::Manual),
            other => Err(format!("Unknown journal source: {other}")),
        }
    }
}

/// Header fields of a journal about to be posted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalHeader {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Legal entity.
    pub legal_entity_id: LegalEntityId,
    /// Ledger book.
    pub book_id: BookId,
    /// Fiscal period the entry lands in.
    pub fiscal_period_id: FiscalPeriodId,
    /// Accounting date.
    pub entry_date: NaiveDate,
    /// Transaction currency.
    pub currency: CurrencyCode,
    /// Free-text description.
    pub description: String,
    /// Producing component.
    pub source: JournalSource,
    /// Id of the producing row (settlement batch, run, statement line).
    pub source_id: Option<Uuid>,
    /// Set on reversal entries only.
    pub reversal_of_entry_id: Option<JournalEntryId>,
}

/// One input line. Positive amounts are debits, negative amounts are credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostingLine {
    /// GL account.
    pub account_id: AccountId,
    /// Signed amount in transaction currency (zero for pure base-currency lines such as FX).
    pub amount_txn: Decimal,
    /// Signed amount in base currency.
    pub amount_base: Decimal,
    /// Optional memo.
    pub memo: Option<String>,
}

impl PostingLine {
    /// Creates a line with identical sign convention for both amounts.
    #[must_use]
    pub fn new(account_id: AccountId, amount_txn: Decimal, amount_base: Decimal) -> Self {
        Self {
            account_id,
            amount_txn,
            amount_base,
            memo: None,
        }
    }

    /// Attaches a memo.
    #[must_use]
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }
}

/// A validated line with its assigned number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedLine {
    /// 1-based position within the entry.
    pub line_no: i32,
    /// GL account.
    pub account_id: AccountId,
    /// Debit side in base currency (zero for credit lines).
    pub debit_base: Decimal,
    /// Credit side in base currency (zero for debit lines).
    pub credit_base: Decimal,
    /// Signed transaction-currency amount.
    pub amount_txn: Decimal,
    /// Optional memo.
    pub memo: Option<String>,
}

impl PreparedLine {
    /// Signed base amount (debit positive).
    #[must_use]
    pub fn signed_base(&self) -> Decimal {
        self.debit_base - self.credit_base
    }
}

/// A balanced journal ready to be inserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedJournal {
    /// Id assigned to the new entry.
    pub id: JournalEntryId,
    /// Header fields.
    pub header: JournalHeader,
    /// Status to persist (always POSTED for prepared journals).
    pub status: JournalStatus,
    /// Ordered lines.
    pub lines: Vec<PreparedLine>,
    /// Total debit in base currency.
    pub total_debit_base: Decimal,
    /// Total credit in base currency.
    pub total_credit_base: Decimal,
}

/// A journal as loaded back from storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostedJournal {
    /// Entry id.
    pub id: JournalEntryId,
    /// Header fields.
    pub header: JournalHeader,
    /// Current status.
    pub status: JournalStatus,
    /// Forward link to the mirror entry once reversed.
    pub reversed_by_entry_id: Option<JournalEntryId>,
    /// Ordered lines.
    pub lines: Vec<PreparedLine>,
    /// Total debit in base currency.
    pub total_debit_base: Decimal,
    /// Total credit in base currency.
    pub total_credit_base: Decimal,
}
