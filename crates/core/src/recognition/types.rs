//! Recognition domain types.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use defter_shared::types::{ContractLineId, CurrencyCode};

use crate::fx::FxSnapshot;
use crate::purpose::PurposeCode;

/// Purpose codes an account family posts through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleSlots {
    /// Balance account for amounts maturing within 12 months.
    pub short: PurposeCode,
    /// Balance account for amounts maturing after 12 months.
    pub long: PurposeCode,
    /// Revenue or expense account.
    pub flow: PurposeCode,
    /// Target of the long-to-short reclassification leg.
    pub reclass: PurposeCode,
}

/// Balance family a schedule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountFamily {
    /// Deferred revenue (liability, consumed as revenue is earned).
    Defrev,
    /// Prepaid expense (asset, consumed as expense is incurred).
    Prepaid,
    /// Accrued revenue (asset, built up before invoicing).
    AccruedRevenue,
    /// Accrued expense (liability, built up before the bill arrives).
    AccruedExpense,
}

impl AccountFamily {
    /// Purpose codes of the four role slots.
    #[must_use]
    pub const fn slots(self) -> RoleSlots {
        match self {
            Self::Defrev => RoleSlots {
                short: PurposeCode::DefrevShort,
                long: PurposeCode::DefrevLong,
                flow: PurposeCode::Revenue,
                reclass: PurposeCode::DefrevReclass,
            },
            Self::Prepaid => RoleSlots {
                short: PurposeCode::PrepaidShort,
                long: PurposeCode::PrepaidLong,
                flow: PurposeCode::Expense,
                reclass: PurposeCode::PrepaidReclass,
            },
            Self::AccruedRevenue => RoleSlots {
                short: PurposeCode::AccruedRevenueShort,
                long: PurposeCode::AccruedRevenueLong,
                flow: PurposeCode::Revenue,
                reclass: PurposeCode::AccruedRevenueReclass,
            },
            Self::AccruedExpense => RoleSlots {
                short: PurposeCode::AccruedExpenseShort,
                long: PurposeCode::AccruedExpenseLong,
                flow: PurposeCode::Expense,
                reclass: PurposeCode::AccruedExpenseReclass,
            },
        }
    }

    /// Sign of a balance increase: +1 for debit-normal assets, -1 for liabilities.
    #[must_use]
    pub const fn balance_sign(self) -> Decimal {
        match self {
            Self::Prepaid | Self::AccruedRevenue => Decimal::ONE,
            Self::Defrev | Self::AccruedExpense => Decimal::NEGATIVE_ONE,
        }
    }

    /// True when recognition draws the balance down rather than building it.
    #[must_use]
    pub const fn consumes_balance(self) -> bool {
        matches!(self, Self::Defrev | Self::Prepaid)
    }

    /// True for the accrual families, which support settle.
    #[must_use]
    pub const fn is_accrual(self) -> bool {
        matches!(self, Self::AccruedRevenue | Self::AccruedExpense)
    }

    /// Returns the persisted representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Defrev => "DEFREV",
            Self::Prepaid => "PREPAID",
            Self::AccruedRevenue => "ACCRUED_REVENUE",
            Self::AccruedExpense => "ACCRUED_EXPENSE",
        }
    }
}

impl std::fmt::Display for AccountFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccountFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEFREV" => Ok(Self::Defrev),
            "PREPAID" => Ok(Self::Prepaid),
            "ACCRUED_REVENUE" => Ok(Self::AccruedRevenue),
            "ACCRUED_EXPENSE" => Ok(Self::AccruedExpense),
            other => Err(format!("Unknown account family: {other}")),
        }
    }
}

/// Maturity bucket of a schedule row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaturityBucket {
    /// Matures within 12 months of the reference date.
    ShortTerm,
    /// Matures later.
    LongTerm,
}

impl MaturityBucket {
    /// Returns the persisted representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShortTerm => "SHORT_TERM",
            Self::LongTerm => "LONG_TERM",
        }
    }
}

impl std::str::FromStr for MaturityBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SHORT_TERM" => Ok(Self::ShortTerm),
            "LONG_TERM" => Ok(Self::LongTerm),
            other => Err(format!("Unknown maturity bucket: {other}")),
        }
    }
}

/// How a contract line is spread over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecognitionMethod {
    /// Equal monthly amounts from start month to end month.
    StraightLine,
    /// One amount on a single date.
    Milestone,
    /// Rows are entered by hand.
    Manual,
}

impl RecognitionMethod {
    /// Returns the persisted representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StraightLine => "STRAIGHT_LINE",
            Self::Milestone => "MILESTONE",
            Self::Manual => "MANUAL",
        }
    }
}

impl std::str::FromStr for RecognitionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STRAIGHT_LINE" => Ok(Self::StraightLine),
            "MILESTONE" => Ok(Self::Milestone),
            "MANUAL" => Ok(Self::Manual),
            other => Err(format!("Unknown recognition method: {other}")),
        }
    }
}

/// Run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Generated, not yet posted.
    Draft,
    /// Journal posted.
    Posted,
    /// Accrual settled at or after maturity.
    Settled,
    /// Mirrored by a reversal run.
    Reversed,
}

impl RunStatus {
    /// Returns the persisted representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Posted => "POSTED",
            Self::Settled => "SETTLED",
            Self::Reversed => "REVERSED",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "POSTED" => Ok(Self::Posted),
            "SETTLED" => Ok(Self::Settled),
            "REVERSED" => Ok(Self::Reversed),
            other => Err(format!("Unknown run status: {other}")),
        }
    }
}

/// Kind of subledger trace row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubledgerKind {
    /// Balance ↔ revenue/expense movement.
    Recognition,
    /// Long-term ↔ short-term movement.
    Reclass,
}

impl SubledgerKind {
    /// Returns the persisted representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Recognition => "RECOGNITION",
            Self::Reclass => "RECLASS",
        }
    }
}

impl std::str::FromStr for SubledgerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RECOGNITION" => Ok(Self::Recognition),
            "RECLASS" => Ok(Self::Reclass),
            other => Err(format!("Unknown subledger kind: {other}")),
        }
    }
}

/// Contract line to generate a schedule from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractLine {
    /// Line id.
    pub id: ContractLineId,
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
    /// Rate frozen when the line was billed.
    pub fx: FxSnapshot,
}

/// Accrual booked directly, without a contract line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccrualRequest {
    /// `AccruedRevenue` or `AccruedExpense`.
    pub family: AccountFamily,
    /// Amount in transaction currency.
    pub amount: Decimal,
    /// Transaction currency.
    pub currency: CurrencyCode,
    /// Date the accrual matures.
    pub maturity_date: NaiveDate,
    /// Date the bucket is measured from.
    pub reference_date: NaiveDate,
    /// Caller reference used to build the row uid.
    pub reference: String,
}

/// A schedule row ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDraft {
    /// Source contract line (none for direct accruals).
    pub contract_line_id: Option<ContractLineId>,
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
    /// Transaction currency.
    pub currency: CurrencyCode,
    /// Rate used for the base amount.
    pub fx_rate: Decimal,
    /// Long-term rows post a reclass leg.
    pub reclass_required: bool,
    /// Unique per generated bucket.
    pub source_row_uid: String,
}
