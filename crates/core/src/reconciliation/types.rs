//! Reconciliation types.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use defter_shared::types::{AccountId, CounterpartyId, CurrencyCode, PostingRuleId, StatementLineId};

/// Cash direction of a statement line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatementDirection {
    /// Money in (positive amount).
    Inflow,
    /// Money out (negative amount).
    Outflow,
}

impl StatementDirection {
    /// Returns the persisted representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inflow => "INFLOW",
            Self::Outflow => "OUTFLOW",
        }
    }
}

impl std::str::FromStr for StatementDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFLOW" => Ok(Self::Inflow),
            "OUTFLOW" => Ok(Self::Outflow),
            other => Err(format!("Unknown statement direction: {other}")),
        }
    }
}

/// Reconciliation status of a statement line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatementLineStatus {
    /// Not posted yet.
    Unmatched,
    /// Posted and linked to a journal.
    Reconciled,
}

impl StatementLineStatus {
    /// Returns the persisted representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unmatched => "UNMATCHED",
            Self::Reconciled => "RECONCILED",
        }
    }
}

impl std::str::FromStr for StatementLineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNMATCHED" => Ok(Self::Unmatched),
            "RECONCILED" => Ok(Self::Reconciled),
            other => Err(format!("Unknown statement line status: {other}")),
        }
    }
}

/// An imported bank statement line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankStatementLine {
    /// Line id.
    pub id: StatementLineId,
    /// GL account of the bank register.
    pub register_account_id: AccountId,
    /// Value date.
    pub value_date: NaiveDate,
    /// Signed amount, positive for inflows.
    pub amount: Decimal,
    /// Statement currency.
    pub currency: CurrencyCode,
    /// Bank-supplied description.
    pub description: String,
    /// Bank reference, if any.
    pub reference: Option<String>,
    /// Counterparty suggested by the import.
    pub counterparty_hint: Option<CounterpartyId>,
    /// Current status.
    pub status: StatementLineStatus,
}

impl BankStatementLine {
    /// Direction derived from the amount sign.
    #[must_use]
    pub fn direction(&self) -> StatementDirection {
        if self.amount.is_sign_negative() {
            StatementDirection::Outflow
        } else {
            StatementDirection::Inflow
        }
    }
}

/// Tax-inclusive split applied by a direct posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxSplit {
    /// Rate as a fraction (`0.18` for 18%).
    pub rate: Decimal,
    /// Account receiving the tax portion.
    pub tax_account_id: AccountId,
}

/// What a matched rule does with the line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostingTemplate {
    /// Book against a counter account.
    DirectPosting {
        /// Counter account.
        counter_account_id: AccountId,
        /// Optional tax split of the gross amount.
        tax: Option<TaxSplit>,
    },
    /// Apply as a settlement against open items.
    Settlement {
        /// Fixed counterparty; falls back to the line's hint.
        counterparty_id: Option<CounterpartyId>,
        /// Auto-allocate oldest items first.
        auto_allocate: bool,
    },
}

/// A matching rule. Lower `priority` wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingRule {
    /// Rule id.
    pub id: PostingRuleId,
    /// Display name.
    pub name: String,
    /// Evaluation order, ascending.
    pub priority: i32,
    /// Restrict to one direction.
    pub direction: Option<StatementDirection>,
    /// Regular expression matched against the description.
    pub description_pattern: Option<String>,
    /// Required reference prefix.
    pub reference_prefix: Option<String>,
    /// Minimum absolute amount, inclusive.
    pub min_amount: Option<Decimal>,
    /// Maximum absolute amount, inclusive.
    pub max_amount: Option<Decimal>,
    /// Template applied on match.
    pub template: PostingTemplate,
}
