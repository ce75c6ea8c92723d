//! Settlement domain types.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use defter_shared::types::{AccountId, CounterpartyId, CurrencyCode, OpenItemId};

use super::error::SettlementError;
use crate::fx::FxSnapshot;
use crate::journal::PostingLine;

/// Side of the ledger an open item sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemDirection {
    /// Customer invoice; settled by incoming cash.
    Receivable,
    /// Vendor bill; settled by outgoing cash.
    Payable,
}

impl ItemDirection {
    /// Sign applied to receivable-oriented journal amounts.
    #[must_use]
    pub const fn sign(self) -> Decimal {
        match self {
            Self::Receivable => Decimal::ONE,
            Self::Payable => Decimal::NEGATIVE_ONE,
        }
    }

    /// Returns the persisted representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Receivable => "RECEIVABLE",
            Self::Payable => "PAYABLE",
        }
    }
}

impl std::str::FromStr for ItemDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RECEIVABLE" => Ok(Self::Receivable),
            "PAYABLE" => Ok(Self::Payable),
            other => Err(format!("Unknown item direction: {other}")),
        }
    }
}

/// Open item status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpenItemStatus {
    /// Nothing allocated yet.
    Open,
    /// Some but not all of the amount allocated.
    PartiallySettled,
    /// Residual is zero.
    Settled,
}

impl OpenItemStatus {
    /// Returns the persisted representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::PartiallySettled => "PARTIALLY_SETTLED",
            Self::Settled => "SETTLED",
        }
    }
}

impl std::str::FromStr for OpenItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "PARTIALLY_SETTLED" => Ok(Self::PartiallySettled),
            "SETTLED" => Ok(Self::Settled),
            other => Err(format!("Unknown open item status: {other}")),
        }
    }
}

/// An invoice or bill with its remaining balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenItem {
    /// Item id.
    pub id: OpenItemId,
    /// Customer or vendor.
    pub counterparty_id: CounterpartyId,
    /// Receivable or payable.
    pub direction: ItemDirection,
    /// Document currency.
    pub currency: CurrencyCode,
    /// Receivable/payable control account.
    pub control_account_id: AccountId,
    /// Document date.
    pub document_date: NaiveDate,
    /// Due date.
    pub due_date: NaiveDate,
    /// Original amount in document currency.
    pub original_amount: Decimal,
    /// Remaining amount in document currency.
    pub residual_amount: Decimal,
    /// Original amount in base currency.
    pub original_base: Decimal,
    /// Remaining amount in base currency.
    pub residual_base: Decimal,
    /// Rate frozen at document creation.
    pub fx: FxSnapshot,
    /// Current status.
    pub status: OpenItemStatus,
}

/// One explicit allocation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRequest {
    /// Target item.
    pub open_item_id: OpenItemId,
    /// Amount in settlement currency.
    pub amount: Decimal,
}

/// How the incoming amount is spread over open items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationMode {
    /// Caller names the items and amounts.
    Explicit(Vec<AllocationRequest>),
    /// Oldest items first until the amount is exhausted.
    Auto,
}

impl AllocationMode {
    /// Builds the mode from the request's two mutually exclusive fields.
    ///
    /// # Errors
    ///
    /// Returns a validation error when both or neither are supplied.
    pub fn from_request(
        allocations: Option<Vec<AllocationRequest>>,
        auto_allocate: bool,
    ) -> Result<Self, SettlementError> {
        match (allocations, auto_allocate) {
            (Some(list), false) if !list.is_empty() => Ok(Self::Explicit(list)),
            (Some(list), true) if !list.is_empty() => Err(SettlementError::AllocationModeConflict),
            (_, true) => Ok(Self::Auto),
            (_, false) => Err(SettlementError::AllocationModeMissing),
        }
    }
}

/// What happens to cash left after all allocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemainderPolicy {
    /// Park it in a new unapplied-cash bucket.
    CreateUnapplied,
    /// Leave it where it came from (consuming an existing bucket).
    LeaveInSource,
}

/// Remaining balance of a funding bucket being consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceResidual {
    /// Remaining amount in settlement currency.
    pub amount: Decimal,
    /// Remaining amount in base currency.
    pub base: Decimal,
}

/// Validated input to the engine.
#[derive(Debug, Clone)]
pub struct SettlementInput {
    /// Receivable (incoming cash) or payable (outgoing cash).
    pub direction: ItemDirection,
    /// Counterparty whose items are settled.
    pub counterparty_id: CounterpartyId,
    /// Settlement currency.
    pub currency: CurrencyCode,
    /// Cash amount, always positive.
    pub amount: Decimal,
    /// Allocation mode.
    pub mode: AllocationMode,
    /// Settlement-date rate.
    pub settlement_fx: FxSnapshot,
    /// Account the cash moves through (register account or unapplied account).
    pub source_account_id: AccountId,
    /// Remainder handling.
    pub remainder: RemainderPolicy,
    /// Set when consuming an existing bucket so the last cent of base clears it.
    pub source_residual: Option<SourceResidual>,
}

/// One computed allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAllocation {
    /// Target item.
    pub open_item_id: OpenItemId,
    /// Control account of the item.
    pub control_account_id: AccountId,
    /// Allocated amount in settlement currency.
    pub amount: Decimal,
    /// Base amount at the item's original rate.
    pub original_base: Decimal,
    /// Base amount at the settlement rate (equal to `original_base` when absorbed).
    pub settlement_base: Decimal,
    /// `settlement_base - original_base`.
    pub fx_difference: Decimal,
    /// Item residual after this allocation.
    pub residual_after: Decimal,
    /// Item base residual after this allocation.
    pub residual_base_after: Decimal,
    /// Item status after this allocation.
    pub status_after: OpenItemStatus,
}

/// Remainder parked as unapplied cash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedUnapplied {
    /// Account holding the bucket.
    pub account_id: AccountId,
    /// Amount in settlement currency.
    pub amount: Decimal,
    /// Amount in base currency.
    pub base: Decimal,
}

/// Everything the repository needs to persist one apply call.
#[derive(Debug, Clone)]
pub struct SettlementPlan {
    /// Allocation rows, in application order.
    pub allocations: Vec<PlannedAllocation>,
    /// Optional unapplied remainder.
    pub unapplied: Option<PlannedUnapplied>,
    /// Σ allocation amounts.
    pub applied_amount: Decimal,
    /// Σ base moved through the source account.
    pub source_base: Decimal,
    /// Net realized FX difference in receivable orientation.
    pub fx_total: Decimal,
    /// Aggregated journal lines, one per distinct account.
    pub lines: Vec<PostingLine>,
}
