//! Settlement errors.

use rust_decimal::Decimal;
use thiserror::Error;
use defter_shared::ErrorKind;
use defter_shared::types::OpenItemId;

use crate::fx::FxError;
use crate::journal::JournalError;
use crate::purpose::MissingPurpose;

/// Errors that can occur while applying a settlement.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Settlement amount must be positive.
    #[error("Settlement amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    /// Allocation amount must be positive.
    #[error("Allocation amount for item {0} must be positive")]
    NonPositiveAllocation(OpenItemId),

    /// Both explicit allocations and auto-allocate were requested.
    #[error("Explicit allocations and autoAllocate are mutually exclusive")]
    AllocationModeConflict,

    /// Neither explicit allocations nor auto-allocate were requested.
    #[error("Either explicit allocations or autoAllocate is required")]
    AllocationModeMissing,

    /// An item appears twice in the explicit allocation list.
    #[error("Open item {0} is allocated more than once")]
    DuplicateAllocation(OpenItemId),

    /// Explicit allocations exceed the settlement amount.
    #[error("Allocations total {allocated} exceeds settlement amount {amount}")]
    OverAllocated {
        /// Σ requested allocations.
        allocated: Decimal,
        /// Settlement amount.
        amount: Decimal,
    },

    /// Item not found in the caller's scope.
    #[error("Open item not found: {0}")]
    OpenItemNotFound(OpenItemId),

    /// Item belongs to another counterparty, currency, or direction.
    #[error("Open item {id} cannot be settled by this request: {reason}")]
    ItemMismatch {
        /// Item id.
        id: OpenItemId,
        /// What differs.
        reason: String,
    },

    /// Register or unapplied bucket does not fit the request.
    #[error("Funding source cannot settle this request: {0}")]
    SourceMismatch(String),

    /// Item is already fully settled.
    #[error("Open item {0} is already SETTLED")]
    ItemAlreadySettled(OpenItemId),

    /// Allocation would drive the residual negative.
    #[error("Allocation {amount} exceeds residual {residual} of open item {id}")]
    ExceedsResidual {
        /// Item id.
        id: OpenItemId,
        /// Requested amount.
        amount: Decimal,
        /// Current residual.
        residual: Decimal,
    },

    /// Bucket being consumed does not hold enough cash.
    #[error("Unapplied cash bucket holds {available}, requested {requested}")]
    InsufficientUnapplied {
        /// Requested amount.
        requested: Decimal,
        /// Remaining bucket amount.
        available: Decimal,
    },

    /// No allocation and no remainder would be booked.
    #[error("Settlement produces no allocations and no unapplied cash")]
    NothingToApply,

    /// Required purpose account missing.
    #[error(transparent)]
    Setup(#[from] MissingPurpose),

    /// FX resolution failed.
    #[error(transparent)]
    Fx(#[from] FxError),

    /// Journal rejected the derived lines.
    #[error(transparent)]
    Journal(#[from] JournalError),
}

impl SettlementError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NonPositiveAmount(_) => "NON_POSITIVE_AMOUNT",
            Self::NonPositiveAllocation(_) => "NON_POSITIVE_ALLOCATION",
            Self::AllocationModeConflict => "ALLOCATION_MODE_CONFLICT",
            Self::AllocationModeMissing => "ALLOCATION_MODE_MISSING",
            Self::DuplicateAllocation(_) => "DUPLICATE_ALLOCATION",
            Self::OverAllocated { .. } => "OVER_ALLOCATED",
            Self::OpenItemNotFound(_) => "OPEN_ITEM_NOT_FOUND",
            Self::ItemMismatch { .. } => "OPEN_ITEM_MISMATCH",
            Self::SourceMismatch(_) => "FUNDING_SOURCE_MISMATCH",
            Self::ItemAlreadySettled(_) => "OPEN_ITEM_SETTLED",
            Self::ExceedsResidual { .. } => "ALLOCATION_EXCEEDS_RESIDUAL",
            Self::InsufficientUnapplied { .. } => "INSUFFICIENT_UNAPPLIED_CASH",
            Self::NothingToApply => "NOTHING_TO_APPLY",
            Self::Setup(_) => "SETUP_REQUIRED",
            Self::Fx(e) => e.error_code(),
            Self::Journal(e) => e.error_code(),
        }
    }

    /// Returns the failure class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NonPositiveAmount(_)
            | Self::NonPositiveAllocation(_)
            | Self::AllocationModeConflict
            | Self::AllocationModeMissing
            | Self::DuplicateAllocation(_)
            | Self::OverAllocated { .. }
            | Self::ItemMismatch { .. }
            | Self::SourceMismatch(_)
            | Self::InsufficientUnapplied { .. }
            | Self::NothingToApply => ErrorKind::Validation,
            Self::OpenItemNotFound(_) => ErrorKind::NotFound,
            Self::ItemAlreadySettled(_) => ErrorKind::StateConflict,
            Self::ExceedsResidual { .. } => ErrorKind::Integrity,
            Self::Setup(e) => e.kind(),
            Self::Fx(e) => e.kind(),
            Self::Journal(e) => e.kind(),
        }
    }
}
