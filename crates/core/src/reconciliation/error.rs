//! Reconciliation errors.

use rust_decimal::Decimal;
use thiserror::Error;
use defter_shared::ErrorKind;
use defter_shared::types::{PostingRuleId, StatementLineId};

use crate::journal::JournalError;
use crate::settlement::SettlementError;

/// Errors raised while auto-posting a statement line.
#[derive(Debug, Error)]
pub enum ReconciliationError {
    /// No configured rule matches the line.
    #[error("No posting rule matches statement line {0}")]
    NoMatchingRule(StatementLineId),

    /// A rule carries a pattern that does not compile.
    #[error("Posting rule {rule} has an invalid description pattern: {reason}")]
    InvalidPattern {
        /// Rule id.
        rule: PostingRuleId,
        /// Regex error.
        reason: String,
    },

    /// Line was already posted.
    #[error("Statement line {0} is already RECONCILED")]
    AlreadyReconciled(StatementLineId),

    /// Zero-amount lines carry nothing to post.
    #[error("Statement line {0} has a zero amount")]
    ZeroAmount(StatementLineId),

    /// Tax rate outside `[0, 1)`.
    #[error("Tax rate must be between 0 and 1, got {0}")]
    InvalidTaxRate(Decimal),

    /// Settlement template without a counterparty.
    #[error("Statement line {0} has no counterparty to settle against")]
    MissingCounterparty(StatementLineId),

    /// Settlement engine rejected the line.
    #[error(transparent)]
    Settlement(#[from] SettlementError),

    /// Journal rejected the derived lines.
    #[error(transparent)]
    Journal(#[from] JournalError),
}

impl ReconciliationError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NoMatchingRule(_) => "NO_MATCHING_RULE",
            Self::InvalidPattern { .. } => "INVALID_RULE_PATTERN",
            Self::AlreadyReconciled(_) => "ALREADY_RECONCILED",
            Self::ZeroAmount(_) => "ZERO_AMOUNT",
            Self::InvalidTaxRate(_) => "INVALID_TAX_RATE",
            Self::MissingCounterparty(_) => "MISSING_COUNTERPARTY",
            Self::Settlement(e) => e.error_code(),
            Self::Journal(e) => e.error_code(),
        }
    }

    /// Returns the failure class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NoMatchingRule(_) | Self::InvalidPattern { .. } => ErrorKind::SetupRequired,
            Self::AlreadyReconciled(_) => ErrorKind::StateConflict,
            Self::ZeroAmount(_) | Self::InvalidTaxRate(_) | Self::MissingCounterparty(_) => {
                ErrorKind::Validation
            }
            Self::Settlement(e) => e.kind(),
            Self::Journal(e) => e.kind(),
        }
    }
}
