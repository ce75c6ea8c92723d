//! Journal posting errors.

use rust_decimal::Decimal;
use thiserror::Error;
use defter_shared::ErrorKind;
use defter_shared::types::JournalEntryId;

use super::types::{JournalSource, JournalStatus};
use crate::fiscal::PeriodStatus;

/// Errors that can occur while preparing or reversing a journal.
#[derive(Debug, Error)]
pub enum JournalError {
    /// A journal needs at least two lines.
    #[error("Journal must have at least 2 lines")]
    InsufficientLines,

    /// Line carries neither a transaction nor a base amount.
    #[error("Line {0} has zero amounts")]
    ZeroLine(usize),

    /// Transaction and base amounts point to different sides.
    #[error("Line {0} has transaction and base amounts with opposite signs")]
    SignMismatch(usize),

    /// Debits and credits differ by more than the posting epsilon.
    #[error("Journal is not balanced. Debit: {debit}, Credit: {credit}")]
    Unbalanced {
        /// Total debit in base currency.
        debit: Decimal,
        /// Total credit in base currency.
        credit: Decimal,
    },

    /// Target fiscal period does not accept postings.
    #[error("Fiscal period is {0}, posting requires OPEN")]
    PeriodNotOpen(PeriodStatus),

    /// Only POSTED journals can be reversed.
    #[error("Journal {id} is {status:?}, only POSTED journals can be reversed")]
    NotReversible {
        /// Journal id.
        id: JournalEntryId,
        /// Current status.
        status: JournalStatus,
    },

    /// Journal already has a mirror entry.
    #[error("Journal {id} was already reversed by {by}")]
    AlreadyReversed {
        /// Journal id.
        id: JournalEntryId,
        /// Existing reversal entry.
        by: JournalEntryId,
    },

    /// Journal was produced by a settlement or run and is reversed through its owner.
    #[error("Journal {id} belongs to a {owner} and cannot be reversed directly")]
    OwnedBySource {
        /// Journal id.
        id: JournalEntryId,
        /// Producing component.
        owner: JournalSource,
    },
}

impl JournalError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InsufficientLines => "INSUFFICIENT_LINES",
            Self::ZeroLine(_) => "ZERO_LINE",
            Self::SignMismatch(_) => "SIGN_MISMATCH",
            Self::Unbalanced { .. } => "UNBALANCED_JOURNAL",
            Self::PeriodNotOpen(_) => "PERIOD_NOT_OPEN",
            Self::NotReversible { .. } => "JOURNAL_NOT_REVERSIBLE",
            Self::AlreadyReversed { .. } => "JOURNAL_ALREADY_REVERSED",
            Self::OwnedBySource { .. } => "JOURNAL_OWNED_BY_SOURCE",
        }
    }

    /// Returns the failure class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            // Posting-line shape is computed by the engines, never typed in by callers.
            Self::InsufficientLines
            | Self::ZeroLine(_)
            | Self::SignMismatch(_)
            | Self::Unbalanced { .. } => ErrorKind::Integrity,
            Self::PeriodNotOpen(_)
            | Self::NotReversible { .. }
            | Self::AlreadyReversed { .. }
            | Self::OwnedBySource { .. } => ErrorKind::StateConflict,
        }
    }
}
