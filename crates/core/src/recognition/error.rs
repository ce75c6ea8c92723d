//! Recognition errors.

use chrono::NaiveDate;
use thiserror::Error;
use defter_shared::ErrorKind;
use defter_shared::types::{ContractLineId, RunId};

use super::types::{AccountFamily, RunStatus};
use crate::journal::JournalError;
use crate::purpose::MissingPurpose;

/// Errors raised by schedule generation and the run life cycle.
#[derive(Debug, Error)]
pub enum RecognitionError {
    /// Contract line cannot produce a schedule.
    #[error("Invalid contract line: {0}")]
    InvalidContractLine(String),

    /// Accrual request for a non-accrual family.
    #[error("Family {0} does not support accruals")]
    NotAccrualFamily(AccountFamily),

    /// Rows already exist and a full regeneration was requested.
    #[error("Contract line {line} already has {existing} schedule rows in this window")]
    AlreadyGenerated {
        /// Contract line.
        line: ContractLineId,
        /// Rows found in the window.
        existing: usize,
    },

    /// Run not found in the caller's scope.
    #[error("Recognition run not found: {0}")]
    RunNotFound(RunId),

    /// Run is already POSTED.
    #[error("Run {0} is already POSTED")]
    AlreadyPosted(RunId),

    /// Run is already SETTLED.
    #[error("Run {0} is already SETTLED")]
    AlreadySettled(RunId),

    /// Run is already REVERSED.
    #[error("Run {0} is already REVERSED")]
    AlreadyReversed(RunId),

    /// Run is itself the mirror of another run.
    #[error("Run {run} reverses run {original} and cannot be reversed")]
    ReversalOfReversal {
        /// Mirror run the caller tried to reverse.
        run: RunId,
        /// Run it mirrors.
        original: RunId,
    },

    /// Transition not allowed from the current status.
    #[error("Invalid run transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: RunStatus,
        /// Requested status.
        to: RunStatus,
    },

    /// Settle requested on a family that has nothing to settle.
    #[error("Family {0} cannot be settled")]
    SettleNotSupported(AccountFamily),

    /// Accrual date precedes the schedule maturity date.
    #[error("Date {date} is before maturity date {maturity_date}")]
    BeforeMaturity {
        /// Requested settle or reversal date.
        date: NaiveDate,
        /// Schedule maturity date.
        maturity_date: NaiveDate,
    },

    /// Required purpose account missing.
    #[error(transparent)]
    Setup(#[from] MissingPurpose),

    /// Journal rejected the run lines or the target period.
    #[error(transparent)]
    Journal(#[from] JournalError),
}

impl RecognitionError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidContractLine(_) => "INVALID_CONTRACT_LINE",
            Self::NotAccrualFamily(_) => "NOT_ACCRUAL_FAMILY",
            Self::AlreadyGenerated { .. } => "SCHEDULE_ALREADY_GENERATED",
            Self::RunNotFound(_) => "RUN_NOT_FOUND",
            Self::AlreadyPosted(_) => "RUN_ALREADY_POSTED",
            Self::AlreadySettled(_) => "RUN_ALREADY_SETTLED",
            Self::AlreadyReversed(_) => "RUN_ALREADY_REVERSED",
            Self::ReversalOfReversal { .. } => "RUN_IS_REVERSAL",
            Self::InvalidTransition { .. } => "INVALID_RUN_TRANSITION",
            Self::SettleNotSupported(_) => "SETTLE_NOT_SUPPORTED",
            Self::BeforeMaturity { .. } => "BEFORE_MATURITY",
            Self::Setup(_) => "SETUP_REQUIRED",
            Self::Journal(e) => e.error_code(),
        }
    }

    /// Returns the failure class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidContractLine(_) | Self::NotAccrualFamily(_) | Self::SettleNotSupported(_) => {
                ErrorKind::Validation
            }
            Self::RunNotFound(_) => ErrorKind::NotFound,
            Self::AlreadyGenerated { .. }
            | Self::AlreadyPosted(_)
            | Self::AlreadySettled(_)
            | Self::AlreadyReversed(_)
            | Self::ReversalOfReversal { .. }
            | Self::InvalidTransition { .. }
            | Self::BeforeMaturity { .. } => ErrorKind::StateConflict,
            Self::Setup(e) => e.kind(),
            Self::Journal(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiscal::PeriodStatus;
    use crate::purpose::PurposeCode;

    #[test]
    fn test_state_errors_name_current_status() {
        let err = RecognitionError::InvalidTransition {
            from: RunStatus::Reversed,
            to: RunStatus::Posted,
        };
        assert_eq!(err.to_string(), "Invalid run transition from REVERSED to POSTED");
        assert_eq!(err.kind(), ErrorKind::StateConflict);
    }

    #[test]
    fn test_wrapped_errors_keep_their_kind() {
        let setup = RecognitionError::from(MissingPurpose(PurposeCode::DefrevReclass));
        assert_eq!(setup.kind(), ErrorKind::SetupRequired);

        let period = RecognitionError::from(JournalError::PeriodNotOpen(PeriodStatus::HardClosed));
        assert_eq!(period.kind(), ErrorKind::StateConflict);
        assert_eq!(period.error_code(), "PERIOD_NOT_OPEN");
    }
}
