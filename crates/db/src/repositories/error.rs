//! Error type shared by the posting repositories.

use chrono::NaiveDate;
use sea_orm::{DbErr, SqlErr};
use defter_core::fx::FxError;
use defter_core::idempotency::IdempotencyError;
use defter_core::journal::JournalError;
use defter_core::purpose::MissingPurpose;
use defter_core::recognition::RecognitionError;
use defter_core::reconciliation::ReconciliationError;
use defter_core::settlement::SettlementError;
use defter_shared::{AppError, ErrorKind};

/// Errors raised while persisting a posting operation.
///
/// Domain errors from `defter-core` pass through unchanged so their codes reach
/// the caller; the remaining variants describe storage-level failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Row does not exist in the caller's tenant and legal entity.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity name.
        entity: &'static str,
        /// Requested id.
        id: String,
    },

    /// The legal entity has no default ledger book.
    #[error("No default ledger book configured for legal entity {0}")]
    BookNotConfigured(String),

    /// No fiscal period covers the posting date.
    #[error("No fiscal period found for date {0}")]
    PeriodNotFound(NaiveDate),

    /// Linkage key already used by another request.
    #[error("{0}")]
    DuplicateLinkage(String),

    /// Stored row cannot be decoded into its domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Journal rejected.
    #[error(transparent)]
    Journal(#[from] JournalError),

    /// Idempotency key misuse.
    #[error(transparent)]
    Idempotency(#[from] IdempotencyError),

    /// Rate resolution failed.
    #[error(transparent)]
    Fx(#[from] FxError),

    /// Purpose account missing.
    #[error(transparent)]
    Setup(#[from] MissingPurpose),

    /// Settlement rejected.
    #[error(transparent)]
    Settlement(#[from] SettlementError),

    /// Recognition run rejected.
    #[error(transparent)]
    Recognition(#[from] RecognitionError),

    /// Statement line auto-post rejected.
    #[error(transparent)]
    Reconciliation(#[from] ReconciliationError),

    /// Request payload could not be fingerprinted.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl StoreError {
    /// Shorthand for a missing row.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::BookNotConfigured(_) => "BOOK_NOT_CONFIGURED",
            Self::PeriodNotFound(_) => "PERIOD_NOT_FOUND",
            Self::DuplicateLinkage(_) => "DUPLICATE_LINKAGE",
            Self::Corrupt(_) => "CORRUPT_ROW",
            Self::Journal(e) => e.error_code(),
            Self::Idempotency(e) => e.error_code(),
            Self::Fx(e) => e.error_code(),
            Self::Setup(_) => "SETUP_REQUIRED",
            Self::Settlement(e) => e.error_code(),
            Self::Recognition(e) => e.error_code(),
            Self::Reconciliation(e) => e.error_code(),
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Returns the failure class, or `None` for infrastructure failures.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::NotFound { .. } => Some(ErrorKind::NotFound),
            Self::BookNotConfigured(_) | Self::PeriodNotFound(_) => Some(ErrorKind::SetupRequired),
            Self::DuplicateLinkage(_) => Some(ErrorKind::StateConflict),
            Self::Corrupt(_) => Some(ErrorKind::Integrity),
            Self::Journal(e) => Some(e.kind()),
            Self::Idempotency(e) => Some(e.kind()),
            Self::Fx(e) => Some(e.kind()),
            Self::Setup(e) => Some(e.kind()),
            Self::Settlement(e) => Some(e.kind()),
            Self::Recognition(e) => Some(e.kind()),
            Self::Reconciliation(e) => Some(e.kind()),
            Self::Serialization(_) | Self::Database(_) => None,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err.kind() {
            Some(kind) => Self::from_kind(kind, format!("[{}] {err}", err.error_code())),
            None => match err {
                StoreError::Database(e) => Self::Database(e.to_string()),
                other => Self::Internal(other.to_string()),
            },
        }
    }
}

/// Returns true when the database rejected a write on a unique index.
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Parses a persisted status or code column.
pub(crate) fn decode<T>(column: &'static str, raw: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse()
        .map_err(|e: String| StoreError::Corrupt(format!("{column}: {e}")))
}
