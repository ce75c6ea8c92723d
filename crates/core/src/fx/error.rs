//! FX resolution errors.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;
use defter_shared::ErrorKind;

/// Errors that can occur while resolving a rate.
#[derive(Debug, Error)]
pub enum FxError {
    /// No usable rate within the policy window.
    #[error("No exchange rate found for {from}/{to} on {date} (searched {searched_days} prior days)")]
    RateNotFound {
        /// Transaction currency.
        from: String,
        /// Base currency.
        to: String,
        /// Requested date.
        date: NaiveDate,
        /// Days scanned backwards (0 for exact-only).
        searched_days: u32,
    },

    /// Override or stored rate is zero or negative.
    #[error("Exchange rate must be positive, got {0}")]
    NonPositiveRate(Decimal),
}

impl FxError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::RateNotFound { .. } => "FX_RATE_NOT_FOUND",
            Self::NonPositiveRate(_) => "FX_RATE_NOT_POSITIVE",
        }
    }

    /// Returns the failure class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::RateNotFound { .. } => ErrorKind::SetupRequired,
            Self::NonPositiveRate(_) => ErrorKind::Validation,
        }
    }
}
