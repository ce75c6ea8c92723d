//! Idempotency errors.

use thiserror::Error;
use defter_shared::ErrorKind;

/// Errors raised by the idempotency guard.
#[derive(Debug, Error)]
pub enum IdempotencyError {
    /// Key is empty, too long, or contains non-printable characters.
    #[error("Invalid idempotency key: {0}")]
    InvalidKey(String),

    /// Key is already bound to a different scope.
    #[error("Idempotency key '{key}' belongs to scope {stored}, not {requested}")]
    ScopeMismatch {
        /// The key.
        key: String,
        /// Scope of the existing row.
        stored: String,
        /// Scope of the incoming request.
        requested: String,
    },

    /// Same key and scope, different payload.
    #[error("Idempotency key '{0}' was already used with a different request")]
    PayloadMismatch(String),
}

impl IdempotencyError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidKey(_) => "INVALID_IDEMPOTENCY_KEY",
            Self::ScopeMismatch { .. } => "IDEMPOTENCY_SCOPE_MISMATCH",
            Self::PayloadMismatch(_) => "IDEMPOTENCY_KEY_REUSED",
        }
    }

    /// Returns the failure class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidKey(_) => ErrorKind::Validation,
            Self::ScopeMismatch { .. } | Self::PayloadMismatch(_) => ErrorKind::Conflict,
        }
    }
}
