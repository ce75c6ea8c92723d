//! Application-wide error types.

use serde::Serialize;
use thiserror::Error;

/// Result type alias using `AppError`.
pub type AppResult<T> = Result<T, AppError>;

/// Failure classes shared by every posting component.
///
/// Domain errors in `defter-core` report one of these so the service boundary can
/// map them without knowing each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed or missing input; rejected before any write.
    Validation,
    /// Operation not valid in the entity's current state (double post, closed period).
    StateConflict,
    /// A configuration row such as a purpose-account mapping is missing.
    SetupRequired,
    /// Ledger invariant breach (unbalanced entry, negative residual).
    Integrity,
    /// Referenced row does not exist in the caller's scope.
    NotFound,
    /// Caller may not act on the requested scope.
    Forbidden,
    /// Idempotency key reused for a different request.
    Conflict,
}

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Access denied.
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation not allowed in the current state.
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// Administrative setup missing.
    #[error("Setup required: {0}")]
    SetupRequired(String),

    /// Ledger invariant violated.
    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// Conflict (e.g., idempotency key reused with a different payload).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Builds an error of the given kind.
    #[must_use]
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::Validation => Self::Validation(message),
            ErrorKind::StateConflict => Self::StateConflict(message),
            ErrorKind::SetupRequired => Self::SetupRequired(message),
            ErrorKind::Integrity => Self::Integrity(message),
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::Forbidden => Self::Forbidden(message),
            ErrorKind::Conflict => Self::Conflict(message),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::StateConflict(_) | Self::Conflict(_) => 409,
            Self::SetupRequired(_) => 424,
            Self::Integrity(_) | Self::Database(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::StateConflict(_) => "STATE_CONFLICT",
            Self::SetupRequired(_) => "SETUP_REQUIRED",
            Self::Integrity(_) => "INTEGRITY_VIOLATION",
            Self::Conflict(_) => "CONFLICT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true for invariant breaches that must abort the whole transaction.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AppError::Unauthorized(String::new()), 401, "UNAUTHORIZED")]
    #[case(AppError::Forbidden(String::new()), 403, "FORBIDDEN")]
    #[case(AppError::NotFound(String::new()), 404, "NOT_FOUND")]
    #[case(AppError::Validation(String::new()), 400, "VALIDATION_ERROR")]
    #[case(AppError::StateConflict(String::new()), 409, "STATE_CONFLICT")]
    #[case(AppError::SetupRequired(String::new()), 424, "SETUP_REQUIRED")]
    #[case(AppError::Integrity(String::new()), 500, "INTEGRITY_VIOLATION")]
    #[case(AppError::Conflict(String::new()), 409, "CONFLICT")]
    #[case(AppError::Database(String::new()), 500, "DATABASE_ERROR")]
    #[case(AppError::Internal(String::new()), 500, "INTERNAL_ERROR")]
    fn test_status_and_code(#[case] err: AppError, #[case] status: u16, #[case] code: &str) {
        assert_eq!(err.status_code(), status);
        assert_eq!(err.error_code(), code);
    }

    #[test]
    fn test_from_kind() {
        assert!(matches!(
            AppError::from_kind(ErrorKind::SetupRequired, "missing FX_GAIN"),
            AppError::SetupRequired(m) if m == "missing FX_GAIN"
        ));
        assert!(AppError::from_kind(ErrorKind::Integrity, "x").is_fatal());
        assert!(!AppError::from_kind(ErrorKind::StateConflict, "x").is_fatal());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            AppError::StateConflict("run is POSTED".into()).to_string(),
            "State conflict: run is POSTED"
        );
        assert_eq!(
            AppError::SetupRequired("msg".into()).to_string(),
            "Setup required: msg"
        );
    }
}
