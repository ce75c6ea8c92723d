//! Request extractors shared by the posting routes.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;
use crate::middleware::AuthUser;
use defter_core::idempotency::IdempotencyKey;
use defter_shared::types::{LegalEntityId, RequestScope};
use defter_shared::{ScopeAccess, ScopeAction};

/// Header carrying the caller's idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Validated `Idempotency-Key` header.
///
/// Required on every mutation that is not naturally keyed.
#[derive(Debug, Clone)]
pub struct IdempotencyKeyHeader(pub IdempotencyKey);

impl<S> FromRequestParts<S> for IdempotencyKeyHeader
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .ok_or_else(|| {
                ApiError::bad_request(
                    "MISSING_IDEMPOTENCY_KEY",
                    format!("{IDEMPOTENCY_KEY_HEADER} header is required"),
                )
            })?
            .to_str()
            .map_err(|_| {
                ApiError::bad_request("INVALID_IDEMPOTENCY_KEY", "key must be printable ASCII")
            })?;

        IdempotencyKey::parse(raw)
            .map(Self)
            .map_err(|e| ApiError::bad_request(e.error_code(), e.to_string()))
    }
}

/// Resolves the request scope for a legal entity and checks the caller may act on it.
///
/// # Errors
///
/// Returns 403 when the token does not cover the entity or the role cannot post.
pub fn authorize(
    auth: &AuthUser,
    legal_entity_id: LegalEntityId,
    action: ScopeAction,
) -> Result<RequestScope, ApiError> {
    let claims = auth.claims();
    let scope = claims.scope_for(legal_entity_id);
    claims.assert_scope_access(&scope, action)?;
    Ok(scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, Utc};
    use defter_shared::Claims;
    use uuid::Uuid;

    async fn extract(value: Option<&str>) -> Result<IdempotencyKeyHeader, ApiError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = value {
            builder = builder.header(IDEMPOTENCY_KEY_HEADER, value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        IdempotencyKeyHeader::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_key_is_trimmed() {
        let key = extract(Some("  pay-42 ")).await.unwrap();
        assert_eq!(key.0.as_str(), "pay-42");
    }

    #[tokio::test]
    async fn test_missing_key_is_rejected() {
        let err = extract(None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "MISSING_IDEMPOTENCY_KEY");
    }

    #[tokio::test]
    async fn test_oversized_key_is_rejected() {
        let err = extract(Some(&"k".repeat(129))).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_IDEMPOTENCY_KEY");
    }

    #[test]
    fn test_authorize_checks_entity_and_role() {
        let entity = Uuid::new_v4();
        let auth = AuthUser(Claims::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            vec![entity],
            "viewer",
            Utc::now() + Duration::hours(1),
        ));

        let scope = authorize(&auth, LegalEntityId::from_uuid(entity), ScopeAction::Read).unwrap();
        assert_eq!(scope.tenant_id.into_inner(), auth.claims().tenant);

        let err = authorize(&auth, LegalEntityId::from_uuid(entity), ScopeAction::Post).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let err = authorize(&auth, LegalEntityId::new(), ScopeAction::Read).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }
}
