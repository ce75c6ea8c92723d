//! JWT claims and scope access checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::types::{LegalEntityId, RequestScope, TenantId, UserId};

/// What a caller intends to do inside a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeAction {
    /// Read rows.
    Read,
    /// Create settlements, post/settle/reverse runs, auto-post statement lines.
    Post,
}

/// Access check invoked before any mutation.
///
/// An error aborts the operation before a transaction is opened.
pub trait ScopeAccess {
    /// Asserts that the caller may perform `action` inside `scope`.
    fn assert_scope_access(&self, scope: &RequestScope, action: ScopeAction) -> AppResult<()>;
}

/// Roles allowed to post.
const POSTING_ROLES: [&str; 3] = ["owner", "admin", "accountant"];

/// JWT claims for access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: Uuid,
    /// Tenant ID.
    pub tenant: Uuid,
    /// Legal entities the user may act on.
    #[serde(default)]
    pub entities: Vec<Uuid>,
    /// User's role in the tenant.
    pub role: String,
    /// Issued at timestamp.
    pub iat: i64,
    /// Expiration timestamp.
    pub exp: i64,
}

impl Claims {
    /// Creates new claims for a user.
    #[must_use]
    pub fn new(
        user_id: Uuid,
        tenant_id: Uuid,
        entities: Vec<Uuid>,
        role: &str,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id,
            tenant: tenant_id,
            entities,
            role: role.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        }
    }

    /// Returns the user ID from claims.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        UserId::from_uuid(self.sub)
    }

    /// Returns the tenant ID from claims.
    #[must_use]
    pub const fn tenant_id(&self) -> TenantId {
        TenantId::from_uuid(self.tenant)
    }

    /// Builds the request scope for a legal entity addressed by the request path.
    #[must_use]
    pub const fn scope_for(&self, legal_entity_id: LegalEntityId) -> RequestScope {
        RequestScope::new(self.tenant_id(), legal_entity_id, self.user_id())
    }
}

impl ScopeAccess for Claims {
    fn assert_scope_access(&self, scope: &RequestScope, action: ScopeAction) -> AppResult<()> {
        if scope.tenant_id != self.tenant_id() || scope.user_id != self.user_id() {
            return Err(AppError::Forbidden("scope does not match token".into()));
        }
        if !self.entities.contains(&scope.legal_entity_id.into_inner()) {
            return Err(AppError::Forbidden(format!(
                "no access to legal entity {}",
                scope.legal_entity_id
            )));
        }
        if action == ScopeAction::Post && !POSTING_ROLES.contains(&self.role.as_str()) {
            return Err(AppError::Forbidden(format!(
                "role '{}' cannot post",
                self.role
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims(role: &str, entity: Uuid) -> Claims {
        Claims::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            vec![entity],
            role,
            Utc::now() + Duration::hours(1),
        )
    }

    #[test]
    fn test_claims_new_sets_correct_fields() {
        let entity = Uuid::new_v4();
        let claims = claims("accountant", entity);
        assert_eq!(claims.role, "accountant");
        assert_eq!(claims.entities, vec![entity]);
        assert!(claims.iat <= Utc::now().timestamp());
        assert_eq!(claims.user_id().into_inner(), claims.sub);
        assert_eq!(claims.tenant_id().into_inner(), claims.tenant);
    }

    #[test]
    fn test_scope_access_allows_posting_role() {
        let entity = Uuid::new_v4();
        let claims = claims("accountant", entity);
        let scope = claims.scope_for(LegalEntityId::from_uuid(entity));
        assert!(claims.assert_scope_access(&scope, ScopeAction::Post).is_ok());
    }

    #[test]
    fn test_scope_access_rejects_viewer_post() {
        let entity = Uuid::new_v4();
        let claims = claims("viewer", entity);
        let scope = claims.scope_for(LegalEntityId::from_uuid(entity));
        assert!(claims.assert_scope_access(&scope, ScopeAction::Read).is_ok());
        assert!(matches!(
            claims.assert_scope_access(&scope, ScopeAction::Post),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_scope_access_rejects_foreign_entity() {
        let claims = claims("admin", Uuid::new_v4());
        let scope = claims.scope_for(LegalEntityId::new());
        assert!(matches!(
            claims.assert_scope_access(&scope, ScopeAction::Read),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_scope_access_rejects_other_tenant() {
        let entity = Uuid::new_v4();
        let claims = claims("admin", entity);
        let scope = RequestScope::new(
            TenantId::new(),
            LegalEntityId::from_uuid(entity),
            claims.user_id(),
        );
        assert!(claims.assert_scope_access(&scope, ScopeAction::Read).is_err());
    }
}
