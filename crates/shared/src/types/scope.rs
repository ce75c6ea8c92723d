//! Request scope carried into every mutating operation.

use serde::{Deserialize, Serialize};

use super::id::{LegalEntityId, TenantId, UserId};

/// Tenant, legal entity, and acting user of one request.
///
/// Every repository query filters on `tenant_id` and `legal_entity_id` taken from here,
/// never from the request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestScope {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Legal entity the operation books into.
    pub legal_entity_id: LegalEntityId,
    /// Acting user.
    pub user_id: UserId,
}

impl RequestScope {
    /// Creates a new request scope.
    #[must_use]
    pub const fn new(tenant_id: TenantId, legal_entity_id: LegalEntityId, user_id: UserId) -> Self {
        Self {
            tenant_id,
            legal_entity_id,
            user_id,
        }
    }
}
