//! Purpose-account mapping table.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use uuid::Uuid;
use defter_core::purpose::{PurposeAccounts, PurposeCode};
use defter_shared::types::{AccountId, RequestScope};

use super::error::{StoreError, decode};
use crate::entities::purpose_account_mappings;

/// Purpose-account mapping repository.
#[derive(Debug, Clone)]
pub struct PurposeAccountRepository {
    db: DatabaseConnection,
}

impl PurposeAccountRepository {
    /// Creates a new purpose-account repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Maps a purpose code to an account, replacing an earlier mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn upsert(
        &self,
        scope: &RequestScope,
        code: PurposeCode,
        account_id: AccountId,
    ) -> Result<(), StoreError> {
        let existing = purpose_account_mappings::Entity::find()
            .filter(purpose_account_mappings::Column::TenantId.eq(scope.tenant_id.into_inner()))
            .filter(
                purpose_account_mappings::Column::LegalEntityId
                    .eq(scope.legal_entity_id.into_inner()),
            )
            .filter(purpose_account_mappings::Column::PurposeCode.eq(code.as_str()))
            .one(&self.db)
            .await?;

        if let Some(existing) = existing {
            let mut active: purpose_account_mappings::ActiveModel = existing.into();
            active.account_id = Set(account_id.into_inner());
            active.update(&self.db).await?;
        } else {
            purpose_account_mappings::ActiveModel {
                id: Set(Uuid::now_v7()),
                tenant_id: Set(scope.tenant_id.into_inner()),
                legal_entity_id: Set(scope.legal_entity_id.into_inner()),
                purpose_code: Set(code.as_str().to_string()),
                account_id: Set(account_id.into_inner()),
                created_at: Set(Utc::now().into()),
            }
            .insert(&self.db)
            .await?;
        }
        Ok(())
    }

    /// Loads the mapping table of the scope's legal entity.
    ///
    /// # Errors
    ///
    /// Returns an error if a stored purpose code is unknown.
    pub async fn load(&self, scope: &RequestScope) -> Result<PurposeAccounts, StoreError> {
        Self::load_in(&self.db, scope).await
    }

    pub(crate) async fn load_in<C: ConnectionTrait>(
        conn: &C,
        scope: &RequestScope,
    ) -> Result<PurposeAccounts, StoreError> {
        let rows = purpose_account_mappings::Entity::find()
            .filter(purpose_account_mappings::Column::TenantId.eq(scope.tenant_id.into_inner()))
            .filter(
                purpose_account_mappings::Column::LegalEntityId
                    .eq(scope.legal_entity_id.into_inner()),
            )
            .all(conn)
            .await?;

        let mut mappings = Vec::with_capacity(rows.len());
        for row in rows {
            let code: PurposeCode = decode("purpose_account_mappings.purpose_code", &row.purpose_code)?;
            mappings.push((code, AccountId::from_uuid(row.account_id)));
        }
        Ok(PurposeAccounts::new(mappings))
    }
}
