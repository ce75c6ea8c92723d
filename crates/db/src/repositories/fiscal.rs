//! Ledger book and fiscal period lookups.
//!
//! Period management lives elsewhere; posting only asks which period covers a
//! date and whether it is OPEN.

use chrono::NaiveDate;
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter};
use defter_core::fiscal::{FiscalPeriod, PeriodStatus};
use defter_shared::types::{BookId, CurrencyCode, FiscalPeriodId, RequestScope};

use super::error::{StoreError, decode};
use crate::entities::{fiscal_periods, ledger_books};

/// The default book of a legal entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerBook {
    /// Book id.
    pub id: BookId,
    /// Base currency of every journal in the book.
    pub base_currency: CurrencyCode,
}

/// Read-only access to books and fiscal periods.
#[derive(Debug, Clone)]
pub struct FiscalRepository {
    db: DatabaseConnection,
}

impl FiscalRepository {
    /// Creates a new fiscal repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Returns the default book of the scope's legal entity.
    ///
    /// # Errors
    ///
    /// Returns `BookNotConfigured` when the legal entity has no default book.
    pub async fn default_book(&self, scope: &RequestScope) -> Result<LedgerBook, StoreError> {
        Self::default_book_in(&self.db, scope).await
    }

    /// Returns the period of the default book that contains `date`.
    ///
    /// # Errors
    ///
    /// Returns `PeriodNotFound` when no period covers the date.
    pub async fn period_for_date(
        &self,
        scope: &RequestScope,
        date: NaiveDate,
    ) -> Result<FiscalPeriod, StoreError> {
        let book = Self::default_book_in(&self.db, scope).await?;
        Self::period_in(&self.db, scope, book.id, date).await
    }

    pub(crate) async fn default_book_in<C: ConnectionTrait>(
        conn: &C,
        scope: &RequestScope,
    ) -> Result<LedgerBook, StoreError> {
        let book = ledger_books::Entity::find()
            .filter(ledger_books::Column::TenantId.eq(scope.tenant_id.into_inner()))
            .filter(ledger_books::Column::LegalEntityId.eq(scope.legal_entity_id.into_inner()))
            .filter(ledger_books::Column::IsDefault.eq(true))
            .one(conn)
            .await?
            .ok_or_else(|| StoreError::BookNotConfigured(scope.legal_entity_id.to_string()))?;

        Ok(LedgerBook {
            id: BookId::from_uuid(book.id),
            base_currency: decode("ledger_books.base_currency", &book.base_currency)?,
        })
    }

    pub(crate) async fn period_in<C: ConnectionTrait>(
        conn: &C,
        scope: &RequestScope,
        book_id: BookId,
        date: NaiveDate,
    ) -> Result<FiscalPeriod, StoreError> {
        let period = fiscal_periods::Entity::find()
            .filter(fiscal_periods::Column::TenantId.eq(scope.tenant_id.into_inner()))
            .filter(fiscal_periods::Column::BookId.eq(book_id.into_inner()))
            .filter(fiscal_periods::Column::StartDate.lte(date))
            .filter(fiscal_periods::Column::EndDate.gte(date))
            .one(conn)
            .await?
            .ok_or(StoreError::PeriodNotFound(date))?;
        to_period(&period)
    }

    pub(crate) async fn period_by_id_in<C: ConnectionTrait>(
        conn: &C,
        scope: &RequestScope,
        id: FiscalPeriodId,
    ) -> Result<FiscalPeriod, StoreError> {
        let period = fiscal_periods::Entity::find_by_id(id.into_inner())
            .filter(fiscal_periods::Column::TenantId.eq(scope.tenant_id.into_inner()))
            .one(conn)
            .await?
            .ok_or_else(|| StoreError::not_found("Fiscal period", id))?;
        to_period(&period)
    }
}

fn to_period(model: &fiscal_periods::Model) -> Result<FiscalPeriod, StoreError> {
    let status: PeriodStatus = decode("fiscal_periods.status", &model.status)?;
    Ok(FiscalPeriod {
        id: FiscalPeriodId::from_uuid(model.id),
        book_id: BookId::from_uuid(model.book_id),
        start_date: model.start_date,
        end_date: model.end_date,
        status,
    })
}
