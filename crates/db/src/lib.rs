//! Database layer with `SeaORM` entities and repositories.
//!
//! This crate provides:
//! - `SeaORM` entity definitions
//! - The posting schema migration, including the unique indexes behind idempotent replay
//! - Transactional repositories that persist what `defter-core` computes

pub mod entities;
pub mod migration;
pub mod repositories;

pub use repositories::{
    ExchangeRateRepository, FiscalRepository, JournalRepository, PurposeAccountRepository,
    ReconciliationRepository, RecognitionRepository, SettlementRepository, StoreError,
};

use sea_orm::{Database, DatabaseConnection, DbErr};

/// Establishes a connection to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    Database::connect(database_url).await
}
