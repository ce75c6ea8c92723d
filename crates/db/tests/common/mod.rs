//! Shared fixtures for the repository integration tests.
//!
//! Each test gets its own Postgres container with the posting schema applied,
//! plus one tenant whose default book is in USD with monthly OPEN periods for
//! 2026 and 2027 and every purpose code mapped.

#![allow(dead_code)]

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use sea_orm_migration::MigratorTrait;
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use uuid::Uuid;

use defter_core::idempotency::IdempotencyKey;
use defter_core::purpose::PurposeCode;
use defter_db::entities::{
    cash_registers, exchange_rates, fiscal_periods, journal_entries, ledger_books, open_items,
    purpose_account_mappings,
};
use defter_db::migration::Migrator;
use defter_shared::config::PostingConfig;
use defter_shared::types::{
    AccountId, CounterpartyId, LegalEntityId, OpenItemId, RegisterId, RequestScope, TenantId,
    UserId,
};

/// A migrated database that lives as long as the container handle.
pub struct TestDb {
    pub db: DatabaseConnection,
    _container: ContainerAsync<Postgres>,
}

impl TestDb {
    /// Starts Postgres and applies all migrations.
    pub async fn start() -> Self {
        let container = Postgres::default()
            .start()
            .await
            .expect("Failed to start postgres container");
        let host = container.get_host().await.expect("container host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("container port");
        let url = format!("postgres://postgres:postgres@{host}:{port}/postgres");

        let db = defter_db::connect(&url)
            .await
            .expect("Failed to connect to database");
        Migrator::up(&db, None).await.expect("Failed to migrate");

        Self {
            db,
            _container: container,
        }
    }
}

/// One seeded tenant and legal entity.
pub struct Ledger {
    pub scope: RequestScope,
    pub book_id: Uuid,
    pub accounts: HashMap<PurposeCode, AccountId>,
    /// Receivable/payable control account used by seeded open items.
    pub control_account_id: AccountId,
    /// Bank register A (USD).
    pub register_a: RegisterId,
    pub register_a_account: AccountId,
    /// Bank register B (USD).
    pub register_b: RegisterId,
    pub register_b_account: AccountId,
    pub counterparty_id: CounterpartyId,
}

impl Ledger {
    /// Seeds a tenant with a USD book, 2026-2027 periods and all purpose mappings.
    pub async fn seed(db: &DatabaseConnection) -> Self {
        let scope = RequestScope::new(TenantId::new(), LegalEntityId::new(), UserId::new());
        let tenant = scope.tenant_id.into_inner();
        let entity = scope.legal_entity_id.into_inner();
        let now = Utc::now();

        let book_id = Uuid::now_v7();
        ledger_books::ActiveModel {
            id: Set(book_id),
            tenant_id: Set(tenant),
            legal_entity_id: Set(entity),
            name: Set("Main".to_string()),
            base_currency: Set("USD".to_string()),
            is_default: Set(true),
            created_at: Set(now.into()),
        }
        .insert(db)
        .await
        .expect("Failed to create book");

        for year in [2026, 2027] {
            for month in 1..=12 {
                let start = date(year, month, 1);
                fiscal_periods::ActiveModel {
                    id: Set(Uuid::now_v7()),
                    tenant_id: Set(tenant),
                    book_id: Set(book_id),
                    name: Set(format!("{year}-{month:02}")),
                    start_date: Set(start),
                    end_date: Set(month_end(start)),
                    status: Set("OPEN".to_string()),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                }
                .insert(db)
                .await
                .expect("Failed to create period");
            }
        }

        let mut accounts = HashMap::new();
        for code in PurposeCode::ALL {
            let account_id = AccountId::new();
            purpose_account_mappings::ActiveModel {
                id: Set(Uuid::now_v7()),
                tenant_id: Set(tenant),
                legal_entity_id: Set(entity),
                purpose_code: Set(code.as_str().to_string()),
                account_id: Set(account_id.into_inner()),
                created_at: Set(now.into()),
            }
            .insert(db)
            .await
            .expect("Failed to map purpose");
            accounts.insert(code, account_id);
        }

        let (register_a, register_a_account) = register(db, &scope, "Bank A").await;
        let (register_b, register_b_account) = register(db, &scope, "Bank B").await;

        Self {
            scope,
            book_id,
            accounts,
            control_account_id: AccountId::new(),
            register_a,
            register_a_account,
            register_b,
            register_b_account,
            counterparty_id: CounterpartyId::new(),
        }
    }

    /// Account mapped to `code`.
    pub fn account(&self, code: PurposeCode) -> AccountId {
        self.accounts[&code]
    }

    /// Seeds an OPEN receivable or payable item.
    pub async fn open_item(
        &self,
        db: &DatabaseConnection,
        direction: &str,
        currency: &str,
        amount: Decimal,
        rate: Decimal,
        document_date: NaiveDate,
    ) -> OpenItemId {
        let id = OpenItemId::new();
        let base = (amount * rate).round_dp(4);
        let now = Utc::now();
        open_items::ActiveModel {
            id: Set(id.into_inner()),
            tenant_id: Set(self.scope.tenant_id.into_inner()),
            legal_entity_id: Set(self.scope.legal_entity_id.into_inner()),
            counterparty_id: Set(self.counterparty_id.into_inner()),
            direction: Set(direction.to_string()),
            document_no: Set(format!("INV-{}", &id.to_string()[..8])),
            currency: Set(currency.to_string()),
            control_account_id: Set(self.control_account_id.into_inner()),
            document_date: Set(document_date),
            due_date: Set(document_date),
            original_amount: Set(amount),
            residual_amount: Set(amount),
            original_base: Set(base),
            residual_base: Set(base),
            fx_rate: Set(rate),
            fx_provenance: Set("EXACT".to_string()),
            fx_rate_date: Set(document_date),
            status: Set("OPEN".to_string()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(db)
        .await
        .expect("Failed to create open item");
        id
    }

    /// Stores a quote for `from` into USD.
    pub async fn rate(&self, db: &DatabaseConnection, from: &str, rate: Decimal, on: NaiveDate) {
        exchange_rates::ActiveModel {
            id: Set(Uuid::now_v7()),
            tenant_id: Set(self.scope.tenant_id.into_inner()),
            from_currency: Set(from.to_string()),
            to_currency: Set("USD".to_string()),
            rate: Set(rate),
            effective_date: Set(on),
            source: Set(Some("test".to_string())),
            created_at: Set(Utc::now().into()),
        }
        .insert(db)
        .await
        .expect("Failed to create rate");
    }

    /// Sets the status of the period containing `on`.
    pub async fn set_period_status(&self, db: &DatabaseConnection, on: NaiveDate, status: &str) {
        let period = fiscal_periods::Entity::find()
            .filter(fiscal_periods::Column::BookId.eq(self.book_id))
            .filter(fiscal_periods::Column::StartDate.lte(on))
            .filter(fiscal_periods::Column::EndDate.gte(on))
            .one(db)
            .await
            .expect("period query")
            .expect("period exists");
        let mut active: fiscal_periods::ActiveModel = period.into();
        active.status = Set(status.to_string());
        active.update(db).await.expect("Failed to update period");
    }

    /// Number of journals in this tenant.
    pub async fn journal_count(&self, db: &DatabaseConnection) -> u64 {
        journal_entries::Entity::find()
            .filter(journal_entries::Column::TenantId.eq(self.scope.tenant_id.into_inner()))
            .count(db)
            .await
            .expect("count journals")
    }
}

async fn register(
    db: &DatabaseConnection,
    scope: &RequestScope,
    name: &str,
) -> (RegisterId, AccountId) {
    let id = RegisterId::new();
    let account_id = AccountId::new();
    cash_registers::ActiveModel {
        id: Set(id.into_inner()),
        tenant_id: Set(scope.tenant_id.into_inner()),
        legal_entity_id: Set(scope.legal_entity_id.into_inner()),
        name: Set(name.to_string()),
        account_id: Set(account_id.into_inner()),
        currency: Set("USD".to_string()),
        created_at: Set(Utc::now().into()),
    }
    .insert(db)
    .await
    .expect("Failed to create register");
    (id, account_id)
}

pub fn config() -> PostingConfig {
    PostingConfig::default()
}

pub fn key(raw: &str) -> IdempotencyKey {
    IdempotencyKey::parse(raw).expect("valid key")
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

fn month_end(start: NaiveDate) -> NaiveDate {
    let (year, month) = if start.month() == 12 {
        (start.year() + 1, 1)
    } else {
        (start.year(), start.month() + 1)
    };
    date(year, month, 1).pred_opt().expect("valid date")
}
