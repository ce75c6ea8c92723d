//! Database seeder for Defter development.
//!
//! Seeds one tenant and legal entity with a USD default book, monthly OPEN periods
//! for the current and next year, every purpose-code mapping, a bank register and
//! a EUR quote, then prints an accountant token for the seeded scope.
//!
//! Usage: cargo run --bin seeder

use anyhow::Context;
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use uuid::Uuid;

use defter_core::purpose::PurposeCode;
use defter_db::entities::{
    cash_registers, exchange_rates, fiscal_periods, ledger_books, purpose_account_mappings,
};
use defter_shared::{AppConfig, JwtService};

/// Dev tenant (consistent for all seeds).
const TENANT_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0001);
/// Dev legal entity.
const LEGAL_ENTITY_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0002);
/// Dev user.
const USER_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0003);
/// Default book.
const BOOK_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0010);
/// Operating bank register.
const REGISTER_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0020);
/// First purpose account; the rest follow in `PurposeCode::ALL` order.
const ACCOUNT_BASE: u128 = 0x0000_0000_0000_0000_0000_0000_0000_1000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    println!("Connecting to database...");
    let db = defter_db::connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    if ledger_books::Entity::find_by_id(BOOK_ID).one(&db).await?.is_some() {
        println!("  Dev book already exists, skipping...");
    } else {
        println!("Seeding book and periods...");
        seed_book(&db).await?;

        println!("Seeding purpose accounts...");
        seed_purpose_accounts(&db).await?;

        println!("Seeding bank register...");
        seed_register(&db).await?;

        println!("Seeding exchange rates...");
        seed_exchange_rates(&db).await?;
    }

    let token = JwtService::new(&config.jwt).issue_access_token(
        USER_ID,
        TENANT_ID,
        vec![LEGAL_ENTITY_ID],
        "accountant",
    )?;
    println!("Seeding complete!");
    println!("  legal entity: {LEGAL_ENTITY_ID}");
    println!("  register:     {REGISTER_ID}");
    println!("  token:        {token}");
    Ok(())
}

/// Seeds the default USD book with monthly periods.
async fn seed_book(db: &DatabaseConnection) -> anyhow::Result<()> {
    let now = Utc::now();
    ledger_books::ActiveModel {
        id: Set(BOOK_ID),
        tenant_id: Set(TENANT_ID),
        legal_entity_id: Set(LEGAL_ENTITY_ID),
        name: Set("Main".to_string()),
        base_currency: Set("USD".to_string()),
        is_default: Set(true),
        created_at: Set(now.into()),
    }
    .insert(db)
    .await?;

    let year = now.year();
    for year in [year, year + 1] {
        for month in 1..=12 {
            let start = NaiveDate::from_ymd_opt(year, month, 1).context("invalid period start")?;
            let end = next_month(start)?
                .pred_opt()
                .context("invalid period end")?;
            fiscal_periods::ActiveModel {
                id: Set(Uuid::now_v7()),
                tenant_id: Set(TENANT_ID),
                book_id: Set(BOOK_ID),
                name: Set(format!("{year}-{month:02}")),
                start_date: Set(start),
                end_date: Set(end),
                status: Set("OPEN".to_string()),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
            }
            .insert(db)
            .await?;
        }
    }
    Ok(())
}

fn next_month(start: NaiveDate) -> anyhow::Result<NaiveDate> {
    let (year, month) = if start.month() == 12 {
        (start.year() + 1, 1)
    } else {
        (start.year(), start.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).context("invalid month")
}

/// Maps every purpose code to its own account.
async fn seed_purpose_accounts(db: &DatabaseConnection) -> anyhow::Result<()> {
    for (offset, code) in (0u128..).zip(PurposeCode::ALL) {
        let account_id = Uuid::from_u128(ACCOUNT_BASE + offset);
        purpose_account_mappings::ActiveModel {
            id: Set(Uuid::now_v7()),
            tenant_id: Set(TENANT_ID),
            legal_entity_id: Set(LEGAL_ENTITY_ID),
            purpose_code: Set(code.as_str().to_string()),
            account_id: Set(account_id),
            created_at: Set(Utc::now().into()),
        }
        .insert(db)
        .await?;
        println!("  {code} -> {account_id}");
    }
    Ok(())
}

/// Seeds the operating USD register.
async fn seed_register(db: &DatabaseConnection) -> anyhow::Result<()> {
    cash_registers::ActiveModel {
        id: Set(REGISTER_ID),
        tenant_id: Set(TENANT_ID),
        legal_entity_id: Set(LEGAL_ENTITY_ID),
        name: Set("Operating account".to_string()),
        account_id: Set(Uuid::from_u128(ACCOUNT_BASE + 0x100)),
        currency: Set("USD".to_string()),
        created_at: Set(Utc::now().into()),
    }
    .insert(db)
    .await?;
    Ok(())
}

/// Seeds a EUR/USD quote for today.
async fn seed_exchange_rates(db: &DatabaseConnection) -> anyhow::Result<()> {
    exchange_rates::ActiveModel {
        id: Set(Uuid::now_v7()),
        tenant_id: Set(TENANT_ID),
        from_currency: Set("EUR".to_string()),
        to_currency: Set("USD".to_string()),
        rate: Set(Decimal::new(10850, 4)),
        effective_date: Set(Utc::now().date_naive()),
        source: Set(Some("seed".to_string())),
        created_at: Set(Utc::now().into()),
    }
    .insert(db)
    .await?;
    Ok(())
}
