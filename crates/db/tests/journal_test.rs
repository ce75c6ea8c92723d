//! Integration tests for `JournalRepository`.
//!
//! Run with `cargo test -p defter-db -- --ignored` on a host with Docker.

mod common;

use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};

use common::{Ledger, TestDb, config, date, key};
use defter_core::journal::{JournalStatus, PostingLine};
use defter_core::settlement::ItemDirection;
use defter_db::entities::{journal_entries, journal_lines};
use defter_db::repositories::{
    ApplySettlementInput, FundingSource, JournalRepository, ManualJournalInput,
    ReverseJournalInput, SettlementRepository,
};
use defter_shared::types::{AccountId, CurrencyCode};

fn manual(ledger: &Ledger, amount: rust_decimal::Decimal) -> ManualJournalInput {
    ManualJournalInput {
        entry_date: date(2026, 6, 15),
        currency: CurrencyCode::parse("USD").unwrap(),
        description: "Accrue audit fee".to_string(),
        lines: vec![
            PostingLine::new(ledger.account(defter_core::purpose::PurposeCode::Expense), amount, amount),
            PostingLine::new(AccountId::new(), -amount, -amount),
        ],
    }
}

async fn line_count(db: &DatabaseConnection, id: uuid::Uuid) -> usize {
    journal_lines::Entity::find()
        .all(db)
        .await
        .unwrap()
        .into_iter()
        .filter(|l| l.journal_entry_id == id)
        .count()
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_manual_post_and_reverse_round_trip() {
    let test = TestDb::start().await;
    let ledger = Ledger::seed(&test.db).await;
    let repo = JournalRepository::new(test.db.clone());

    let posted = repo
        .post_manual(&ledger.scope, key("je-1"), manual(&ledger, dec!(2500)))
        .await
        .unwrap();
    assert!(!posted.replay);
    let summary = posted.value;
    assert_eq!(summary.status, JournalStatus::Posted);
    assert_eq!(summary.total_debit_base, dec!(2500));
    assert_eq!(summary.total_credit_base, dec!(2500));
    assert_eq!(line_count(&test.db, summary.journal_entry_id.into_inner()).await, 2);

    let replay = repo
        .post_manual(&ledger.scope, key("je-1"), manual(&ledger, dec!(2500)))
        .await
        .unwrap();
    assert!(replay.replay);
    assert_eq!(replay.value.journal_entry_id, summary.journal_entry_id);

    let input = ReverseJournalInput {
        reversal_date: date(2026, 7, 1),
    };
    let reversal = repo
        .reverse_journal(&ledger.scope, summary.journal_entry_id, key("je-1-rev"), input.clone())
        .await
        .unwrap();
    assert!(!reversal.replay);
    assert_eq!(reversal.value.original_entry_id, summary.journal_entry_id);
    assert_eq!(reversal.value.reversal.total_debit_base, dec!(2500));

    let original = journal_entries::Entity::find_by_id(summary.journal_entry_id.into_inner())
        .one(&test.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(original.status, "REVERSED");
    assert_eq!(
        original.reversed_by_entry_id,
        Some(reversal.value.reversal.journal_entry_id.into_inner())
    );

    let again = repo
        .reverse_journal(&ledger.scope, summary.journal_entry_id, key("je-1-rev"), input.clone())
        .await
        .unwrap();
    assert!(again.replay);

    let err = repo
        .reverse_journal(&ledger.scope, summary.journal_entry_id, key("je-1-rev-2"), input)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "JOURNAL_ALREADY_REVERSED");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_unbalanced_manual_journal_is_rejected() {
    let test = TestDb::start().await;
    let ledger = Ledger::seed(&test.db).await;
    let repo = JournalRepository::new(test.db.clone());

    let mut input = manual(&ledger, dec!(10));
    input.lines[1] = PostingLine::new(AccountId::new(), dec!(-9), dec!(-9));
    let err = repo.post_manual(&ledger.scope, key("je-bad"), input).await.unwrap_err();
    assert_eq!(err.error_code(), "UNBALANCED_JOURNAL");
    assert_eq!(ledger.journal_count(&test.db).await, 0);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_settlement_journal_cannot_be_reversed_by_hand() {
    let test = TestDb::start().await;
    let ledger = Ledger::seed(&test.db).await;
    ledger
        .open_item(&test.db, "RECEIVABLE", "USD", dec!(100), dec!(1), date(2026, 2, 1))
        .await;
    let settlements = SettlementRepository::new(test.db.clone(), config());
    let batch = settlements
        .apply(
            &ledger.scope,
            key("pay"),
            ApplySettlementInput {
                source: FundingSource::Register {
                    register_id: ledger.register_a,
                },
                counterparty_id: ledger.counterparty_id,
                direction: ItemDirection::Receivable,
                currency: CurrencyCode::parse("USD").unwrap(),
                amount: dec!(100),
                settlement_date: date(2026, 3, 1),
                allocations: None,
                auto_allocate: true,
                fx_rate_override: None,
                bank_statement_line_id: None,
                cash_transaction_id: None,
            },
        )
        .await
        .unwrap()
        .value;
    let journal_id = batch.journal_entry_id.expect("settlement journal");

    let err = JournalRepository::new(test.db.clone())
        .reverse_journal(
            &ledger.scope,
            journal_id,
            key("rev-settlement"),
            ReverseJournalInput {
                reversal_date: date(2026, 3, 2),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "JOURNAL_OWNED_BY_SOURCE");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_posted_lines_are_immutable() {
    let test = TestDb::start().await;
    let ledger = Ledger::seed(&test.db).await;
    let repo = JournalRepository::new(test.db.clone());
    let summary = repo
        .post_manual(&ledger.scope, key("je-immutable"), manual(&ledger, dec!(40)))
        .await
        .unwrap()
        .value;

    let line = journal_lines::Entity::find()
        .all(&test.db)
        .await
        .unwrap()
        .into_iter()
        .find(|l| l.journal_entry_id == summary.journal_entry_id.into_inner())
        .unwrap();
    let mut active: journal_lines::ActiveModel = line.into();
    active.memo = Set(Some("edited".to_string()));
    assert!(active.update(&test.db).await.is_err());
}
