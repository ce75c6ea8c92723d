//! Integration tests for `ReconciliationRepository`.
//!
//! Run with `cargo test -p defter-db -- --ignored` on a host with Docker.

mod common;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};

use common::{Ledger, TestDb, config, date, key};
use defter_core::reconciliation::{PostingTemplate, StatementDirection, TaxSplit};
use defter_db::entities::{bank_statement_lines, journal_lines, open_items};
use defter_db::repositories::{
    CreatePostingRuleInput, ImportStatementLineInput, ReconciliationRepository,
};
use defter_shared::types::{AccountId, CurrencyCode, StatementLineId};

fn rule(name: &str, priority: i32, pattern: &str, template: PostingTemplate) -> CreatePostingRuleInput {
    CreatePostingRuleInput {
        name: name.to_string(),
        priority,
        direction: None,
        description_pattern: Some(pattern.to_string()),
        reference_prefix: None,
        min_amount: None,
        max_amount: None,
        template,
    }
}

async fn import(
    repo: &ReconciliationRepository,
    ledger: &Ledger,
    amount: Decimal,
    description: &str,
) -> StatementLineId {
    repo.import_line(
        &ledger.scope,
        ImportStatementLineInput {
            register_id: ledger.register_a,
            value_date: date(2026, 5, 12),
            amount,
            currency: CurrencyCode::parse("USD").unwrap(),
            description: description.to_string(),
            reference: None,
            counterparty_hint: Some(ledger.counterparty_id),
        },
    )
    .await
    .unwrap()
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_tax_inclusive_direct_posting_splits_118() {
    let test = TestDb::start().await;
    let ledger = Ledger::seed(&test.db).await;
    let repo = ReconciliationRepository::new(test.db.clone(), config());
    let sales = AccountId::new();
    let vat = AccountId::new();
    repo.create_rule(
        &ledger.scope,
        rule(
            "Card sales",
            10,
            "card settlement",
            PostingTemplate::DirectPosting {
                counter_account_id: sales,
                tax: Some(TaxSplit {
                    rate: dec!(0.18),
                    tax_account_id: vat,
                }),
            },
        ),
    )
    .await
    .unwrap();
    let line_id = import(&repo, &ledger, dec!(118), "CARD SETTLEMENT 0512").await;

    let posted = repo.auto_post(&ledger.scope, line_id, key("bank-1")).await.unwrap();
    assert!(!posted.replay);
    let journal_id = posted.value.journal_entry_id.expect("journal posted");
    assert!(posted.value.settlement_batch_id.is_none());

    let lines = journal_lines::Entity::find()
        .filter(journal_lines::Column::JournalEntryId.eq(journal_id.into_inner()))
        .order_by_asc(journal_lines::Column::LineNo)
        .all(&test.db)
        .await
        .unwrap();
    assert_eq!(lines.len(), 3);
    let credit_of = |account: AccountId| {
        lines
            .iter()
            .find(|l| l.account_id == account.into_inner())
            .map(|l| l.credit_base)
            .expect("line for account")
    };
    assert_eq!(credit_of(sales), dec!(100));
    assert_eq!(credit_of(vat), dec!(18));
    let bank = lines
        .iter()
        .find(|l| l.account_id == ledger.register_a_account.into_inner())
        .expect("bank line");
    assert_eq!(bank.debit_base, dec!(118));

    let stored = bank_statement_lines::Entity::find_by_id(line_id.into_inner())
        .one(&test.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, "RECONCILED");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_repeated_auto_post_replays_under_any_key() {
    let test = TestDb::start().await;
    let ledger = Ledger::seed(&test.db).await;
    let repo = ReconciliationRepository::new(test.db.clone(), config());
    repo.create_rule(
        &ledger.scope,
        rule(
            "Bank fees",
            5,
            "^fee",
            PostingTemplate::DirectPosting {
                counter_account_id: AccountId::new(),
                tax: None,
            },
        ),
    )
    .await
    .unwrap();
    let line_id = import(&repo, &ledger, dec!(-12.50), "Fee for May").await;

    let first = repo.auto_post(&ledger.scope, line_id, key("fee-1")).await.unwrap();
    let same_key = repo.auto_post(&ledger.scope, line_id, key("fee-1")).await.unwrap();
    let other_key = repo.auto_post(&ledger.scope, line_id, key("fee-2")).await.unwrap();

    assert!(!first.replay);
    assert!(same_key.replay);
    assert!(other_key.replay);
    assert_eq!(first.value, same_key.value);
    assert_eq!(first.value, other_key.value);
    assert_eq!(ledger.journal_count(&test.db).await, 1);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_unmatched_line_is_rejected_without_writes() {
    let test = TestDb::start().await;
    let ledger = Ledger::seed(&test.db).await;
    let repo = ReconciliationRepository::new(test.db.clone(), config());
    let mut inflow_only = rule(
        "Rent",
        1,
        "rent",
        PostingTemplate::DirectPosting {
            counter_account_id: AccountId::new(),
            tax: None,
        },
    );
    inflow_only.direction = Some(StatementDirection::Inflow);
    repo.create_rule(&ledger.scope, inflow_only).await.unwrap();
    let line_id = import(&repo, &ledger, dec!(-900), "RENT MAY").await;

    let err = repo
        .auto_post(&ledger.scope, line_id, key("rent-1"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NO_MATCHING_RULE");
    assert_eq!(ledger.journal_count(&test.db).await, 0);

    let stored = bank_statement_lines::Entity::find_by_id(line_id.into_inner())
        .one(&test.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, "UNMATCHED");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_settlement_template_allocates_against_open_items() {
    let test = TestDb::start().await;
    let ledger = Ledger::seed(&test.db).await;
    let item = ledger
        .open_item(&test.db, "RECEIVABLE", "USD", dec!(300), dec!(1), date(2026, 4, 1))
        .await;
    let repo = ReconciliationRepository::new(test.db.clone(), config());
    repo.create_rule(
        &ledger.scope,
        rule(
            "Customer receipts",
            20,
            "incoming transfer",
            PostingTemplate::Settlement {
                counterparty_id: None,
                auto_allocate: true,
            },
        ),
    )
    .await
    .unwrap();
    let line_id = import(&repo, &ledger, dec!(300), "Incoming transfer ACME").await;

    let posted = repo
        .auto_post(&ledger.scope, line_id, key("receipt-1"))
        .await
        .unwrap()
        .value;
    assert!(posted.settlement_batch_id.is_some());
    assert!(posted.journal_entry_id.is_some());

    let stored = open_items::Entity::find_by_id(item.into_inner())
        .one(&test.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, "SETTLED");
    assert_eq!(ledger.journal_count(&test.db).await, 1);
}
