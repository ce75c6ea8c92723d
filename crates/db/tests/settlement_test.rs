//! Integration tests for `SettlementRepository`.
//!
//! Run with `cargo test -p defter-db -- --ignored` on a host with Docker.

mod common;

use std::sync::Arc;

use futures::future::join_all;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use tokio::sync::Barrier;

use common::{Ledger, TestDb, config, date, key};
use defter_core::idempotency::IdempotencyError;
use defter_core::settlement::{AllocationRequest, ItemDirection, SettlementError};
use defter_db::entities::{open_items, settlement_batches};
use defter_db::repositories::{ApplySettlementInput, FundingSource, SettlementRepository, StoreError};
use defter_shared::types::{CurrencyCode, RegisterId};

fn receipt(ledger: &Ledger, register_id: RegisterId, amount: rust_decimal::Decimal) -> ApplySettlementInput {
    ApplySettlementInput {
        source: FundingSource::Register { register_id },
        counterparty_id: ledger.counterparty_id,
        direction: ItemDirection::Receivable,
        currency: CurrencyCode::parse("USD").unwrap(),
        amount,
        settlement_date: date(2026, 3, 10),
        allocations: None,
        auto_allocate: true,
        fx_rate_override: None,
        bank_statement_line_id: None,
        cash_transaction_id: None,
    }
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_partial_settlement_parks_remainder_as_unapplied() {
    let test = TestDb::start().await;
    let ledger = Ledger::seed(&test.db).await;
    let item = ledger
        .open_item(&test.db, "RECEIVABLE", "USD", dec!(100), dec!(1), date(2026, 2, 1))
        .await;
    let repo = SettlementRepository::new(test.db.clone(), config());

    let result = repo
        .apply(&ledger.scope, key("pay-1"), receipt(&ledger, ledger.register_a, dec!(150)))
        .await
        .unwrap();

    assert!(!result.replay);
    let batch = result.value;
    assert_eq!(batch.status, "POSTED");
    assert_eq!(batch.applied_amount, dec!(100));
    assert_eq!(batch.unapplied_amount, dec!(50));
    assert!(batch.unapplied_cash_id.is_some());
    assert_eq!(batch.allocations.len(), 1);
    assert_eq!(batch.allocations[0].open_item_id, item);

    let stored = open_items::Entity::find_by_id(item.into_inner())
        .one(&test.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.residual_amount, dec!(0));
    assert_eq!(stored.status, "SETTLED");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_same_key_replays_and_different_payload_conflicts() {
    let test = TestDb::start().await;
    let ledger = Ledger::seed(&test.db).await;
    ledger
        .open_item(&test.db, "RECEIVABLE", "USD", dec!(100), dec!(1), date(2026, 2, 1))
        .await;
    let repo = SettlementRepository::new(test.db.clone(), config());

    let first = repo
        .apply(&ledger.scope, key("pay-2"), receipt(&ledger, ledger.register_a, dec!(40)))
        .await
        .unwrap();
    let second = repo
        .apply(&ledger.scope, key("pay-2"), receipt(&ledger, ledger.register_a, dec!(40)))
        .await
        .unwrap();

    assert!(!first.replay);
    assert!(second.replay);
    assert_eq!(first.value.batch_id, second.value.batch_id);
    assert_eq!(first.value.journal_entry_id, second.value.journal_entry_id);
    assert_eq!(ledger.journal_count(&test.db).await, 1);

    let err = repo
        .apply(&ledger.scope, key("pay-2"), receipt(&ledger, ledger.register_a, dec!(41)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Idempotency(IdempotencyError::PayloadMismatch(_))
    ));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_same_key_on_another_register_is_independent() {
    let test = TestDb::start().await;
    let ledger = Ledger::seed(&test.db).await;
    ledger
        .open_item(&test.db, "RECEIVABLE", "USD", dec!(100), dec!(1), date(2026, 2, 1))
        .await;
    let repo = SettlementRepository::new(test.db.clone(), config());

    let a = repo
        .apply(&ledger.scope, key("shared"), receipt(&ledger, ledger.register_a, dec!(30)))
        .await
        .unwrap();
    let b = repo
        .apply(&ledger.scope, key("shared"), receipt(&ledger, ledger.register_b, dec!(30)))
        .await
        .unwrap();

    assert!(!a.replay);
    assert!(!b.replay);
    assert_ne!(a.value.batch_id, b.value.batch_id);
    assert_eq!(ledger.journal_count(&test.db).await, 2);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_concurrent_duplicates_post_once() {
    let test = TestDb::start().await;
    let ledger = Arc::new(Ledger::seed(&test.db).await);
    let item = ledger
        .open_item(&test.db, "RECEIVABLE", "USD", dec!(500), dec!(1), date(2026, 2, 1))
        .await;
    let repo = SettlementRepository::new(test.db.clone(), config());

    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));
    let handles = (0..workers).map(|_| {
        let repo = repo.clone();
        let ledger = Arc::clone(&ledger);
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            repo.apply(&ledger.scope, key("burst"), receipt(&ledger, ledger.register_a, dec!(200)))
                .await
        })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked").expect("apply failed"))
        .collect();

    let fresh = results.iter().filter(|r| !r.replay).count();
    assert_eq!(fresh, 1);
    let batch_id = results[0].value.batch_id;
    assert!(results.iter().all(|r| r.value.batch_id == batch_id));

    let batches = settlement_batches::Entity::find()
        .filter(settlement_batches::Column::TenantId.eq(ledger.scope.tenant_id.into_inner()))
        .count(&test.db)
        .await
        .unwrap();
    assert_eq!(batches, 1);
    assert_eq!(ledger.journal_count(&test.db).await, 1);

    let stored = open_items::Entity::find_by_id(item.into_inner())
        .one(&test.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.residual_amount, dec!(300));
    assert_eq!(stored.status, "PARTIALLY_SETTLED");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_unapplied_bucket_funds_a_later_settlement() {
    let test = TestDb::start().await;
    let ledger = Ledger::seed(&test.db).await;
    let repo = SettlementRepository::new(test.db.clone(), config());

    // No open items yet: auto-allocation parks the whole receipt.
    let parked = receipt(&ledger, ledger.register_a, dec!(80));
    let parked = repo.apply(&ledger.scope, key("park"), parked).await.unwrap().value;
    let bucket_id = parked.unapplied_cash_id.expect("bucket created");
    assert_eq!(parked.applied_amount, dec!(0));

    let item = ledger
        .open_item(&test.db, "RECEIVABLE", "USD", dec!(50), dec!(1), date(2026, 3, 1))
        .await;
    let mut from_bucket = receipt(&ledger, ledger.register_a, dec!(50));
    from_bucket.source = FundingSource::UnappliedCash { bucket_id };
    from_bucket.auto_allocate = false;
    from_bucket.allocations = Some(vec![AllocationRequest {
        open_item_id: item,
        amount: dec!(50),
    }]);
    let applied = repo.apply(&ledger.scope, key("use-bucket"), from_bucket.clone()).await.unwrap();
    assert_eq!(applied.value.applied_amount, dec!(50));
    assert!(applied.value.unapplied_cash_id.is_none());

    // 30 left in the bucket.
    from_bucket.amount = dec!(31);
    from_bucket.allocations = None;
    from_bucket.auto_allocate = true;
    let err = repo
        .apply(&ledger.scope, key("overdraw"), from_bucket)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Settlement(SettlementError::InsufficientUnapplied { .. })
    ));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_closed_period_rejects_without_writes() {
    let test = TestDb::start().await;
    let ledger = Ledger::seed(&test.db).await;
    ledger
        .open_item(&test.db, "RECEIVABLE", "USD", dec!(100), dec!(1), date(2026, 2, 1))
        .await;
    ledger.set_period_status(&test.db, date(2026, 3, 10), "SOFT_CLOSED").await;
    let repo = SettlementRepository::new(test.db.clone(), config());

    let err = repo
        .apply(&ledger.scope, key("closed"), receipt(&ledger, ledger.register_a, dec!(100)))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "PERIOD_NOT_OPEN");

    let batches = settlement_batches::Entity::find()
        .filter(settlement_batches::Column::TenantId.eq(ledger.scope.tenant_id.into_inner()))
        .count(&test.db)
        .await
        .unwrap();
    assert_eq!(batches, 0);
    assert_eq!(ledger.journal_count(&test.db).await, 0);
}
