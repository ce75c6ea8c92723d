//! Property-based tests for `SettlementEngine`.
//!
//! - Allocated plus unapplied always equals the settlement amount
//! - No allocation exceeds its item's residual; residuals never go negative
//! - The derived journal always balances

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use defter_shared::types::{
    AccountId, BookId, CounterpartyId, CurrencyCode, FiscalPeriodId, LegalEntityId, OpenItemId,
    TenantId,
};
use defter_shared::types::money::round_money;

use super::engine::{SettlementEngine, SettlementPolicy};
use super::types::{
    AllocationMode, ItemDirection, OpenItem, OpenItemStatus, RemainderPolicy, SettlementInput,
};
use crate::fiscal::PeriodStatus;
use crate::fx::{FxProvenance, FxSnapshot};
use crate::journal::{JournalHeader, JournalService, JournalSource};
use crate::purpose::{PurposeAccounts, PurposeCode};

fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..500_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn rate_strategy() -> impl Strategy<Value = Decimal> {
    (10_000i64..500_000i64).prop_map(|v| Decimal::new(v, 4))
}

fn direction_strategy() -> impl Strategy<Value = ItemDirection> {
    prop_oneof![Just(ItemDirection::Receivable), Just(ItemDirection::Payable)]
}

fn snapshot(rate: Decimal) -> FxSnapshot {
    FxSnapshot {
        rate,
        provenance: FxProvenance::Exact,
        rate_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
    }
}

fn header() -> JournalHeader {
    JournalHeader {
        tenant_id: TenantId::new(),
        legal_entity_id: LegalEntityId::new(),
        book_id: BookId::new(),
        fiscal_period_id: FiscalPeriodId::new(),
        entry_date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
        currency: CurrencyCode::parse("EUR").unwrap(),
        description: "prop".into(),
        source: JournalSource::Settlement,
        source_id: None,
        reversal_of_entry_id: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_auto_allocation_conserves_amount(
        items in prop::collection::vec((amount_strategy(), rate_strategy(), 0u32..200), 0..6),
        receipt in amount_strategy(),
        settle_rate in rate_strategy(),
        direction in direction_strategy(),
    ) {
        let counterparty = CounterpartyId::new();
        let control = AccountId::new();
        let accounts = PurposeAccounts::new([
            (PurposeCode::UnappliedCash, AccountId::new()),
            (PurposeCode::FxGain, AccountId::new()),
            (PurposeCode::FxLoss, AccountId::new()),
        ]);
        let base_day = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let open_items: Vec<OpenItem> = items
            .iter()
            .map(|(amount, rate, offset)| {
                let base = round_money(*amount * *rate, 2);
                let due = base_day + chrono::Days::new(u64::from(*offset));
                OpenItem {
                    id: OpenItemId::new(),
                    counterparty_id: counterparty,
                    direction,
                    currency: CurrencyCode::parse("EUR").unwrap(),
                    control_account_id: control,
                    document_date: due,
                    due_date: due,
                    original_amount: *amount,
                    residual_amount: *amount,
                    original_base: base,
                    residual_base: base,
                    fx: snapshot(*rate),
                    status: OpenItemStatus::Open,
                }
            })
            .collect();

        let input = SettlementInput {
            direction,
            counterparty_id: counterparty,
            currency: CurrencyCode::parse("EUR").unwrap(),
            amount: receipt,
            mode: AllocationMode::Auto,
            settlement_fx: snapshot(settle_rate),
            source_account_id: AccountId::new(),
            remainder: RemainderPolicy::CreateUnapplied,
            source_residual: None,
        };

        let plan = SettlementEngine::plan(&input, &open_items, &accounts, SettlementPolicy::default()).unwrap();

        let unapplied = plan.unapplied.map_or(Decimal::ZERO, |u| u.amount);
        prop_assert_eq!(plan.applied_amount + unapplied, receipt);

        for allocation in &plan.allocations {
            let item = open_items.iter().find(|i| i.id == allocation.open_item_id).unwrap();
            prop_assert!(allocation.amount > Decimal::ZERO);
            prop_assert!(allocation.amount <= item.residual_amount);
            prop_assert!(allocation.residual_after >= Decimal::ZERO);
            prop_assert!(allocation.residual_base_after >= Decimal::ZERO);
            prop_assert_eq!(item.original_amount - allocation.residual_after, allocation.amount);
            if allocation.residual_after.is_zero() {
                prop_assert_eq!(allocation.residual_base_after, Decimal::ZERO);
            }
        }

        let journal = JournalService::prepare(header(), &plan.lines, PeriodStatus::Open).unwrap();
        prop_assert_eq!(journal.total_debit_base, journal.total_credit_base);
    }
}
