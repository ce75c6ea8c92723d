//! Property-based tests for schedule generation and the two-bucket posting.
//!
//! - Straight-line rows sum exactly to the contract amount in both currencies
//! - All rows but the last carry the same truncated amount
//! - Posting plans balance for every family and bucket

use std::collections::HashSet;

use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;
use defter_shared::types::{AccountId, ContractLineId, CurrencyCode};
use defter_shared::types::money::round_money;

use super::posting::TwoBucketPosting;
use super::schedule::ScheduleGenerator;
use super::types::{AccountFamily, ContractLine, RecognitionMethod};
use crate::fx::{FxProvenance, FxSnapshot};
use crate::purpose::{PurposeAccounts, PurposeCode};

fn family_strategy() -> impl Strategy<Value = AccountFamily> {
    prop_oneof![
        Just(AccountFamily::Defrev),
        Just(AccountFamily::Prepaid),
        Just(AccountFamily::AccruedRevenue),
        Just(AccountFamily::AccruedExpense),
    ]
}

fn contract_strategy() -> impl Strategy<Value = ContractLine> {
    (
        family_strategy(),
        1i64..10_000_000i64,
        0u64..1_500u64,
        0u64..1_200u64,
        10_000i64..500_000i64,
    )
        .prop_map(|(family, cents, offset, length, rate)| {
            let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
            let start = base + Days::new(offset);
            ContractLine {
                id: ContractLineId::new(),
                family,
                method: RecognitionMethod::StraightLine,
                start_date: start,
                end_date: start + Days::new(length),
                amount: Decimal::new(cents, 2),
                currency: CurrencyCode::parse("EUR").unwrap(),
                fx: FxSnapshot {
                    rate: Decimal::new(rate, 4),
                    provenance: FxProvenance::Exact,
                    rate_date: start,
                },
            }
        })
}

proptest! {
    #[test]
    fn prop_straight_line_reconciles(line in contract_strategy()) {
        let out = ScheduleGenerator::generate(&line, line.start_date, None, &HashSet::new(), false, 2)
            .unwrap();
        prop_assert!(!out.drafts.is_empty());

        let txn: Decimal = out.drafts.iter().map(|d| d.amount_txn).sum();
        let base: Decimal = out.drafts.iter().map(|d| d.amount_base).sum();
        prop_assert_eq!(txn, line.amount);
        prop_assert_eq!(base, round_money(line.amount * line.fx.rate, 2));

        for d in &out.drafts[..out.drafts.len() - 1] {
            prop_assert_eq!(d.amount_txn, out.drafts[0].amount_txn);
            prop_assert!(d.maturity_date <= line.end_date);
        }
        let uids: HashSet<&String> = out.drafts.iter().map(|d| &d.source_row_uid).collect();
        prop_assert_eq!(uids.len(), out.drafts.len());
    }

    #[test]
    fn prop_generated_rows_post_balanced(line in contract_strategy()) {
        let accounts = PurposeAccounts::new(PurposeCode::ALL.into_iter().map(|c| (c, AccountId::new())));
        let out = ScheduleGenerator::generate(&line, line.start_date, None, &HashSet::new(), false, 2)
            .unwrap();
        for draft in &out.drafts {
            let plan = TwoBucketPosting::plan(draft, &accounts).unwrap();
            let base: Decimal = plan.lines.iter().map(|l| l.amount_base).sum();
            prop_assert_eq!(base, Decimal::ZERO);
            prop_assert_eq!(plan.subledger.len(), if draft.reclass_required { 2 } else { 1 });
        }
    }
}
