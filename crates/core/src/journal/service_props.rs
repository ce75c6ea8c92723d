//! Property-based tests for `JournalService`.
//!
//! - Prepared journals always balance
//! - Mirrors swap sides and preserve totals

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use defter_shared::types::{
    AccountId, BookId, CurrencyCode, FiscalPeriodId, LegalEntityId, TenantId,
};

use super::error::JournalError;
use super::service::JournalService;
use super::types::{JournalHeader, JournalSource, JournalStatus, PostedJournal, PostingLine};
use crate::fiscal::PeriodStatus;

/// Strategy to generate positive amounts (0.01 to 10,000.00).
fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn header() -> JournalHeader {
    JournalHeader {
        tenant_id: TenantId::new(),
        legal_entity_id: LegalEntityId::new(),
        book_id: BookId::new(),
        fiscal_period_id: FiscalPeriodId::new(),
        entry_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
        currency: CurrencyCode::parse("USD").unwrap(),
        description: "prop".to_string(),
        source: JournalSource::Manual,
        source_id: None,
        reversal_of_entry_id: None,
    }
}

/// Debit lines for each amount plus one credit line for their sum.
fn balanced_lines(amounts: &[Decimal]) -> Vec<PostingLine> {
    let mut lines: Vec<PostingLine> = amounts
        .iter()
        .map(|a| PostingLine::new(AccountId::new(), *a, *a))
        .collect();
    let total: Decimal = amounts.iter().copied().sum();
    lines.push(PostingLine::new(AccountId::new(), -total, -total));
    lines
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_prepared_journal_is_balanced(amounts in prop::collection::vec(positive_amount(), 1..8)) {
        let journal = JournalService::prepare(header(), &balanced_lines(&amounts), PeriodStatus::Open).unwrap();
        prop_assert_eq!(journal.total_debit_base, journal.total_credit_base);
        prop_assert_eq!(journal.lines.len(), amounts.len() + 1);
        for line in &journal.lines {
            prop_assert!(line.debit_base.is_zero() || line.credit_base.is_zero());
        }
    }

    #[test]
    fn prop_any_imbalance_is_rejected(
        amounts in prop::collection::vec(positive_amount(), 1..8),
        skew in positive_amount(),
    ) {
        let mut lines = balanced_lines(&amounts);
        lines[0].amount_base += skew;
        lines[0].amount_txn += skew;
        let result = JournalService::prepare(header(), &lines, PeriodStatus::Open);
        let is_unbalanced = matches!(result, Err(JournalError::Unbalanced { .. }));
        prop_assert!(is_unbalanced);
    }

    #[test]
    fn prop_mirror_swaps_every_line(amounts in prop::collection::vec(positive_amount(), 1..8)) {
        let prepared = JournalService::prepare(header(), &balanced_lines(&amounts), PeriodStatus::Open).unwrap();
        let original = PostedJournal {
            id: prepared.id,
            header: prepared.header,
            status: JournalStatus::Posted,
            reversed_by_entry_id: None,
            lines: prepared.lines,
            total_debit_base: prepared.total_debit_base,
            total_credit_base: prepared.total_credit_base,
        };
        let date = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let mirror = JournalService::mirror(&original, FiscalPeriodId::new(), date, PeriodStatus::Open).unwrap();

        prop_assert_eq!(mirror.total_debit_base, original.total_credit_base);
        prop_assert_eq!(mirror.total_credit_base, original.total_debit_base);
        for (orig, rev) in original.lines.iter().zip(&mirror.lines) {
            prop_assert_eq!(orig.account_id, rev.account_id);
            prop_assert_eq!(orig.debit_base, rev.credit_base);
            prop_assert_eq!(orig.credit_base, rev.debit_base);
            prop_assert_eq!(orig.amount_txn, -rev.amount_txn);
        }
    }
}
