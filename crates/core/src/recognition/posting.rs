//! Two-bucket reclass posting shared by all account families.
//!
//! A family only decides which purpose codes fill the four role slots and
//! whether its balance is consumed or built. The leg shapes are common:
//!
//! - recognition leg: bucket balance account against the flow account
//! - reclass leg: long-term balance account against the reclass account
//!
//! Consuming families reclass first and then recognise from the short-term
//! account. Building families recognise into the long-term account and then
//! reclass it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use defter_shared::types::AccountId;

use super::error::RecognitionError;
use super::types::{MaturityBucket, ScheduleDraft, SubledgerKind};
use crate::journal::PostingLine;
use crate::purpose::{PurposeAccounts, PurposeCode};

/// One journal line of a run, tagged with the leg it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedRunLine {
    /// Purpose slot the account was resolved from.
    pub purpose: PurposeCode,
    /// GL account.
    pub account_id: AccountId,
    /// Leg the line belongs to.
    pub kind: SubledgerKind,
    /// Signed transaction-currency amount (debit positive).
    pub amount_txn: Decimal,
    /// Signed base-currency amount (debit positive).
    pub amount_base: Decimal,
}

/// Subledger trace of one leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedSubledgerEntry {
    /// Leg kind.
    pub kind: SubledgerKind,
    /// Account debited by the leg.
    pub debit_account_id: AccountId,
    /// Account credited by the leg.
    pub credit_account_id: AccountId,
    /// Unsigned transaction-currency amount.
    pub amount_txn: Decimal,
    /// Unsigned base-currency amount.
    pub amount_base: Decimal,
}

/// Lines and subledger rows for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPostingPlan {
    /// Journal lines in posting order, one run line each.
    pub lines: Vec<PlannedRunLine>,
    /// One entry per leg.
    pub subledger: Vec<PlannedSubledgerEntry>,
}

impl RunPostingPlan {
    /// Journal input lines. Lines are not merged so that run lines and
    /// journal lines stay one-to-one.
    #[must_use]
    pub fn posting_lines(&self) -> Vec<PostingLine> {
        self.lines
            .iter()
            .map(|l| {
                PostingLine::new(l.account_id, l.amount_txn, l.amount_base)
                    .with_memo(format!("{} {}", l.kind.as_str(), l.purpose))
            })
            .collect()
    }
}

/// Stateless two-bucket planner.
pub struct TwoBucketPosting;

impl TwoBucketPosting {
    /// Plans the journal for a schedule row.
    ///
    /// Only the slots the row actually uses must be mapped.
    ///
    /// # Errors
    ///
    /// Returns `RecognitionError::Setup` naming the first missing purpose code.
    pub fn plan(
        schedule: &ScheduleDraft,
        accounts: &PurposeAccounts,
    ) -> Result<RunPostingPlan, RecognitionError> {
        let family = schedule.family;
        let slots = family.slots();
        let n = family.balance_sign();
        let reclass = schedule.reclass_required && schedule.bucket == MaturityBucket::LongTerm;

        // Balance slot the recognition leg touches.
        let balance_slot = match (schedule.bucket, reclass, family.consumes_balance()) {
            (MaturityBucket::ShortTerm, _, _) | (MaturityBucket::LongTerm, true, true) => slots.short,
            (MaturityBucket::LongTerm, _, _) => slots.long,
        };
        // Consuming draws the balance down (-n), building pushes it up (+n).
        let balance_dir = if family.consumes_balance() { -n } else { n };

        let mut legs = Vec::with_capacity(2);
        let recognition = (SubledgerKind::Recognition, balance_slot, balance_dir, slots.flow);
        let reclass_leg = (SubledgerKind::Reclass, slots.long, -n, slots.reclass);
        if reclass && family.consumes_balance() {
            legs.push(reclass_leg);
            legs.push(recognition);
        } else {
            legs.push(recognition);
            if reclass {
                legs.push(reclass_leg);
            }
        }

        let mut lines = Vec::with_capacity(legs.len() * 2);
        let mut subledger = Vec::with_capacity(legs.len());
        for (kind, first_slot, dir, second_slot) in legs {
            let first = accounts.require(first_slot)?;
            let second = accounts.require(second_slot)?;
            let (first_txn, first_base) = (dir * schedule.amount_txn, dir * schedule.amount_base);

            lines.push(PlannedRunLine {
                purpose: first_slot,
                account_id: first,
                kind,
                amount_txn: first_txn,
                amount_base: first_base,
            });
            lines.push(PlannedRunLine {
                purpose: second_slot,
                account_id: second,
                kind,
                amount_txn: -first_txn,
                amount_base: -first_base,
            });

            let (debit_account_id, credit_account_id) = if dir.is_sign_positive() {
                (first, second)
            } else {
                (second, first)
            };
            subledger.push(PlannedSubledgerEntry {
                kind,
                debit_account_id,
                credit_account_id,
                amount_txn: schedule.amount_txn,
                amount_base: schedule.amount_base,
            });
        }

        Ok(RunPostingPlan { lines, subledger })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use defter_shared::types::CurrencyCode;

    use crate::recognition::types::AccountFamily;

    fn schedule(family: AccountFamily, bucket: MaturityBucket, reclass: bool) -> ScheduleDraft {
        ScheduleDraft {
            contract_line_id: None,
            family,
            bucket,
            maturity_date: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
            amount_txn: dec!(100),
            amount_base: dec!(120),
            currency: CurrencyCode::parse("EUR").unwrap(),
            fx_rate: dec!(1.2),
            reclass_required: reclass,
            source_row_uid: "x:2025-06:DEFREV".into(),
        }
    }

    fn all_accounts() -> PurposeAccounts {
        PurposeAccounts::new(PurposeCode::ALL.into_iter().map(|c| (c, AccountId::new())))
    }

    fn signed(plan: &RunPostingPlan) -> Vec<(PurposeCode, Decimal)> {
        plan.lines.iter().map(|l| (l.purpose, l.amount_base)).collect()
    }

    #[test]
    fn test_defrev_long_term_reclass_has_four_lines_two_entries() {
        let plan = TwoBucketPosting::plan(
            &schedule(AccountFamily::Defrev, MaturityBucket::LongTerm, true),
            &all_accounts(),
        )
        .unwrap();

        assert_eq!(
            signed(&plan),
            vec![
                (PurposeCode::DefrevLong, dec!(120)),
                (PurposeCode::DefrevReclass, dec!(-120)),
                (PurposeCode::DefrevShort, dec!(120)),
                (PurposeCode::Revenue, dec!(-120)),
            ]
        );
        let kinds: Vec<SubledgerKind> = plan.subledger.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![SubledgerKind::Reclass, SubledgerKind::Recognition]);
    }

    #[test]
    fn test_defrev_short_term_recognises_from_short() {
        let plan = TwoBucketPosting::plan(
            &schedule(AccountFamily::Defrev, MaturityBucket::ShortTerm, false),
            &all_accounts(),
        )
        .unwrap();
        assert_eq!(
            signed(&plan),
            vec![(PurposeCode::DefrevShort, dec!(120)), (PurposeCode::Revenue, dec!(-120))]
        );
        assert_eq!(plan.subledger.len(), 1);
    }

    #[test]
    fn test_prepaid_consumes_asset_into_expense() {
        let plan = TwoBucketPosting::plan(
            &schedule(AccountFamily::Prepaid, MaturityBucket::LongTerm, true),
            &all_accounts(),
        )
        .unwrap();
        assert_eq!(
            signed(&plan),
            vec![
                (PurposeCode::PrepaidLong, dec!(-120)),
                (PurposeCode::PrepaidReclass, dec!(120)),
                (PurposeCode::PrepaidShort, dec!(-120)),
                (PurposeCode::Expense, dec!(120)),
            ]
        );
    }

    #[test]
    fn test_accrued_revenue_builds_long_then_reclasses() {
        let plan = TwoBucketPosting::plan(
            &schedule(AccountFamily::AccruedRevenue, MaturityBucket::LongTerm, true),
            &all_accounts(),
        )
        .unwrap();
        assert_eq!(
            signed(&plan),
            vec![
                (PurposeCode::AccruedRevenueLong, dec!(120)),
                (PurposeCode::Revenue, dec!(-120)),
                (PurposeCode::AccruedRevenueLong, dec!(-120)),
                (PurposeCode::AccruedRevenueReclass, dec!(120)),
            ]
        );
        assert_eq!(plan.subledger[0].kind, SubledgerKind::Recognition);
        assert_eq!(plan.subledger[1].kind, SubledgerKind::Reclass);
    }

    #[test]
    fn test_accrued_expense_long_without_reclass_stays_on_long() {
        let plan = TwoBucketPosting::plan(
            &schedule(AccountFamily::AccruedExpense, MaturityBucket::LongTerm, false),
            &all_accounts(),
        )
        .unwrap();
        assert_eq!(
            signed(&plan),
            vec![(PurposeCode::AccruedExpenseLong, dec!(-120)), (PurposeCode::Expense, dec!(120))]
        );
    }

    #[test]
    fn test_every_plan_balances() {
        for family in [
            AccountFamily::Defrev,
            AccountFamily::Prepaid,
            AccountFamily::AccruedRevenue,
            AccountFamily::AccruedExpense,
        ] {
            for (bucket, reclass) in [
                (MaturityBucket::ShortTerm, false),
                (MaturityBucket::LongTerm, false),
                (MaturityBucket::LongTerm, true),
            ] {
                let plan = TwoBucketPosting::plan(&schedule(family, bucket, reclass), &all_accounts()).unwrap();
                let base: Decimal = plan.lines.iter().map(|l| l.amount_base).sum();
                let txn: Decimal = plan.lines.iter().map(|l| l.amount_txn).sum();
                assert_eq!(base, Decimal::ZERO, "{family} {bucket:?} {reclass}");
                assert_eq!(txn, Decimal::ZERO);
            }
        }
    }

    #[test]
    fn test_missing_reclass_mapping_is_setup_error() {
        let accounts = PurposeAccounts::new(
            PurposeCode::ALL
                .into_iter()
                .filter(|c| *c != PurposeCode::DefrevReclass)
                .map(|c| (c, AccountId::new())),
        );
        let err = TwoBucketPosting::plan(
            &schedule(AccountFamily::Defrev, MaturityBucket::LongTerm, true),
            &accounts,
        )
        .unwrap_err();
        assert_eq!(err.kind(), defter_shared::ErrorKind::SetupRequired);

        // A short-term row never touches the reclass slot.
        assert!(TwoBucketPosting::plan(
            &schedule(AccountFamily::Defrev, MaturityBucket::ShortTerm, false),
            &accounts
        )
        .is_ok());
    }
}
