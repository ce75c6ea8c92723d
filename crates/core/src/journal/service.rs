//! Journal preparation and reversal.
//!
//! Pure logic: the caller supplies the period status it read under the same
//! transaction, and persists the returned `PreparedJournal` together with its own rows.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use defter_shared::types::{FiscalPeriodId, JournalEntryId};

use super::error::JournalError;
use super::types::{
    JournalHeader, JournalSource, JournalStatus, PostedJournal, PostingLine, PreparedJournal,
    PreparedLine,
};
use crate::fiscal::PeriodStatus;

/// Maximum tolerated difference between total debits and credits.
pub const POSTING_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 6);

/// Stateless journal service.
pub struct JournalService;

impl JournalService {
    /// Validates posting lines and produces a POSTED journal.
    ///
    /// Checks, in order:
    /// 1. The fiscal period is OPEN
    /// 2. At least two lines, none all-zero, transaction and base amounts on the same side
    /// 3. Σ debit_base == Σ credit_base within [`POSTING_EPSILON`]
    ///
    /// Lines are numbered from 1 in input order.
    ///
    /// # Errors
    ///
    /// Returns `JournalError::PeriodNotOpen` for non-open periods and an integrity
    /// error for malformed or unbalanced lines. Nothing is ever corrected silently.
    pub fn prepare(
        header: JournalHeader,
        lines: &[PostingLine],
        period_status: PeriodStatus,
    ) -> Result<PreparedJournal, JournalError> {
        if !period_status.allows_posting() {
            return Err(JournalError::PeriodNotOpen(period_status));
        }
        if lines.len() < 2 {
            return Err(JournalError::InsufficientLines);
        }

        let mut prepared = Vec::with_capacity(lines.len());
        for (idx, line) in lines.iter().enumerate() {
            let line_no = idx + 1;
            if line.amount_base.is_zero() && line.amount_txn.is_zero() {
                return Err(JournalError::ZeroLine(line_no));
            }
            if !line.amount_base.is_zero()
                && !line.amount_txn.is_zero()
                && line.amount_base.is_sign_negative() != line.amount_txn.is_sign_negative()
            {
                return Err(JournalError::SignMismatch(line_no));
            }

            let (debit_base, credit_base) = if line.amount_base.is_sign_negative() {
                (Decimal::ZERO, -line.amount_base)
            } else {
                (line.amount_base, Decimal::ZERO)
            };
            prepared.push(PreparedLine {
                line_no: i32::try_from(line_no).unwrap_or(i32::MAX),
                account_id: line.account_id,
                debit_base,
                credit_base,
                amount_txn: line.amount_txn,
                memo: line.memo.clone(),
            });
        }

        let (total_debit_base, total_credit_base) = Self::totals(&prepared);
        if !Self::is_balanced(total_debit_base, total_credit_base) {
            return Err(JournalError::Unbalanced {
                debit: total_debit_base,
                credit: total_credit_base,
            });
        }

        Ok(PreparedJournal {
            id: JournalEntryId::new(),
            header,
            status: JournalStatus::Posted,
            lines: prepared,
            total_debit_base,
            total_credit_base,
        })
    }

    /// Builds the mirror of a POSTED journal.
    ///
    /// Every line keeps its account and absolute amounts with debit and credit swapped.
    /// The mirror goes through [`Self::prepare`], so the reversal period must be OPEN.
    ///
    /// # Errors
    ///
    /// Returns `JournalError::NotReversible` or `JournalError::AlreadyReversed` when the
    /// original is not in POSTED state, plus any error from `prepare`.
    pub fn mirror(
        original: &PostedJournal,
        fiscal_period_id: FiscalPeriodId,
        entry_date: NaiveDate,
        period_status: PeriodStatus,
    ) -> Result<PreparedJournal, JournalError> {
        if let Some(by) = original.reversed_by_entry_id {
            return Err(JournalError::AlreadyReversed {
                id: original.id,
                by,
            });
        }
        if original.status != JournalStatus::Posted {
            return Err(JournalError::NotReversible {
                id: original.id,
                status: original.status,
            });
        }

        let lines: Vec<PostingLine> = original
            .lines
            .iter()
            .map(|line| PostingLine {
                account_id: line.account_id,
                amount_txn: -line.amount_txn,
                amount_base: -line.signed_base(),
                memo: Some(match &line.memo {
                    Some(memo) => format!("Reversal: {memo}"),
                    None => "Reversal".to_string(),
                }),
            })
            .collect();

        let header = JournalHeader {
            fiscal_period_id,
            entry_date,
            description: format!("Reversal of {}", original.header.description),
            source: JournalSource::Reversal,
            source_id: original.header.source_id,
            reversal_of_entry_id: Some(original.id),
            ..original.header.clone()
        };

        Self::prepare(header, &lines, period_status)
    }

    /// Sums the debit and credit sides.
    #[must_use]
    pub fn totals(lines: &[PreparedLine]) -> (Decimal, Decimal) {
        let debit = lines.iter().map(|l| l.debit_base).sum();
        let credit = lines.iter().map(|l| l.credit_base).sum();
        (debit, credit)
    }

    /// Returns true if the totals agree within [`POSTING_EPSILON`].
    #[must_use]
    pub fn is_balanced(debit: Decimal, credit: Decimal) -> bool {
        (debit - credit).abs() <= POSTING_EPSILON
    }

    /// Merges lines on the same account and drops lines that net to zero.
    ///
    /// Order follows the first appearance of each account.
    #[must_use]
    pub fn aggregate(lines: Vec<PostingLine>) -> Vec<PostingLine> {
        let mut merged: Vec<PostingLine> = Vec::with_capacity(lines.len());
        for line in lines {
            if let Some(existing) = merged.iter_mut().find(|l| l.account_id == line.account_id) {
                existing.amount_txn += line.amount_txn;
                existing.amount_base += line.amount_base;
            } else {
                merged.push(line);
            }
        }
        merged.retain(|l| !(l.amount_base.is_zero() && l.amount_txn.is_zero()));
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use defter_shared::types::{AccountId, BookId, CurrencyCode, LegalEntityId, TenantId};

    fn header() -> JournalHeader {
        JournalHeader {
            tenant_id: TenantId::new(),
            legal_entity_id: LegalEntityId::new(),
            book_id: BookId::new(),
            fiscal_period_id: FiscalPeriodId::new(),
            entry_date: NaiveDate::from_ymd_opt(2026, 3, 15).unwrap(),
            currency: CurrencyCode::parse("TRY").unwrap(),
            description: "Receipt".to_string(),
            source: JournalSource::Manual,
            source_id: None,
            reversal_of_entry_id: None,
        }
    }

    fn posted(prepared: PreparedJournal) -> PostedJournal {
        PostedJournal {
            id: prepared.id,
            header: prepared.header,
            status: JournalStatus::Posted,
            reversed_by_entry_id: None,
            lines: prepared.lines,
            total_debit_base: prepared.total_debit_base,
            total_credit_base: prepared.total_credit_base,
        }
    }

    #[test]
    fn test_prepare_balanced_entry() {
        let cash = AccountId::new();
        let revenue = AccountId::new();
        let journal = JournalService::prepare(
            header(),
            &[
                PostingLine::new(cash, dec!(100), dec!(100)),
                PostingLine::new(revenue, dec!(-100), dec!(-100)),
            ],
            PeriodStatus::Open,
        )
        .unwrap();

        assert_eq!(journal.status, JournalStatus::Posted);
        assert_eq!(journal.total_debit_base, dec!(100));
        assert_eq!(journal.total_credit_base, dec!(100));
        assert_eq!(journal.lines[0].line_no, 1);
        assert_eq!(journal.lines[1].line_no, 2);
        assert_eq!(journal.lines[1].credit_base, dec!(100));
        assert_eq!(journal.lines[1].debit_base, Decimal::ZERO);
    }

    #[test]
    fn test_prepare_rejects_unbalanced() {
        let result = JournalService::prepare(
            header(),
            &[
                PostingLine::new(AccountId::new(), dec!(100), dec!(100)),
                PostingLine::new(AccountId::new(), dec!(-99.99), dec!(-99.99)),
            ],
            PeriodStatus::Open,
        );
        assert!(matches!(result, Err(JournalError::Unbalanced { .. })));
    }

    #[test]
    fn test_prepare_tolerates_epsilon() {
        let result = JournalService::prepare(
            header(),
            &[
                PostingLine::new(AccountId::new(), dec!(1), dec!(1.0000005)),
                PostingLine::new(AccountId::new(), dec!(-1), dec!(-1)),
            ],
            PeriodStatus::Open,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_prepare_rejects_closed_period() {
        let lines = [
            PostingLine::new(AccountId::new(), dec!(5), dec!(5)),
            PostingLine::new(AccountId::new(), dec!(-5), dec!(-5)),
        ];
        assert!(matches!(
            JournalService::prepare(header(), &lines, PeriodStatus::HardClosed),
            Err(JournalError::PeriodNotOpen(PeriodStatus::HardClosed))
        ));
        assert!(matches!(
            JournalService::prepare(header(), &lines, PeriodStatus::SoftClosed),
            Err(JournalError::PeriodNotOpen(PeriodStatus::SoftClosed))
        ));
    }

    #[test]
    fn test_prepare_rejects_malformed_lines() {
        let single = [PostingLine::new(AccountId::new(), dec!(5), dec!(5))];
        assert!(matches!(
            JournalService::prepare(header(), &single, PeriodStatus::Open),
            Err(JournalError::InsufficientLines)
        ));

        let zero = [
            PostingLine::new(AccountId::new(), dec!(0), dec!(0)),
            PostingLine::new(AccountId::new(), dec!(0), dec!(0)),
        ];
        assert!(matches!(
            JournalService::prepare(header(), &zero, PeriodStatus::Open),
            Err(JournalError::ZeroLine(1))
        ));

        let flipped = [
            PostingLine::new(AccountId::new(), dec!(5), dec!(5)),
            PostingLine::new(AccountId::new(), dec!(5), dec!(-5)),
        ];
        assert!(matches!(
            JournalService::prepare(header(), &flipped, PeriodStatus::Open),
            Err(JournalError::SignMismatch(2))
        ));
    }

    #[test]
    fn test_fx_only_line_is_allowed() {
        let result = JournalService::prepare(
            header(),
            &[
                PostingLine::new(AccountId::new(), dec!(100), dec!(3400)),
                PostingLine::new(AccountId::new(), dec!(-100), dec!(-3300)),
                PostingLine::new(AccountId::new(), Decimal::ZERO, dec!(-100)),
            ],
            PeriodStatus::Open,
        );
        assert_eq!(result.unwrap().lines.len(), 3);
    }

    #[test]
    fn test_mirror_swaps_sides() {
        let cash = AccountId::new();
        let revenue = AccountId::new();
        let original = posted(
            JournalService::prepare(
                header(),
                &[
                    PostingLine::new(cash, dec!(100), dec!(100)).with_memo("cash"),
                    PostingLine::new(revenue, dec!(-100), dec!(-100)),
                ],
                PeriodStatus::Open,
            )
            .unwrap(),
        );

        let period = FiscalPeriodId::new();
        let date = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        let mirror = JournalService::mirror(&original, period, date, PeriodStatus::Open).unwrap();

        assert_eq!(mirror.header.reversal_of_entry_id, Some(original.id));
        assert_eq!(mirror.header.source, JournalSource::Reversal);
        assert_eq!(mirror.header.fiscal_period_id, period);
        assert_eq!(mirror.header.entry_date, date);
        assert_eq!(mirror.lines[0].account_id, cash);
        assert_eq!(mirror.lines[0].credit_base, dec!(100));
        assert_eq!(mirror.lines[0].amount_txn, dec!(-100));
        assert_eq!(mirror.lines[0].memo.as_deref(), Some("Reversal: cash"));
        assert_eq!(mirror.lines[1].debit_base, dec!(100));
        assert_eq!(mirror.total_debit_base, original.total_credit_base);
    }

    #[test]
    fn test_mirror_rejects_reversed_journal() {
        let mut original = posted(
            JournalService::prepare(
                header(),
                &[
                    PostingLine::new(AccountId::new(), dec!(1), dec!(1)),
                    PostingLine::new(AccountId::new(), dec!(-1), dec!(-1)),
                ],
                PeriodStatus::Open,
            )
            .unwrap(),
        );
        let date = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();

        original.status = JournalStatus::Reversed;
        original.reversed_by_entry_id = Some(JournalEntryId::new());
        assert!(matches!(
            JournalService::mirror(&original, FiscalPeriodId::new(), date, PeriodStatus::Open),
            Err(JournalError::AlreadyReversed { .. })
        ));

        original.status = JournalStatus::Draft;
        original.reversed_by_entry_id = None;
        assert!(matches!(
            JournalService::mirror(&original, FiscalPeriodId::new(), date, PeriodStatus::Open),
            Err(JournalError::NotReversible { .. })
        ));
    }

    #[test]
    fn test_mirror_rejects_closed_reversal_period() {
        let original = posted(
            JournalService::prepare(
                header(),
                &[
                    PostingLine::new(AccountId::new(), dec!(1), dec!(1)),
                    PostingLine::new(AccountId::new(), dec!(-1), dec!(-1)),
                ],
                PeriodStatus::Open,
            )
            .unwrap(),
        );
        let date = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        assert!(matches!(
            JournalService::mirror(&original, FiscalPeriodId::new(), date, PeriodStatus::HardClosed),
            Err(JournalError::PeriodNotOpen(PeriodStatus::HardClosed))
        ));
    }

    #[test]
    fn test_aggregate_merges_and_drops_zero() {
        let a = AccountId::new();
        let b = AccountId::new();
        let merged = JournalService::aggregate(vec![
            PostingLine::new(a, dec!(10), dec!(10)),
            PostingLine::new(b, dec!(-4), dec!(-4)),
            PostingLine::new(a, dec!(5), dec!(5)),
            PostingLine::new(b, dec!(4), dec!(4)),
        ]);
        assert_eq!(merged, vec![PostingLine::new(a, dec!(15), dec!(15))]);
    }
}
