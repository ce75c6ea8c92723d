//! Run state machine.
//!
//! ```text
//! DRAFT ──post──▶ POSTED ──reverse──▶ REVERSED
//!   │                                    ▲
//!   └──settle (accruals)──▶ SETTLED ─────┘
//! ```
//!
//! Reverse never edits the original's money fields; it yields a new POSTED
//! run holding mirrored lines. That mirror is terminal: reversing it would
//! book the original recognition a second time.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use defter_shared::types::{RunId, RunLineId};

use super::error::RecognitionError;
use super::posting::{PlannedRunLine, PlannedSubledgerEntry};
use super::types::{AccountFamily, RunStatus};

type Result<T> = std::result::Result<T, RecognitionError>;

/// A stored run line paired with its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRunLine {
    /// Run line id.
    pub id: RunLineId,
    /// Line content.
    pub line: PlannedRunLine,
}

/// A reversal run line and the line it mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversalRunLine {
    /// Original run line.
    pub reversal_of_run_line_id: RunLineId,
    /// Negated content.
    pub line: PlannedRunLine,
}

/// Stateless run life cycle guard.
pub struct RunLifecycle;

impl RunLifecycle {
    /// Checks that a run may be posted.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyPosted`, `AlreadySettled` or `AlreadyReversed` when the
    /// run has left DRAFT.
    pub const fn check_post(run_id: RunId, status: RunStatus) -> Result<()> {
        match status {
            RunStatus::Draft => Ok(()),
            RunStatus::Posted => Err(RecognitionError::AlreadyPosted(run_id)),
            RunStatus::Settled => Err(RecognitionError::AlreadySettled(run_id)),
            RunStatus::Reversed => Err(RecognitionError::AlreadyReversed(run_id)),
        }
    }

    /// Checks that an accrual run may be settled on `settle_date`.
    ///
    /// Settle is the posting step for accruals: it books the run journal and
    /// moves DRAFT straight to SETTLED. An accrual therefore never sits in
    /// POSTED, and a POSTED run (posted through `check_post`) is rejected with
    /// `InvalidTransition` rather than settled a second time.
    ///
    /// # Arguments
    ///
    /// * `run_id` - Run being settled
    /// * `family` - Schedule family
    /// * `status` - Current run status
    /// * `maturity_date` - Schedule maturity date
    /// * `settle_date` - Requested settlement date
    ///
    /// # Errors
    ///
    /// Returns `SettleNotSupported` for consuming families, a state conflict
    /// when the run is not DRAFT, and `BeforeMaturity` when `settle_date`
    /// precedes the maturity date.
    pub fn check_settle(
        run_id: RunId,
        family: AccountFamily,
        status: RunStatus,
        maturity_date: NaiveDate,
        settle_date: NaiveDate,
    ) -> Result<()> {
        if !family.is_accrual() {
            return Err(RecognitionError::SettleNotSupported(family));
        }
        match status {
            RunStatus::Draft => {}
            RunStatus::Posted => {
                return Err(RecognitionError::InvalidTransition {
                    from: status,
                    to: RunStatus::Settled,
                });
            }
            RunStatus::Settled => return Err(RecognitionError::AlreadySettled(run_id)),
            RunStatus::Reversed => return Err(RecognitionError::AlreadyReversed(run_id)),
        }
        Self::check_maturity(settle_date, maturity_date)
    }

    /// Checks that a run may be reversed on `reversal_date`.
    ///
    /// POSTED runs of any family and SETTLED accrual runs are reversible,
    /// unless the run is the mirror of another run (`reversal_of`).
    /// Accruals additionally respect the maturity boundary.
    ///
    /// # Errors
    ///
    /// Returns `ReversalOfReversal` for mirror runs, `AlreadyReversed` for
    /// REVERSED runs, `InvalidTransition` for DRAFT runs or a SETTLED
    /// non-accrual run, and `BeforeMaturity`.
    pub fn check_reverse(
        run_id: RunId,
        reversal_of: Option<RunId>,
        family: AccountFamily,
        status: RunStatus,
        maturity_date: NaiveDate,
        reversal_date: NaiveDate,
    ) -> Result<()> {
        if let Some(original) = reversal_of {
            return Err(RecognitionError::ReversalOfReversal {
                run: run_id,
                original,
            });
        }
        match status {
            RunStatus::Posted => {}
            RunStatus::Settled if family.is_accrual() => {}
            RunStatus::Reversed => return Err(RecognitionError::AlreadyReversed(run_id)),
            RunStatus::Draft | RunStatus::Settled => {
                return Err(RecognitionError::InvalidTransition {
                    from: status,
                    to: RunStatus::Reversed,
                });
            }
        }
        if family.is_accrual() {
            Self::check_maturity(reversal_date, maturity_date)?;
        }
        Ok(())
    }

    /// Mirrors run lines for a reversal run, keeping order.
    #[must_use]
    pub fn mirror_lines(lines: &[StoredRunLine]) -> Vec<ReversalRunLine> {
        lines
            .iter()
            .map(|stored| ReversalRunLine {
                reversal_of_run_line_id: stored.id,
                line: PlannedRunLine {
                    amount_txn: -stored.line.amount_txn,
                    amount_base: -stored.line.amount_base,
                    ..stored.line.clone()
                },
            })
            .collect()
    }

    /// Mirrors subledger entries by swapping the debited and credited accounts.
    #[must_use]
    pub fn mirror_subledger(entries: &[PlannedSubledgerEntry]) -> Vec<PlannedSubledgerEntry> {
        entries
            .iter()
            .map(|e| PlannedSubledgerEntry {
                debit_account_id: e.credit_account_id,
                credit_account_id: e.debit_account_id,
                ..e.clone()
            })
            .collect()
    }

    fn check_maturity(date: NaiveDate, maturity_date: NaiveDate) -> Result<()> {
        if date < maturity_date {
            return Err(RecognitionError::BeforeMaturity {
                date,
                maturity_date,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;
    use defter_shared::types::AccountId;

    use crate::purpose::PurposeCode;
    use crate::recognition::types::SubledgerKind;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_post_only_from_draft() {
        let id = RunId::new();
        assert!(RunLifecycle::check_post(id, RunStatus::Draft).is_ok());
        assert!(matches!(
            RunLifecycle::check_post(id, RunStatus::Posted),
            Err(RecognitionError::AlreadyPosted(_))
        ));
        assert!(matches!(
            RunLifecycle::check_post(id, RunStatus::Reversed),
            Err(RecognitionError::AlreadyReversed(_))
        ));
    }

    #[rstest]
    #[case(RunStatus::Posted, AccountFamily::Defrev, true)]
    #[case(RunStatus::Posted, AccountFamily::AccruedExpense, true)]
    #[case(RunStatus::Settled, AccountFamily::AccruedRevenue, true)]
    #[case(RunStatus::Settled, AccountFamily::Prepaid, false)]
    #[case(RunStatus::Draft, AccountFamily::Defrev, false)]
    #[case(RunStatus::Reversed, AccountFamily::Defrev, false)]
    fn test_reverse_allowed_states(
        #[case] status: RunStatus,
        #[case] family: AccountFamily,
        #[case] allowed: bool,
    ) {
        let result =
            RunLifecycle::check_reverse(RunId::new(), None, family, status, date(2024, 1, 31), date(2024, 2, 1));
        assert_eq!(result.is_ok(), allowed);
    }

    #[test]
    fn test_settle_respects_maturity_boundary() {
        let id = RunId::new();
        let maturity = date(2024, 6, 30);
        let family = AccountFamily::AccruedRevenue;

        assert!(RunLifecycle::check_settle(id, family, RunStatus::Draft, maturity, maturity).is_ok());
        assert!(matches!(
            RunLifecycle::check_settle(id, family, RunStatus::Draft, maturity, date(2024, 6, 29)),
            Err(RecognitionError::BeforeMaturity { .. })
        ));
        assert!(matches!(
            RunLifecycle::check_settle(id, family, RunStatus::Settled, maturity, maturity),
            Err(RecognitionError::AlreadySettled(_))
        ));
        assert!(matches!(
            RunLifecycle::check_settle(id, AccountFamily::Defrev, RunStatus::Draft, maturity, maturity),
            Err(RecognitionError::SettleNotSupported(AccountFamily::Defrev))
        ));
    }

    #[test]
    fn test_accrual_reverse_before_maturity_rejected() {
        let err = RunLifecycle::check_reverse(
            RunId::new(),
            None,
            AccountFamily::AccruedExpense,
            RunStatus::Settled,
            date(2024, 6, 30),
            date(2024, 6, 1),
        )
        .unwrap_err();
        assert_eq!(err.kind(), defter_shared::ErrorKind::StateConflict);

        // Consuming families ignore the boundary.
        assert!(RunLifecycle::check_reverse(
            RunId::new(),
            None,
            AccountFamily::Defrev,
            RunStatus::Posted,
            date(2024, 6, 30),
            date(2024, 6, 1),
        )
        .is_ok());
    }

    #[test]
    fn test_mirror_run_is_not_reversible() {
        let mirror = RunId::new();
        let original = RunId::new();
        let err = RunLifecycle::check_reverse(
            mirror,
            Some(original),
            AccountFamily::Defrev,
            RunStatus::Posted,
            date(2024, 1, 31),
            date(2024, 2, 1),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RecognitionError::ReversalOfReversal { run, original: o } if run == mirror && o == original
        ));
        assert_eq!(err.error_code(), "RUN_IS_REVERSAL");
        assert_eq!(err.kind(), defter_shared::ErrorKind::StateConflict);
    }

    #[test]
    fn test_posted_accrual_is_not_settled_again() {
        let maturity = date(2024, 6, 30);
        assert!(matches!(
            RunLifecycle::check_settle(
                RunId::new(),
                AccountFamily::AccruedExpense,
                RunStatus::Posted,
                maturity,
                maturity,
            ),
            Err(RecognitionError::InvalidTransition {
                from: RunStatus::Posted,
                to: RunStatus::Settled,
            })
        ));
    }

    #[test]
    fn test_mirror_lines_reference_originals() {
        let stored = vec![
            StoredRunLine {
                id: RunLineId::new(),
                line: PlannedRunLine {
                    purpose: PurposeCode::DefrevShort,
                    account_id: AccountId::new(),
                    kind: SubledgerKind::Recognition,
                    amount_txn: dec!(50),
                    amount_base: dec!(55),
                },
            },
            StoredRunLine {
                id: RunLineId::new(),
                line: PlannedRunLine {
                    purpose: PurposeCode::Revenue,
                    account_id: AccountId::new(),
                    kind: SubledgerKind::Recognition,
                    amount_txn: dec!(-50),
                    amount_base: dec!(-55),
                },
            },
        ];
        let mirrored = RunLifecycle::mirror_lines(&stored);
        assert_eq!(mirrored.len(), 2);
        assert_eq!(mirrored[0].reversal_of_run_line_id, stored[0].id);
        assert_eq!(mirrored[0].line.amount_base, dec!(-55));
        assert_eq!(mirrored[1].line.amount_txn, dec!(50));
        assert_eq!(mirrored[1].line.account_id, stored[1].line.account_id);
    }
}
