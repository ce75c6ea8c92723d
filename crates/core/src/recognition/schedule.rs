//! Schedule generation from contract lines and accrual requests.

use std::collections::HashSet;

use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;
use defter_shared::types::money::round_money;

use super::error::RecognitionError;
use super::types::{AccountFamily, AccrualRequest, ContractLine, MaturityBucket, RecognitionMethod, ScheduleDraft};

type Result<T> = std::result::Result<T, RecognitionError>;

/// Result of a generation call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationOutcome {
    /// Rows to insert, each paired with a DRAFT run by the caller.
    pub drafts: Vec<ScheduleDraft>,
    /// Rows inside the window that already existed.
    pub skipped: usize,
}

impl GenerationOutcome {
    /// Number of newly generated rows.
    #[must_use]
    pub fn generated(&self) -> usize {
        self.drafts.len()
    }
}

/// Inclusive date window restricting emitted rows, usually a fiscal period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationWindow {
    /// First maturity date kept.
    pub start: NaiveDate,
    /// Last maturity date kept.
    pub end: NaiveDate,
}

impl GenerationWindow {
    fn contains(self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Stateless schedule generator.
pub struct ScheduleGenerator;

impl ScheduleGenerator {
    /// Generates schedule rows for a contract line.
    ///
    /// # Arguments
    ///
    /// * `line` - Contract line to spread
    /// * `reference_date` - Date maturity buckets are measured from
    /// * `window` - Optional window on maturity dates
    /// * `existing_uids` - `source_row_uid`s already stored for the line
    /// * `regenerate_missing_only` - Skip existing rows instead of failing
    /// * `scale` - Decimal places of generated amounts
    ///
    /// # Returns
    ///
    /// The rows to insert and how many window rows were skipped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidContractLine` for an empty date range, non-positive
    /// amount or a milestone with distinct dates, and `AlreadyGenerated` when
    /// rows exist and `regenerate_missing_only` is false.
    pub fn generate(
        line: &ContractLine,
        reference_date: NaiveDate,
        window: Option<GenerationWindow>,
        existing_uids: &HashSet<String>,
        regenerate_missing_only: bool,
        scale: u32,
    ) -> Result<GenerationOutcome> {
        if line.amount <= Decimal::ZERO {
            return Err(RecognitionError::InvalidContractLine(format!(
                "amount must be positive, got {}",
                line.amount
            )));
        }
        if line.end_date < line.start_date {
            return Err(RecognitionError::InvalidContractLine(format!(
                "end date {} is before start date {}",
                line.end_date, line.start_date
            )));
        }

        let slices = match line.method {
            RecognitionMethod::StraightLine => Self::straight_line(line, scale)?,
            RecognitionMethod::Milestone => {
                if line.start_date != line.end_date {
                    return Err(RecognitionError::InvalidContractLine(
                        "milestone lines require equal start and end dates".into(),
                    ));
                }
                let base = round_money(line.amount * line.fx.rate, scale);
                vec![(line.end_date, line.amount, base)]
            }
            RecognitionMethod::Manual => Vec::new(),
        };

        let horizon = twelve_months_after(reference_date)?;
        let candidates: Vec<ScheduleDraft> = slices
            .into_iter()
            .filter(|(_, txn, base)| !(txn.is_zero() && base.is_zero()))
            .filter(|(maturity, _, _)| window.is_none_or(|w| w.contains(*maturity)))
            .map(|(maturity_date, amount_txn, amount_base)| {
                let bucket = if maturity_date <= horizon {
                    MaturityBucket::ShortTerm
                } else {
                    MaturityBucket::LongTerm
                };
                ScheduleDraft {
                    contract_line_id: Some(line.id),
                    family: line.family,
                    bucket,
                    maturity_date,
                    amount_txn,
                    amount_base,
                    currency: line.currency.clone(),
                    fx_rate: line.fx.rate,
                    reclass_required: bucket == MaturityBucket::LongTerm,
                    source_row_uid: row_uid(&line.id.to_string(), maturity_date, line.family),
                }
            })
            .collect();

        let existing = candidates
            .iter()
            .filter(|d| existing_uids.contains(&d.source_row_uid))
            .count();
        if existing > 0 && !regenerate_missing_only {
            return Err(RecognitionError::AlreadyGenerated {
                line: line.id,
                existing,
            });
        }

        let drafts: Vec<ScheduleDraft> = candidates
            .into_iter()
            .filter(|d| !existing_uids.contains(&d.source_row_uid))
            .collect();

        debug!(
            contract_line_id = %line.id,
            method = line.method.as_str(),
            generated = drafts.len(),
            skipped = existing,
            "Schedule generated"
        );

        Ok(GenerationOutcome {
            drafts,
            skipped: existing,
        })
    }

    /// Builds the single schedule row of an accrual request.
    ///
    /// # Errors
    ///
    /// Returns `NotAccrualFamily` for DEFREV/PREPAID and
    /// `InvalidContractLine` for a non-positive amount or empty reference.
    pub fn accrual(request: &AccrualRequest, fx_rate: Decimal, scale: u32) -> Result<ScheduleDraft> {
        if !request.family.is_accrual() {
            return Err(RecognitionError::NotAccrualFamily(request.family));
        }
        if request.amount <= Decimal::ZERO {
            return Err(RecognitionError::InvalidContractLine(format!(
                "accrual amount must be positive, got {}",
                request.amount
            )));
        }
        let reference = request.reference.trim();
        if reference.is_empty() {
            return Err(RecognitionError::InvalidContractLine(
                "accrual reference is required".into(),
            ));
        }

        let bucket = if request.maturity_date <= twelve_months_after(request.reference_date)? {
            MaturityBucket::ShortTerm
        } else {
            MaturityBucket::LongTerm
        };

        Ok(ScheduleDraft {
            contract_line_id: None,
            family: request.family,
            bucket,
            maturity_date: request.maturity_date,
            amount_txn: request.amount,
            amount_base: round_money(request.amount * fx_rate, scale),
            currency: request.currency.clone(),
            fx_rate,
            reclass_required: bucket == MaturityBucket::LongTerm,
            source_row_uid: row_uid(&format!("accrual-{reference}"), request.maturity_date, request.family),
        })
    }

    /// Splits a straight-line contract into monthly `(maturity, txn, base)` slices.
    ///
    /// Each slice is truncated to `scale`; the last slice takes the remainder so
    /// both columns sum exactly to the line totals. Slices that truncate to zero
    /// in both columns are dropped by the caller.
    fn straight_line(line: &ContractLine, scale: u32) -> Result<Vec<(NaiveDate, Decimal, Decimal)>> {
        let maturities = month_ends(line.start_date, line.end_date)?;
        let count = Decimal::from(maturities.len());
        let base_total = round_money(line.amount * line.fx.rate, scale);

        let per_txn = (line.amount / count).round_dp_with_strategy(scale, RoundingStrategy::ToZero);
        let per_base = (base_total / count).round_dp_with_strategy(scale, RoundingStrategy::ToZero);
        let head = count - Decimal::ONE;

        let last_index = maturities.len() - 1;
        Ok(maturities
            .into_iter()
            .enumerate()
            .map(|(i, maturity)| {
                if i == last_index {
                    (maturity, line.amount - per_txn * head, base_total - per_base * head)
                } else {
                    (maturity, per_txn, per_base)
                }
            })
            .collect())
    }
}

/// Month-end maturity dates from the start month to the end month, the last
/// one capped at `end`. Never empty when `start <= end`.
fn month_ends(start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>> {
    let out_of_range = || RecognitionError::InvalidContractLine("date out of range".into());

    let mut month_start = start.with_day(1).ok_or_else(out_of_range)?;
    let mut ends = Vec::new();
    while month_start <= end {
        let next = month_start
            .checked_add_months(Months::new(1))
            .ok_or_else(out_of_range)?;
        let month_end = next.pred_opt().ok_or_else(out_of_range)?;
        ends.push(month_end.min(end));
        month_start = next;
    }
    Ok(ends)
}

fn twelve_months_after(date: NaiveDate) -> Result<NaiveDate> {
    date.checked_add_months(Months::new(12))
        .ok_or_else(|| RecognitionError::InvalidContractLine("date out of range".into()))
}

/// `<source>:<YYYY-MM>:<FAMILY>`.
fn row_uid(source: &str, maturity: NaiveDate, family: AccountFamily) -> String {
    format!(
        "{source}:{:04}-{:02}:{}",
        maturity.year(),
        maturity.month(),
        family.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fx::FxSnapshot;
    use defter_shared::types::{ContractLineId, CurrencyCode};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn line(method: RecognitionMethod, start: NaiveDate, end: NaiveDate, amount: Decimal) -> ContractLine {
        ContractLine {
            id: ContractLineId::new(),
            family: AccountFamily::Defrev,
            method,
            start_date: start,
            end_date: end,
            amount,
            currency: CurrencyCode::parse("USD").unwrap(),
            fx: FxSnapshot::identity(start),
        }
    }

    fn generate(line: &ContractLine, reference: NaiveDate) -> GenerationOutcome {
        ScheduleGenerator::generate(line, reference, None, &HashSet::new(), false, 2).unwrap()
    }

    #[test]
    fn test_straight_line_absorbs_remainder_in_last_month() {
        let l = line(RecognitionMethod::StraightLine, date(2024, 1, 1), date(2024, 3, 31), dec!(100));
        let out = generate(&l, date(2024, 1, 1));

        let amounts: Vec<Decimal> = out.drafts.iter().map(|d| d.amount_txn).collect();
        assert_eq!(amounts, vec![dec!(33.33), dec!(33.33), dec!(33.34)]);
        let maturities: Vec<NaiveDate> = out.drafts.iter().map(|d| d.maturity_date).collect();
        assert_eq!(maturities, vec![date(2024, 1, 31), date(2024, 2, 29), date(2024, 3, 31)]);
    }

    #[test]
    fn test_last_maturity_capped_at_end_date() {
        let l = line(RecognitionMethod::StraightLine, date(2024, 1, 15), date(2024, 2, 10), dec!(50));
        let out = generate(&l, date(2024, 1, 1));
        assert_eq!(out.drafts.len(), 2);
        assert_eq!(out.drafts[1].maturity_date, date(2024, 2, 10));
    }

    #[test]
    fn test_buckets_split_at_twelve_months() {
        let l = line(RecognitionMethod::StraightLine, date(2024, 1, 1), date(2025, 12, 31), dec!(2400));
        let out = generate(&l, date(2024, 1, 1));
        assert_eq!(out.generated(), 24);

        let long: Vec<&ScheduleDraft> = out
            .drafts
            .iter()
            .filter(|d| d.bucket == MaturityBucket::LongTerm)
            .collect();
        assert_eq!(long.len(), 12);
        assert!(long.iter().all(|d| d.reclass_required));
        assert_eq!(long[0].maturity_date, date(2025, 1, 31));
    }

    #[test]
    fn test_base_amounts_use_snapshot_rate() {
        let mut l = line(RecognitionMethod::StraightLine, date(2024, 1, 1), date(2024, 3, 31), dec!(100));
        l.fx.rate = dec!(1.1);
        let out = generate(&l, date(2024, 1, 1));
        let base: Decimal = out.drafts.iter().map(|d| d.amount_base).sum();
        assert_eq!(base, dec!(110.00));
        assert_eq!(out.drafts[0].amount_base, dec!(36.66));
    }

    #[test]
    fn test_milestone_requires_single_date() {
        let ok = line(RecognitionMethod::Milestone, date(2024, 6, 30), date(2024, 6, 30), dec!(500));
        let out = generate(&ok, date(2024, 1, 1));
        assert_eq!(out.generated(), 1);
        assert_eq!(out.drafts[0].maturity_date, date(2024, 6, 30));

        let bad = line(RecognitionMethod::Milestone, date(2024, 6, 1), date(2024, 6, 30), dec!(500));
        let err = ScheduleGenerator::generate(&bad, date(2024, 1, 1), None, &HashSet::new(), false, 2);
        assert!(matches!(err, Err(RecognitionError::InvalidContractLine(_))));
    }

    #[test]
    fn test_manual_generates_nothing() {
        let l = line(RecognitionMethod::Manual, date(2024, 1, 1), date(2024, 12, 31), dec!(1200));
        assert_eq!(generate(&l, date(2024, 1, 1)).generated(), 0);
    }

    #[test]
    fn test_window_restricts_rows() {
        let l = line(RecognitionMethod::StraightLine, date(2024, 1, 1), date(2024, 12, 31), dec!(1200));
        let window = GenerationWindow {
            start: date(2024, 3, 1),
            end: date(2024, 3, 31),
        };
        let out = ScheduleGenerator::generate(&l, date(2024, 1, 1), Some(window), &HashSet::new(), false, 2).unwrap();
        assert_eq!(out.generated(), 1);
        assert_eq!(out.drafts[0].amount_txn, dec!(100));
        assert_eq!(out.drafts[0].source_row_uid, format!("{}:2024-03:DEFREV", l.id));
    }

    #[test]
    fn test_regenerate_missing_only_is_idempotent() {
        let l = line(RecognitionMethod::StraightLine, date(2024, 1, 1), date(2024, 6, 30), dec!(600));
        let first = generate(&l, date(2024, 1, 1));
        let stored: HashSet<String> = first.drafts.iter().map(|d| d.source_row_uid.clone()).collect();

        let second = ScheduleGenerator::generate(&l, date(2024, 1, 1), None, &stored, true, 2).unwrap();
        assert_eq!(second.generated(), 0);
        assert_eq!(second.skipped, 6);

        let err = ScheduleGenerator::generate(&l, date(2024, 1, 1), None, &stored, false, 2).unwrap_err();
        assert!(matches!(err, RecognitionError::AlreadyGenerated { existing: 6, .. }));
    }

    #[test]
    fn test_rejects_inverted_dates_and_non_positive_amount() {
        let inverted = line(RecognitionMethod::StraightLine, date(2024, 2, 1), date(2024, 1, 1), dec!(10));
        assert!(ScheduleGenerator::generate(&inverted, date(2024, 1, 1), None, &HashSet::new(), false, 2).is_err());

        let zero = line(RecognitionMethod::StraightLine, date(2024, 1, 1), date(2024, 2, 1), Decimal::ZERO);
        assert!(ScheduleGenerator::generate(&zero, date(2024, 1, 1), None, &HashSet::new(), false, 2).is_err());
    }

    #[test]
    fn test_accrual_request_builds_single_row() {
        let request = AccrualRequest {
            family: AccountFamily::AccruedExpense,
            amount: dec!(250),
            currency: CurrencyCode::parse("EUR").unwrap(),
            maturity_date: date(2025, 6, 30),
            reference_date: date(2024, 1, 1),
            reference: "utilities-q2".into(),
        };
        let draft = ScheduleGenerator::accrual(&request, dec!(1.2), 2).unwrap();
        assert_eq!(draft.bucket, MaturityBucket::LongTerm);
        assert!(draft.reclass_required);
        assert_eq!(draft.amount_base, dec!(300.00));
        assert_eq!(draft.source_row_uid, "accrual-utilities-q2:2025-06:ACCRUED_EXPENSE");

        let defrev = AccrualRequest {
            family: AccountFamily::Defrev,
            ..request
        };
        assert!(matches!(
            ScheduleGenerator::accrual(&defrev, Decimal::ONE, 2),
            Err(RecognitionError::NotAccrualFamily(AccountFamily::Defrev))
        ));
    }
}
