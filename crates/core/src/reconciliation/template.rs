//! Template expansion for matched statement lines.

use rust_decimal::Decimal;
use defter_shared::types::money::round_money;
use defter_shared::types::{AccountId, CounterpartyId};

use super::error::ReconciliationError;
use super::types::{BankStatementLine, StatementDirection, StatementLineStatus, TaxSplit};
use crate::fx::FxSnapshot;
use crate::journal::PostingLine;
use crate::settlement::{AllocationMode, ItemDirection, RemainderPolicy, SettlementInput};

type Result<T> = std::result::Result<T, ReconciliationError>;

/// Stateless template planner.
pub struct TemplatePlanner;

impl TemplatePlanner {
    /// Rejects lines that cannot be posted at all.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyReconciled` or `ZeroAmount`.
    pub fn check_postable(line: &BankStatementLine) -> Result<()> {
        if line.status == StatementLineStatus::Reconciled {
            return Err(ReconciliationError::AlreadyReconciled(line.id));
        }
        if line.amount.is_zero() {
            return Err(ReconciliationError::ZeroAmount(line.id));
        }
        Ok(())
    }

    /// Splits a tax-inclusive gross amount into `(net, tax)`.
    ///
    /// `net = round(gross / (1 + rate))`, `tax = gross - net`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTaxRate` unless `0 <= rate < 1`.
    pub fn split_inclusive(gross: Decimal, rate: Decimal, scale: u32) -> Result<(Decimal, Decimal)> {
        if rate.is_sign_negative() || rate >= Decimal::ONE {
            return Err(ReconciliationError::InvalidTaxRate(rate));
        }
        let net = round_money(gross / (Decimal::ONE + rate), scale);
        Ok((net, gross - net))
    }

    /// Journal lines for a direct posting.
    ///
    /// Inflows debit the register account and credit the counter (and tax)
    /// accounts; outflows do the opposite. Base amounts of the counter and tax
    /// lines are derived so that they add up to the register line exactly.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTaxRate` for an out-of-range tax rate.
    pub fn direct_lines(
        line: &BankStatementLine,
        counter_account_id: AccountId,
        tax: Option<TaxSplit>,
        fx: &FxSnapshot,
        scale: u32,
    ) -> Result<Vec<PostingLine>> {
        let gross = line.amount.abs();
        let gross_base = fx.to_base(gross, scale);
        let sign = match line.direction() {
            StatementDirection::Inflow => Decimal::ONE,
            StatementDirection::Outflow => Decimal::NEGATIVE_ONE,
        };

        let mut lines = Vec::with_capacity(3);
        match tax {
            Some(split) if !split.rate.is_zero() => {
                let (net, tax_amount) = Self::split_inclusive(gross, split.rate, scale)?;
                let net_base = fx.to_base(net, scale);
                lines.push(
                    PostingLine::new(counter_account_id, -sign * net, -sign * net_base)
                        .with_memo(line.description.clone()),
                );
                lines.push(
                    PostingLine::new(split.tax_account_id, -sign * tax_amount, -sign * (gross_base - net_base))
                        .with_memo("Tax"),
                );
            }
            _ => {
                lines.push(
                    PostingLine::new(counter_account_id, -sign * gross, -sign * gross_base)
                        .with_memo(line.description.clone()),
                );
            }
        }
        lines.push(
            PostingLine::new(line.register_account_id, sign * gross, sign * gross_base).with_memo("Bank"),
        );
        Ok(lines)
    }

    /// Settlement input for a settlement template.
    ///
    /// Inflows settle receivables, outflows settle payables. Without
    /// auto-allocation the full amount becomes unapplied cash.
    ///
    /// # Errors
    ///
    /// Returns `MissingCounterparty` when neither the rule nor the line names one.
    pub fn settlement_input(
        line: &BankStatementLine,
        counterparty_id: Option<CounterpartyId>,
        auto_allocate: bool,
        fx: FxSnapshot,
    ) -> Result<SettlementInput> {
        let counterparty_id = counterparty_id
            .or(line.counterparty_hint)
            .ok_or(ReconciliationError::MissingCounterparty(line.id))?;
        let direction = match line.direction() {
            StatementDirection::Inflow => ItemDirection::Receivable,
            StatementDirection::Outflow => ItemDirection::Payable,
        };
        Ok(SettlementInput {
            direction,
            counterparty_id,
            currency: line.currency.clone(),
            amount: line.amount.abs(),
            mode: if auto_allocate {
                AllocationMode::Auto
            } else {
                AllocationMode::Explicit(Vec::new())
            },
            settlement_fx: fx,
            source_account_id: line.register_account_id,
            remainder: RemainderPolicy::CreateUnapplied,
            source_residual: None,
        })
    }
}
