//! Allocation math and journal derivation.
//!
//! Journal amounts are computed in receivable orientation (cash in is a debit)
//! and multiplied by the direction sign, so payables are the exact mirror.

use std::collections::HashSet;

use rust_decimal::Decimal;
use defter_shared::config::PostingConfig;
use defter_shared::types::money::round_money;

use super::error::SettlementError;
use super::types::{
    AllocationMode, AllocationRequest, OpenItem, OpenItemStatus, PlannedAllocation,
    PlannedUnapplied, RemainderPolicy, SettlementInput, SettlementPlan,
};
use crate::fx::FxSnapshot;
use crate::journal::{JournalService, PostingLine};
use crate::purpose::{PurposeAccounts, PurposeCode};

/// Rounding and FX thresholds applied by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementPolicy {
    /// Decimal places of base amounts.
    pub base_scale: u32,
    /// FX differences with a smaller absolute value are absorbed.
    pub min_postable_fx_difference: Decimal,
}

impl SettlementPolicy {
    /// Builds the policy from posting configuration.
    #[must_use]
    pub const fn from_config(config: &PostingConfig) -> Self {
        Self {
            base_scale: config.base_scale,
            min_postable_fx_difference: config.min_postable_fx_difference,
        }
    }
}

impl Default for SettlementPolicy {
    fn default() -> Self {
        Self::from_config(&PostingConfig::default())
    }
}

/// Stateless settlement engine.
pub struct SettlementEngine;

impl SettlementEngine {
    /// Computes allocations, the unapplied remainder, and the journal lines.
    ///
    /// `items` are the counterparty's open items as read under row lock. In
    /// explicit mode every named item must be present; in auto mode items that do
    /// not match the request are skipped.
    ///
    /// # Errors
    ///
    /// Returns validation errors for malformed requests, `ExceedsResidual` when an
    /// allocation would drive a residual negative, and `Setup` when a required
    /// purpose account is not mapped.
    pub fn plan(
        input: &SettlementInput,
        items: &[OpenItem],
        accounts: &PurposeAccounts,
        policy: SettlementPolicy,
    ) -> Result<SettlementPlan, SettlementError> {
        if input.amount <= Decimal::ZERO {
            return Err(SettlementError::NonPositiveAmount(input.amount));
        }
        if let Some(source) = input.source_residual {
            if input.amount > source.amount {
                return Err(SettlementError::InsufficientUnapplied {
                    requested: input.amount,
                    available: source.amount,
                });
            }
        }

        let targets = match &input.mode {
            AllocationMode::Explicit(requests) => Self::explicit_targets(input, requests, items)?,
            AllocationMode::Auto => Self::auto_targets(input, items),
        };

        let mut allocations: Vec<PlannedAllocation> = targets
            .into_iter()
            .map(|(item, amount)| Self::allocate(item, amount, &input.settlement_fx, policy))
            .collect();

        let applied_amount: Decimal = allocations.iter().map(|a| a.amount).sum();
        let remainder = input.amount - applied_amount;

        // A fully consumed bucket must release exactly the base it was booked at.
        if let Some(source) = input.source_residual {
            if applied_amount == source.amount {
                let booked: Decimal = allocations.iter().map(|a| a.settlement_base).sum();
                if let Some(last) = allocations.last_mut() {
                    last.settlement_base += source.base - booked;
                    last.fx_difference = last.settlement_base - last.original_base;
                }
            }
        }

        let unapplied = if remainder > Decimal::ZERO
            && input.remainder == RemainderPolicy::CreateUnapplied
        {
            Some(PlannedUnapplied {
                account_id: accounts.require(PurposeCode::UnappliedCash)?,
                amount: remainder,
                base: input.settlement_fx.to_base(remainder, policy.base_scale),
            })
        } else {
            None
        };

        if allocations.is_empty() && unapplied.is_none() {
            return Err(SettlementError::NothingToApply);
        }

        let fx_total: Decimal = allocations.iter().map(|a| a.fx_difference).sum();
        let source_base = allocations.iter().map(|a| a.settlement_base).sum::<Decimal>()
            + unapplied.map_or(Decimal::ZERO, |u| u.base);
        let lines = Self::journal_lines(input, &allocations, unapplied, fx_total, source_base, accounts)?;

        Ok(SettlementPlan {
            allocations,
            unapplied,
            applied_amount,
            source_base,
            fx_total,
            lines,
        })
    }

    fn explicit_targets<'a>(
        input: &SettlementInput,
        requests: &[AllocationRequest],
        items: &'a [OpenItem],
    ) -> Result<Vec<(&'a OpenItem, Decimal)>, SettlementError> {
        let mut seen = HashSet::with_capacity(requests.len());
        let mut allocated = Decimal::ZERO;
        let mut targets = Vec::with_capacity(requests.len());

        for request in requests {
            if request.amount <= Decimal::ZERO {
                return Err(SettlementError::NonPositiveAllocation(request.open_item_id));
            }
            if !seen.insert(request.open_item_id) {
                return Err(SettlementError::DuplicateAllocation(request.open_item_id));
            }
            allocated += request.amount;

            let item = items
                .iter()
                .find(|i| i.id == request.open_item_id)
                .ok_or(SettlementError::OpenItemNotFound(request.open_item_id))?;
            Self::check_item(input, item)?;
            if item.status == OpenItemStatus::Settled || item.residual_amount.is_zero() {
                return Err(SettlementError::ItemAlreadySettled(item.id));
            }
            if request.amount > item.residual_amount {
                return Err(SettlementError::ExceedsResidual {
                    id: item.id,
                    amount: request.amount,
                    residual: item.residual_amount,
                });
            }
            targets.push((item, request.amount));
        }

        if allocated > input.amount {
            return Err(SettlementError::OverAllocated {
                allocated,
                amount: input.amount,
            });
        }
        Ok(targets)
    }

    /// Oldest first: due date, then document date, then id.
    fn auto_targets<'a>(input: &SettlementInput, items: &'a [OpenItem]) -> Vec<(&'a OpenItem, Decimal)> {
        let mut candidates: Vec<&OpenItem> = items
            .iter()
            .filter(|i| Self::check_item(input, i).is_ok())
            .filter(|i| i.status != OpenItemStatus::Settled && i.residual_amount > Decimal::ZERO)
            .collect();
        candidates.sort_by(|a, b| {
            a.due_date
                .cmp(&b.due_date)
                .then(a.document_date.cmp(&b.document_date))
                .then(a.id.cmp(&b.id))
        });

        let mut remaining = input.amount;
        let mut targets = Vec::new();
        for item in candidates {
            if remaining.is_zero() {
                break;
            }
            let amount = remaining.min(item.residual_amount);
            remaining -= amount;
            targets.push((item, amount));
        }
        targets
    }

    fn check_item(input: &SettlementInput, item: &OpenItem) -> Result<(), SettlementError> {
        let reason = if item.counterparty_id != input.counterparty_id {
            "belongs to another counterparty"
        } else if item.currency != input.currency {
            "currency differs from settlement currency"
        } else if item.direction != input.direction {
            "direction differs from settlement direction"
        } else {
            return Ok(());
        };
        Err(SettlementError::ItemMismatch {
            id: item.id,
            reason: reason.to_string(),
        })
    }

    /// Splits one allocation into its original-rate and settlement-rate base legs.
    ///
    /// The allocation that clears an item takes the item's exact residual base so no
    /// rounding dust is left on a settled item.
    #[must_use]
    pub fn allocate(
        item: &OpenItem,
        amount: Decimal,
        settlement_fx: &FxSnapshot,
        policy: SettlementPolicy,
    ) -> PlannedAllocation {
        let residual_after = item.residual_amount - amount;
        let original_base = if residual_after.is_zero() {
            item.residual_base
        } else {
            round_money(amount * item.fx.rate, policy.base_scale).min(item.residual_base)
        };

        let mut settlement_base = settlement_fx.to_base(amount, policy.base_scale);
        let mut fx_difference = settlement_base - original_base;
        if !fx_difference.is_zero() && fx_difference.abs() < policy.min_postable_fx_difference {
            settlement_base = original_base;
            fx_difference = Decimal::ZERO;
        }

        PlannedAllocation {
            open_item_id: item.id,
            control_account_id: item.control_account_id,
            amount,
            original_base,
            settlement_base,
            fx_difference,
            residual_after,
            residual_base_after: item.residual_base - original_base,
            status_after: if residual_after.is_zero() {
                OpenItemStatus::Settled
            } else {
                OpenItemStatus::PartiallySettled
            },
        }
    }

    /// Derives the journal purely from allocation rows.
    fn journal_lines(
        input: &SettlementInput,
        allocations: &[PlannedAllocation],
        unapplied: Option<PlannedUnapplied>,
        fx_total: Decimal,
        source_base: Decimal,
        accounts: &PurposeAccounts,
    ) -> Result<Vec<PostingLine>, SettlementError> {
        let sign = input.direction.sign();
        let applied: Decimal = allocations.iter().map(|a| a.amount).sum();
        let unapplied_amount = unapplied.map_or(Decimal::ZERO, |u| u.amount);

        let mut lines = Vec::with_capacity(allocations.len() + 3);
        lines.push(
            PostingLine::new(
                input.source_account_id,
                sign * (applied + unapplied_amount),
                sign * source_base,
            )
            .with_memo("Settlement"),
        );
        for allocation in allocations {
            lines.push(PostingLine::new(
                allocation.control_account_id,
                -sign * allocation.amount,
                -sign * allocation.original_base,
            ));
        }
        if let Some(u) = unapplied {
            lines.push(
                PostingLine::new(u.account_id, -sign * u.amount, -sign * u.base)
                    .with_memo("Unapplied cash"),
            );
        }

        let fx_base = -sign * fx_total;
        if !fx_base.is_zero() {
            let (purpose, memo) = if fx_base.is_sign_negative() {
                (PurposeCode::FxGain, "Realized FX gain")
            } else {
                (PurposeCode::FxLoss, "Realized FX loss")
            };
            lines.push(PostingLine::new(accounts.require(purpose)?, Decimal::ZERO, fx_base).with_memo(memo));
        }

        Ok(JournalService::aggregate(lines))
    }
}
