//! Purpose-account mappings.
//!
//! Engines never hard-code GL accounts; they ask for a purpose code and the
//! legal entity's mapping table answers. The table is loaded once per request
//! and treated as an immutable value.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use defter_shared::ErrorKind;
use defter_shared::types::AccountId;

/// Role an account plays in automated postings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurposeCode {
    /// Customer or vendor cash received/paid ahead of any open item.
    UnappliedCash,
    /// Realized FX gain.
    FxGain,
    /// Realized FX loss.
    FxLoss,
    /// Revenue (flow account for deferred and accrued revenue).
    Revenue,
    /// Expense (flow account for prepaid and accrued expense).
    Expense,
    /// Deferred revenue due within 12 months.
    DefrevShort,
    /// Deferred revenue due after 12 months.
    DefrevLong,
    /// Transfer account for deferred revenue reclassification.
    DefrevReclass,
    /// Prepaid expense due within 12 months.
    PrepaidShort,
    /// Prepaid expense due after 12 months.
    PrepaidLong,
    /// Transfer account for prepaid reclassification.
    PrepaidReclass,
    /// Accrued revenue due within 12 months.
    AccruedRevenueShort,
    /// Accrued revenue due after 12 months.
    AccruedRevenueLong,
    /// Transfer account for accrued revenue reclassification.
    AccruedRevenueReclass,
    /// Accrued expense due within 12 months.
    AccruedExpenseShort,
    /// Accrued expense due after 12 months.
    AccruedExpenseLong,
    /// Transfer account for accrued expense reclassification.
    AccruedExpenseReclass,
}

impl PurposeCode {
    /// All codes, in declaration order.
    pub const ALL: [Self; 17] = [
        Self::UnappliedCash,
        Self::FxGain,
        Self::FxLoss,
        Self::Revenue,
        Self::Expense,
        Self::DefrevShort,
        Self::DefrevLong,
        Self::DefrevReclass,
        Self::PrepaidShort,
        Self::PrepaidLong,
        Self::PrepaidReclass,
        Self::AccruedRevenueShort,
        Self::AccruedRevenueLong,
        Self::AccruedRevenueReclass,
        Self::AccruedExpenseShort,
        Self::AccruedExpenseLong,
        Self::AccruedExpenseReclass,
    ];

    /// Returns the persisted representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnappliedCash => "UNAPPLIED_CASH",
            Self::FxGain => "FX_GAIN",
            Self::FxLoss => "FX_LOSS",
            Self::Revenue => "REVENUE",
            Self::Expense => "EXPENSE",
            Self::DefrevShort => "DEFREV_SHORT",
            Self::DefrevLong => "DEFREV_LONG",
            Self::DefrevReclass => "DEFREV_RECLASS",
            Self::PrepaidShort => "PREPAID_SHORT",
            Self::PrepaidLong => "PREPAID_LONG",
            Self::PrepaidReclass => "PREPAID_RECLASS",
            Self::AccruedRevenueShort => "ACCRUED_REVENUE_SHORT",
            Self::AccruedRevenueLong => "ACCRUED_REVENUE_LONG",
            Self::AccruedRevenueReclass => "ACCRUED_REVENUE_RECLASS",
            Self::AccruedExpenseShort => "ACCRUED_EXPENSE_SHORT",
            Self::AccruedExpenseLong => "ACCRUED_EXPENSE_LONG",
            Self::AccruedExpenseReclass => "ACCRUED_EXPENSE_RECLASS",
        }
    }
}

impl std::fmt::Display for PurposeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PurposeCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| format!("Unknown purpose code: {s}"))
    }
}

/// A required mapping is not configured.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("No account mapped for purpose {0}")]
pub struct MissingPurpose(pub PurposeCode);

impl MissingPurpose {
    /// Returns the failure class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::SetupRequired
    }
}

/// Purpose-account table of one legal entity.
#[derive(Debug, Clone, Default)]
pub struct PurposeAccounts {
    mappings: HashMap<PurposeCode, AccountId>,
}

impl PurposeAccounts {
    /// Builds the table from `(purpose, account)` rows.
    #[must_use]
    pub fn new(rows: impl IntoIterator<Item = (PurposeCode, AccountId)>) -> Self {
        Self {
            mappings: rows.into_iter().collect(),
        }
    }

    /// Looks up an optional mapping.
    #[must_use]
    pub fn get(&self, code: PurposeCode) -> Option<AccountId> {
        self.mappings.get(&code).copied()
    }

    /// Looks up a mapping that must exist.
    ///
    /// # Errors
    ///
    /// Returns `MissingPurpose` when the code is not mapped.
    pub fn require(&self, code: PurposeCode) -> Result<AccountId, MissingPurpose> {
        self.get(code).ok_or(MissingPurpose(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_purpose_code_round_trip() {
        for code in PurposeCode::ALL {
            assert_eq!(PurposeCode::from_str(code.as_str()).unwrap(), code);
        }
        assert!(PurposeCode::from_str("CASH").is_err());
    }

    #[test]
    fn test_require_reports_missing_code() {
        let gain = AccountId::new();
        let accounts = PurposeAccounts::new([(PurposeCode::FxGain, gain)]);
        assert_eq!(accounts.require(PurposeCode::FxGain).unwrap(), gain);
        let err = accounts.require(PurposeCode::FxLoss).unwrap_err();
        assert_eq!(err, MissingPurpose(PurposeCode::FxLoss));
        assert_eq!(err.to_string(), "No account mapped for purpose FX_LOSS");
    }
}
